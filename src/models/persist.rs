//! Model artifact persistence.
//!
//! One JSON artifact per forecaster, keyed by a stable name. A missing
//! artifact is a normal, recoverable condition (the caller retrains); a
//! corrupt one is reported distinctly so the caller can decide the same.

use crate::error::{ForecastError, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::io::ErrorKind;
use std::path::Path;

/// Outcome of loading a model artifact.
#[derive(Debug, Clone, PartialEq)]
pub enum Loaded<T> {
    /// The artifact was read and parsed.
    Loaded(T),
    /// No artifact exists at the path.
    NotFound,
    /// The artifact exists but could not be parsed.
    Corrupt(String),
}

impl<T> Loaded<T> {
    /// Whether the artifact was loaded.
    pub fn is_loaded(&self) -> bool {
        matches!(self, Loaded::Loaded(_))
    }

    /// Discard the payload, keeping the outcome.
    pub fn status(&self) -> LoadOutcome {
        match self {
            Loaded::Loaded(_) => Loaded::Loaded(()),
            Loaded::NotFound => Loaded::NotFound,
            Loaded::Corrupt(msg) => Loaded::Corrupt(msg.clone()),
        }
    }
}

/// Payload-free load outcome, as returned by model `load` methods.
pub type LoadOutcome = Loaded<()>;

/// Serialize a model state to a JSON artifact.
pub fn save_json<T: Serialize>(state: &T, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| ForecastError::Persistence(format!("{}: {e}", path.display())))?;
    }
    let json = serde_json::to_string(state)
        .map_err(|e| ForecastError::Persistence(format!("serialize: {e}")))?;
    std::fs::write(path, json)
        .map_err(|e| ForecastError::Persistence(format!("{}: {e}", path.display())))
}

/// Read a model state from a JSON artifact.
///
/// Missing and corrupt artifacts are reported through the [`Loaded`]
/// outcome rather than as errors; only I/O faults other than not-found
/// surface as `Err`.
pub fn load_json<T: DeserializeOwned>(path: &Path) -> Result<Loaded<T>> {
    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Loaded::NotFound),
        Err(e) => {
            return Err(ForecastError::Persistence(format!(
                "{}: {e}",
                path.display()
            )))
        }
    };

    match serde_json::from_str(&contents) {
        Ok(state) => Ok(Loaded::Loaded(state)),
        Err(e) => Ok(Loaded::Corrupt(e.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct DummyState {
        weights: Vec<f64>,
        trained: bool,
    }

    #[test]
    fn save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.json");
        let state = DummyState {
            weights: vec![0.25, -1.5, 3.0],
            trained: true,
        };

        save_json(&state, &path).unwrap();
        let loaded: Loaded<DummyState> = load_json(&path).unwrap();
        assert_eq!(loaded, Loaded::Loaded(state));
    }

    // Weights with no short decimal form must come back bit-identical,
    // otherwise a reloaded model drifts from the one that was saved.
    #[test]
    fn long_fraction_weights_round_trip_bit_exact() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.json");
        let state = DummyState {
            weights: vec![0.6346658895042521, 0.1 + 0.2, 1.0 / 3.0, -1.0 / 49.0],
            trained: true,
        };

        save_json(&state, &path).unwrap();
        let loaded: Loaded<DummyState> = load_json(&path).unwrap();
        assert_eq!(loaded, Loaded::Loaded(state));
    }

    #[test]
    fn missing_artifact_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let loaded: Loaded<DummyState> = load_json(&dir.path().join("absent.json")).unwrap();
        assert_eq!(loaded, Loaded::NotFound);
        assert!(!loaded.is_loaded());
    }

    #[test]
    fn unparseable_artifact_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.json");
        std::fs::write(&path, "not json {").unwrap();

        let loaded: Loaded<DummyState> = load_json(&path).unwrap();
        assert!(matches!(loaded, Loaded::Corrupt(_)));
    }
}
