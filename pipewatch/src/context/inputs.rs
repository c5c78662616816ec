//! Upstream artifacts visible to a stage.

use crate::core::Artifact;
use crate::errors::StageError;
use serde::de::DeserializeOwned;

/// Provides an immutable view of the artifacts a stage may consume.
///
/// Only declared dependencies are visible. Root stages (no dependencies)
/// see the run's initial input instead.
#[derive(Debug, Clone, Default)]
pub struct StageInputs {
    /// The name of the current stage (for error messages).
    stage_name: String,
    /// Upstream artifacts in dependency declaration order.
    upstream: Vec<(String, Artifact)>,
    /// The run's initial input, offered to root stages.
    initial: Option<Artifact>,
}

impl StageInputs {
    /// Creates inputs from upstream artifacts.
    #[must_use]
    pub fn new(stage_name: impl Into<String>, upstream: Vec<(String, Artifact)>) -> Self {
        Self {
            stage_name: stage_name.into(),
            upstream,
            initial: None,
        }
    }

    /// Creates inputs for a root stage from the run's initial input.
    #[must_use]
    pub fn root(stage_name: impl Into<String>, initial: Option<Artifact>) -> Self {
        Self {
            stage_name: stage_name.into(),
            upstream: Vec::new(),
            initial,
        }
    }

    /// Gets the artifact produced by a specific upstream stage.
    #[must_use]
    pub fn get(&self, stage: &str) -> Option<&Artifact> {
        self.upstream
            .iter()
            .find(|(name, _)| name == stage)
            .map(|(_, artifact)| artifact)
    }

    /// Returns the sole input artifact.
    ///
    /// For a linear chain this is the prior stage's output; for a root stage
    /// it is the initial input.
    ///
    /// # Errors
    ///
    /// Returns a fatal stage error if there is no input or more than one.
    pub fn single(&self) -> Result<&Artifact, StageError> {
        match (self.upstream.as_slice(), &self.initial) {
            ([(_, artifact)], _) => Ok(artifact),
            ([], Some(initial)) => Ok(initial),
            ([], None) => Err(StageError::fatal(format!(
                "stage '{}' expected an input artifact but none was provided",
                self.stage_name
            ))),
            (many, _) => Err(StageError::fatal(format!(
                "stage '{}' expected a single input artifact but has {}",
                self.stage_name,
                many.len()
            ))),
        }
    }

    /// Decodes the sole input artifact into a typed value.
    pub fn decode_single<T: DeserializeOwned>(&self) -> Result<T, StageError> {
        let artifact = self.single()?;
        artifact.decode().map_err(|e| {
            StageError::fatal(format!(
                "stage '{}' could not decode input artifact '{}': {e}",
                self.stage_name, artifact.name
            ))
        })
    }

    /// Decodes the artifact of a specific upstream stage.
    pub fn decode<T: DeserializeOwned>(&self, stage: &str) -> Result<T, StageError> {
        let artifact = self.get(stage).ok_or_else(|| {
            StageError::fatal(format!(
                "stage '{}' has no input from '{stage}'",
                self.stage_name
            ))
        })?;
        artifact.decode().map_err(|e| {
            StageError::fatal(format!(
                "stage '{}' could not decode input from '{stage}': {e}",
                self.stage_name
            ))
        })
    }

    /// Returns the upstream stage names in declaration order.
    #[must_use]
    pub fn stages(&self) -> Vec<&str> {
        self.upstream.iter().map(|(name, _)| name.as_str()).collect()
    }

    /// Returns the initial input, if this is a root stage.
    #[must_use]
    pub fn initial(&self) -> Option<&Artifact> {
        self.initial.as_ref()
    }

    /// Returns true if no input is available.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.upstream.is_empty() && self.initial.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn artifact(name: &str, value: serde_json::Value) -> Artifact {
        Artifact::new(name, value)
    }

    #[test]
    fn test_single_from_chain() {
        let inputs = StageInputs::new("load", vec![("acquire".into(), artifact("raw", json!(5)))]);

        assert_eq!(inputs.single().unwrap().value, json!(5));
        assert_eq!(inputs.decode_single::<u64>().unwrap(), 5);
        assert_eq!(inputs.stages(), vec!["acquire"]);
    }

    #[test]
    fn test_single_from_initial_input() {
        let inputs = StageInputs::root("transform", Some(artifact("seed", json!(1000))));
        assert_eq!(inputs.decode_single::<u64>().unwrap(), 1000);
    }

    #[test]
    fn test_single_missing_input() {
        let inputs = StageInputs::root("acquire", None);
        let err = inputs.single().unwrap_err();
        assert!(!err.retryable);
        assert!(inputs.is_empty());
    }

    #[test]
    fn test_single_with_branches_is_an_error() {
        let inputs = StageInputs::new(
            "join",
            vec![
                ("left".into(), artifact("l", json!(1))),
                ("right".into(), artifact("r", json!(2))),
            ],
        );

        assert!(inputs.single().is_err());
        assert_eq!(inputs.decode::<u64>("right").unwrap(), 2);
        assert!(inputs.decode::<u64>("missing").is_err());
    }
}
