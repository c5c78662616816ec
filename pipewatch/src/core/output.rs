//! Stage output: the artifact plus materialization metadata.

use super::Artifact;
use crate::errors::StageError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The output of a successful stage attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageOutput {
    /// The artifact handed to dependent stages.
    pub artifact: Artifact,

    /// Descriptive metadata recorded in the materialization log
    /// (record counts, paths, timestamps).
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, serde_json::Value>,
}

impl StageOutput {
    /// Creates an output for an artifact with no metadata.
    #[must_use]
    pub fn new(artifact: Artifact) -> Self {
        Self {
            artifact,
            metadata: BTreeMap::new(),
        }
    }

    /// Creates an output from a typed payload.
    ///
    /// Serialization failures are reported as fatal stage errors.
    pub fn typed<T: Serialize>(name: impl Into<String>, payload: &T) -> Result<Self, StageError> {
        let artifact = Artifact::from_typed(name, payload)
            .map_err(|e| StageError::fatal(format!("failed to encode artifact: {e}")))?;
        Ok(Self::new(artifact))
    }

    /// Adds a single metadata entry.
    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}
