//! Artifacts handed from one stage to its dependents.

use crate::utils::{generate_id, now_utc, Timestamp};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// An artifact produced by a stage.
///
/// The payload is stored as JSON so it can be recorded in run history and
/// the materialization log, while stages exchange it as typed values via
/// [`Artifact::from_typed`] and [`Artifact::decode`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Artifact {
    /// A unique identifier for the artifact.
    pub id: String,

    /// The asset name (e.g., "raw_database").
    pub name: String,

    /// The artifact payload.
    pub value: serde_json::Value,

    /// When the artifact was created.
    pub created_at: Timestamp,
}

impl Artifact {
    /// Creates a new artifact from a raw JSON payload.
    #[must_use]
    pub fn new(name: impl Into<String>, value: serde_json::Value) -> Self {
        Self {
            id: generate_id(),
            name: name.into(),
            value,
            created_at: now_utc(),
        }
    }

    /// Creates an artifact from a typed payload.
    pub fn from_typed<T: Serialize>(
        name: impl Into<String>,
        payload: &T,
    ) -> Result<Self, serde_json::Error> {
        Ok(Self::new(name, serde_json::to_value(payload)?))
    }

    /// Decodes the payload into a typed value.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        T::deserialize(&self.value)
    }

    /// Returns a lightweight reference to this artifact.
    #[must_use]
    pub fn reference(&self) -> ArtifactRef {
        ArtifactRef {
            id: self.id.clone(),
            name: self.name.clone(),
        }
    }
}

/// A reference to an artifact recorded on a stage result.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ArtifactRef {
    /// The artifact identifier.
    pub id: String,
    /// The asset name.
    pub name: String,
}
