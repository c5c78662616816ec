//! Append-only log of artifacts produced by each stage of each run.
//!
//! Records are never mutated or deleted. They serve as the lineage trail and
//! feed the monitor's data-volume checks through
//! [`MaterializationVolumeSource`].

mod jsonl;
mod volume;

pub use jsonl::{JsonlMaterializationLog, JsonlMaterializationReader};
pub use volume::MaterializationVolumeSource;

use crate::core::{ArtifactRef, StageOutput};
use crate::errors::PersistenceError;
use crate::utils::{generate_id, now_utc, Timestamp};
use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Immutable fact tying a stage result to the artifact it produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaterializationRecord {
    /// Record id.
    pub id: String,
    /// The run that produced the artifact.
    pub run_id: String,
    /// The pipeline name.
    pub pipeline: String,
    /// The stage that produced the artifact.
    pub stage: String,
    /// Asset name (the artifact name).
    pub asset: String,
    /// The artifact produced.
    pub artifact: ArtifactRef,
    /// Free-form descriptive metadata supplied by the stage.
    #[serde(default)]
    pub metadata: BTreeMap<String, serde_json::Value>,
    /// When the record was appended.
    pub recorded_at: Timestamp,
}

impl MaterializationRecord {
    /// Creates a record for a stage's successful output.
    #[must_use]
    pub fn from_output(
        run_id: impl Into<String>,
        pipeline: impl Into<String>,
        stage: impl Into<String>,
        output: &StageOutput,
    ) -> Self {
        Self {
            id: generate_id(),
            run_id: run_id.into(),
            pipeline: pipeline.into(),
            stage: stage.into(),
            asset: output.artifact.name.clone(),
            artifact: output.artifact.reference(),
            metadata: output.metadata.clone(),
            recorded_at: now_utc(),
        }
    }

    /// Returns a metadata value as an unsigned integer, if present.
    #[must_use]
    pub fn metadata_u64(&self, key: &str) -> Option<u64> {
        self.metadata.get(key).and_then(serde_json::Value::as_u64)
    }
}

/// Append-only materialization log.
#[async_trait]
pub trait MaterializationLog: Send + Sync + std::fmt::Debug {
    /// Appends a record.
    async fn append(&self, record: &MaterializationRecord) -> Result<(), PersistenceError>;

    /// Returns the records of one run, in append order.
    async fn records_for_run(&self, run_id: &str)
        -> Result<Vec<MaterializationRecord>, PersistenceError>;

    /// Returns the records of one asset, in append order.
    async fn records_for_asset(&self, asset: &str)
        -> Result<Vec<MaterializationRecord>, PersistenceError>;

    /// Returns every record, in append order.
    async fn all(&self) -> Result<Vec<MaterializationRecord>, PersistenceError>;
}

/// In-memory materialization log.
#[derive(Debug, Default)]
pub struct InMemoryMaterializationLog {
    records: RwLock<Vec<MaterializationRecord>>,
}

impl InMemoryMaterializationLog {
    /// Creates an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    /// Returns true if the log is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }

    pub(crate) fn push(&self, record: MaterializationRecord) {
        self.records.write().push(record);
    }

    fn filtered(&self, keep: impl Fn(&MaterializationRecord) -> bool) -> Vec<MaterializationRecord> {
        self.records.read().iter().filter(|r| keep(r)).cloned().collect()
    }
}

#[async_trait]
impl MaterializationLog for InMemoryMaterializationLog {
    async fn append(&self, record: &MaterializationRecord) -> Result<(), PersistenceError> {
        self.push(record.clone());
        Ok(())
    }

    async fn records_for_run(
        &self,
        run_id: &str,
    ) -> Result<Vec<MaterializationRecord>, PersistenceError> {
        Ok(self.filtered(|r| r.run_id == run_id))
    }

    async fn records_for_asset(
        &self,
        asset: &str,
    ) -> Result<Vec<MaterializationRecord>, PersistenceError> {
        Ok(self.filtered(|r| r.asset == asset))
    }

    async fn all(&self) -> Result<Vec<MaterializationRecord>, PersistenceError> {
        Ok(self.filtered(|_| true))
    }
}
