//! Narrow contracts for the external systems the pipeline drives.
//!
//! The acquisition client, loader, transformation tool, enrichment model and
//! data-volume query are replaceable collaborators. Each returns a typed
//! result so the orchestrator never parses log text.

use crate::errors::CollaboratorError;
use crate::monitor::DataStats;
use crate::utils::Timestamp;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Debug;

/// Records and media pulled from one source in one request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceBatch {
    /// Number of records acquired.
    pub records: u64,
    /// Number of media files downloaded alongside the records.
    pub media_files: u64,
}

/// Client for the message/image acquisition service.
///
/// The client has an explicit lifecycle: `connect` once, `fetch` any number
/// of times (possibly concurrently), then `close`.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AcquisitionClient: Send + Sync + Debug {
    /// Opens the session.
    async fn connect(&self) -> Result<(), CollaboratorError>;

    /// Fetches up to `limit` records from one source.
    ///
    /// Rate limiting is reported as [`CollaboratorError::RateLimited`] and
    /// access problems as [`CollaboratorError::AccessDenied`].
    async fn fetch(&self, source: &str, limit: usize) -> Result<SourceBatch, CollaboratorError>;

    /// Closes the session.
    async fn close(&self) -> Result<(), CollaboratorError>;

    /// Location of the raw data written by this client.
    fn raw_data_location(&self) -> String;
}

/// Per-source outcome of an acquisition pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceStatus {
    /// Records were acquired.
    Completed,
    /// Access was denied; fatal for this source only.
    Denied,
    /// All attempts failed.
    Failed,
}

/// Outcome of acquiring one source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceOutcome {
    /// The source name.
    pub source: String,
    /// The outcome.
    pub status: SourceStatus,
    /// Records acquired.
    pub records: u64,
    /// Media files acquired.
    pub media_files: u64,
    /// Fetch attempts made, including rate-limited ones.
    pub attempts: u32,
    /// The last error, if the source did not complete.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Handle to newly acquired raw data; the acquire stage's artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawDataHandle {
    /// Where the raw data was written.
    pub location: String,
    /// Per-source outcomes in configured source order.
    pub sources: Vec<SourceOutcome>,
}

impl RawDataHandle {
    /// Total records acquired across sources.
    #[must_use]
    pub fn records_acquired(&self) -> u64 {
        self.sources.iter().map(|s| s.records).sum()
    }

    /// Names of sources that completed.
    #[must_use]
    pub fn completed_sources(&self) -> Vec<&str> {
        self.sources
            .iter()
            .filter(|s| s.status == SourceStatus::Completed)
            .map(|s| s.source.as_str())
            .collect()
    }
}

/// Result of loading raw data into the relational store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadReport {
    /// Newly loaded records; re-loading already-loaded data adds zero.
    pub records_loaded: u64,
    /// Distinct channels present in the store.
    #[serde(default)]
    pub unique_channels: u64,
    /// Messages carrying media.
    #[serde(default)]
    pub messages_with_media: u64,
    /// Earliest record date in the store.
    #[serde(default)]
    pub earliest_record: Option<Timestamp>,
    /// Latest record date in the store.
    #[serde(default)]
    pub latest_record: Option<Timestamp>,
}

impl LoadReport {
    /// A report carrying only a record count; seeds transform-only runs.
    #[must_use]
    pub fn with_records(records_loaded: u64) -> Self {
        Self {
            records_loaded,
            ..Self::default()
        }
    }
}

/// Loader for the relational store.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LoadCollaborator: Send + Sync + Debug {
    /// Loads the raw data behind `handle`. Must be idempotent.
    async fn load(&self, handle: &RawDataHandle) -> Result<LoadReport, CollaboratorError>;
}

/// Outcome of one internal check run by the transformation tool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckOutcome {
    /// Check name (e.g., "run", "test").
    pub name: String,
    /// Whether the check passed.
    pub success: bool,
    /// Machine-readable counts (models built, tests passed, ...).
    #[serde(default)]
    pub counts: BTreeMap<String, u64>,
    /// Failure detail.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl CheckOutcome {
    /// A passing check.
    #[must_use]
    pub fn passed(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            success: true,
            counts: BTreeMap::new(),
            message: None,
        }
    }

    /// A failing check.
    #[must_use]
    pub fn failed(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            success: false,
            counts: BTreeMap::new(),
            message: Some(message.into()),
        }
    }

    /// Adds a count.
    #[must_use]
    pub fn with_count(mut self, key: impl Into<String>, value: u64) -> Self {
        self.counts.insert(key.into(), value);
        self
    }
}

/// Structured summary returned by the transformation tool.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransformSummary {
    /// Every check that ran, in order.
    pub checks: Vec<CheckOutcome>,
}

impl TransformSummary {
    /// Returns true if every check passed.
    #[must_use]
    pub fn all_passed(&self) -> bool {
        self.checks.iter().all(|c| c.success)
    }

    /// Returns the checks that failed.
    #[must_use]
    pub fn failed_checks(&self) -> Vec<&CheckOutcome> {
        self.checks.iter().filter(|c| !c.success).collect()
    }

    /// Number of checks that passed.
    #[must_use]
    pub fn passed_count(&self) -> usize {
        self.checks.iter().filter(|c| c.success).count()
    }
}

/// Warehouse transformation tool.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TransformCollaborator: Send + Sync + Debug {
    /// Runs transformations; `records_loaded` is a sanity signal.
    async fn transform(&self, records_loaded: u64) -> Result<TransformSummary, CollaboratorError>;
}

/// Result of the enrichment collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum EnrichmentOutcome {
    /// There was nothing to enrich.
    Skipped {
        /// Why nothing was processed (e.g., "no_images").
        reason: String,
    },
    /// Items were processed.
    Completed {
        /// Items examined.
        items_processed: u64,
        /// Items assigned a category.
        items_categorized: u64,
        /// Results written back to the store.
        items_loaded: u64,
        /// Distinct categories detected.
        categories_detected: u64,
    },
}

/// Enrichment (object detection / classification) collaborator.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EnrichmentCollaborator: Send + Sync + Debug {
    /// Enriches the warehouse built by the transform stage.
    async fn enrich(&self, summary: &TransformSummary) -> Result<EnrichmentOutcome, CollaboratorError>;
}

/// Read-only source of current data-volume totals.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DataVolumeSource: Send + Sync + Debug {
    /// Returns the current totals.
    async fn current_totals(&self) -> Result<DataStats, CollaboratorError>;
}
