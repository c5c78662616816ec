//! Runs and their per-stage results.

use super::{ArtifactRef, RunStatus, StageResultStatus};
use crate::utils::{generate_run_id, now_utc, seconds_between, Timestamp};
use serde::{Deserialize, Serialize};

/// The terminal outcome of one stage within a run.
///
/// Owned exclusively by its parent [`Run`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageResult {
    /// The stage name.
    pub stage: String,
    /// The terminal status.
    pub status: StageResultStatus,
    /// When the first attempt started.
    pub started_at: Option<Timestamp>,
    /// When the last attempt ended.
    pub ended_at: Option<Timestamp>,
    /// Number of attempts made (zero for skipped stages).
    pub attempts: u32,
    /// Error summary of the final attempt.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// The artifact produced, if the stage succeeded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact: Option<ArtifactRef>,
}

impl StageResult {
    /// Creates a succeeded result.
    #[must_use]
    pub fn succeeded(
        stage: impl Into<String>,
        started_at: Timestamp,
        attempts: u32,
        artifact: ArtifactRef,
    ) -> Self {
        Self {
            stage: stage.into(),
            status: StageResultStatus::Succeeded,
            started_at: Some(started_at),
            ended_at: Some(now_utc()),
            attempts,
            error: None,
            artifact: Some(artifact),
        }
    }

    /// Creates a failed or timed-out result.
    #[must_use]
    pub fn unsuccessful(
        stage: impl Into<String>,
        status: StageResultStatus,
        started_at: Timestamp,
        attempts: u32,
        error: impl Into<String>,
    ) -> Self {
        Self {
            stage: stage.into(),
            status,
            started_at: Some(started_at),
            ended_at: Some(now_utc()),
            attempts,
            error: Some(error.into()),
            artifact: None,
        }
    }

    /// Creates a skipped result.
    #[must_use]
    pub fn skipped(stage: impl Into<String>, reason: impl Into<String>) -> Self {
        let now = now_utc();
        Self {
            stage: stage.into(),
            status: StageResultStatus::Skipped,
            started_at: Some(now),
            ended_at: Some(now),
            attempts: 0,
            error: Some(reason.into()),
            artifact: None,
        }
    }

    /// Returns the wall-clock duration in seconds, if both ends are known.
    #[must_use]
    pub fn duration_seconds(&self) -> Option<f64> {
        match (&self.started_at, &self.ended_at) {
            (Some(start), Some(end)) => Some(seconds_between(start, end)),
            _ => None,
        }
    }
}

/// One execution of a pipeline definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Run {
    /// Unique run id.
    pub id: String,
    /// The pipeline definition name.
    pub pipeline: String,
    /// Current status.
    pub status: RunStatus,
    /// When the run was started.
    pub started_at: Timestamp,
    /// When the run reached a terminal status.
    #[serde(default)]
    pub ended_at: Option<Timestamp>,
    /// The stage currently executing, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_stage: Option<String>,
    /// Stage results in execution order.
    #[serde(default)]
    pub stage_results: Vec<StageResult>,
}

impl Run {
    /// Creates a pending run for a pipeline.
    #[must_use]
    pub fn new(pipeline: impl Into<String>) -> Self {
        Self {
            id: generate_run_id(),
            pipeline: pipeline.into(),
            status: RunStatus::Pending,
            started_at: now_utc(),
            ended_at: None,
            current_stage: None,
            stage_results: Vec::new(),
        }
    }

    /// Returns the result recorded for a stage, if any.
    #[must_use]
    pub fn result_for(&self, stage: &str) -> Option<&StageResult> {
        self.stage_results.iter().find(|r| r.stage == stage)
    }

    /// Returns true once the run has reached a terminal status.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Returns the run duration in seconds, if it has ended.
    #[must_use]
    pub fn duration_seconds(&self) -> Option<f64> {
        self.ended_at
            .as_ref()
            .map(|end| seconds_between(&self.started_at, end))
    }
}
