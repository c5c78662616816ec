//! Run lifecycle events.
//!
//! The executor emits a [`PipelineEvent`] for every run and stage transition
//! through an injected [`EventSink`]. Sinks must not block and must never
//! fail the run.

mod sink;

pub use sink::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};

use crate::core::RunStatus;
use serde::{Deserialize, Serialize};

/// A run or stage lifecycle transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum PipelineEvent {
    /// A run was started.
    #[serde(rename = "run.started")]
    RunStarted {
        /// The run id.
        run_id: String,
        /// The pipeline name.
        pipeline: String,
    },
    /// A stage attempt is starting.
    #[serde(rename = "stage.started")]
    StageStarted {
        /// The run id.
        run_id: String,
        /// The stage name.
        stage: String,
        /// Attempt number, starting at 1.
        attempt: u32,
    },
    /// A stage attempt failed and another will follow.
    #[serde(rename = "stage.retrying")]
    StageRetrying {
        /// The run id.
        run_id: String,
        /// The stage name.
        stage: String,
        /// The attempt that failed.
        attempt: u32,
        /// Delay before the next attempt.
        delay_ms: u64,
        /// The failure.
        error: String,
    },
    /// A stage succeeded.
    #[serde(rename = "stage.completed")]
    StageCompleted {
        /// The run id.
        run_id: String,
        /// The stage name.
        stage: String,
        /// Attempts made.
        attempts: u32,
        /// Wall-clock duration across attempts.
        duration_ms: u64,
    },
    /// A stage failed after its last attempt.
    #[serde(rename = "stage.failed")]
    StageFailed {
        /// The run id.
        run_id: String,
        /// The stage name.
        stage: String,
        /// Attempts made.
        attempts: u32,
        /// The final error.
        error: String,
    },
    /// A stage exceeded its time limit on its last attempt.
    #[serde(rename = "stage.timed_out")]
    StageTimedOut {
        /// The run id.
        run_id: String,
        /// The stage name.
        stage: String,
        /// Attempts made.
        attempts: u32,
    },
    /// A stage was not run because an upstream stage did not succeed.
    #[serde(rename = "stage.skipped")]
    StageSkipped {
        /// The run id.
        run_id: String,
        /// The stage name.
        stage: String,
        /// Why it was skipped.
        reason: String,
    },
    /// A run reached a terminal status.
    #[serde(rename = "run.completed")]
    RunCompleted {
        /// The run id.
        run_id: String,
        /// The pipeline name.
        pipeline: String,
        /// The terminal status.
        status: RunStatus,
    },
}

impl PipelineEvent {
    /// Returns the dotted event type (e.g., `"stage.retrying"`).
    #[must_use]
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::RunStarted { .. } => "run.started",
            Self::StageStarted { .. } => "stage.started",
            Self::StageRetrying { .. } => "stage.retrying",
            Self::StageCompleted { .. } => "stage.completed",
            Self::StageFailed { .. } => "stage.failed",
            Self::StageTimedOut { .. } => "stage.timed_out",
            Self::StageSkipped { .. } => "stage.skipped",
            Self::RunCompleted { .. } => "run.completed",
        }
    }

    /// Returns the run the event belongs to.
    #[must_use]
    pub fn run_id(&self) -> &str {
        match self {
            Self::RunStarted { run_id, .. }
            | Self::StageStarted { run_id, .. }
            | Self::StageRetrying { run_id, .. }
            | Self::StageCompleted { run_id, .. }
            | Self::StageFailed { run_id, .. }
            | Self::StageTimedOut { run_id, .. }
            | Self::StageSkipped { run_id, .. }
            | Self::RunCompleted { run_id, .. } => run_id,
        }
    }

    /// Returns the stage the event concerns, if any.
    #[must_use]
    pub fn stage(&self) -> Option<&str> {
        match self {
            Self::StageStarted { stage, .. }
            | Self::StageRetrying { stage, .. }
            | Self::StageCompleted { stage, .. }
            | Self::StageFailed { stage, .. }
            | Self::StageTimedOut { stage, .. }
            | Self::StageSkipped { stage, .. } => Some(stage),
            Self::RunStarted { .. } | Self::RunCompleted { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_event_type_matches_serde_tag() {
        let event = PipelineEvent::StageRetrying {
            run_id: "r1".into(),
            stage: "acquire".into(),
            attempt: 1,
            delay_ms: 250,
            error: "socket reset".into(),
        };

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], event.event_type());
        assert_eq!(event.run_id(), "r1");
        assert_eq!(event.stage(), Some("acquire"));
    }

    #[test]
    fn test_run_events_have_no_stage() {
        let event = PipelineEvent::RunCompleted {
            run_id: "r1".into(),
            pipeline: "etl_pipeline".into(),
            status: RunStatus::Failed,
        };
        assert_eq!(event.stage(), None);
        assert_eq!(serde_json::to_value(&event).unwrap()["status"], "FAILED");
    }
}
