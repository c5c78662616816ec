//! Run, stage result and stage kind enums.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The kind of work a stage performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageKind {
    /// Pulls raw data from external sources.
    Acquire,
    /// Loads raw data into the relational store.
    Load,
    /// Runs warehouse transformations and checks.
    Transform,
    /// Enriches warehouse data (e.g., image classification).
    Enrich,
    /// Any other unit of work.
    #[default]
    Work,
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Acquire => write!(f, "acquire"),
            Self::Load => write!(f, "load"),
            Self::Transform => write!(f, "transform"),
            Self::Enrich => write!(f, "enrich"),
            Self::Work => write!(f, "work"),
        }
    }
}

/// The lifecycle status of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunStatus {
    /// Requested but not started.
    #[default]
    Pending,
    /// Stages are executing.
    Running,
    /// Every stage succeeded.
    Succeeded,
    /// At least one stage failed.
    Failed,
    /// At least one stage timed out and none failed.
    TimedOut,
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "PENDING"),
            Self::Running => write!(f, "RUNNING"),
            Self::Succeeded => write!(f, "SUCCEEDED"),
            Self::Failed => write!(f, "FAILED"),
            Self::TimedOut => write!(f, "TIMED_OUT"),
        }
    }
}

impl RunStatus {
    /// Returns true if the status represents a terminal state.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::TimedOut)
    }

    /// Returns true for terminal states other than success.
    #[must_use]
    pub fn is_unsuccessful(&self) -> bool {
        matches!(self, Self::Failed | Self::TimedOut)
    }

    /// Derives the terminal run status from its stage results.
    ///
    /// FAILED wins over TIMED_OUT; skipped stages never decide the outcome
    /// on their own because a skip always has a failed or timed-out ancestor.
    #[must_use]
    pub fn from_results<'a>(statuses: impl IntoIterator<Item = &'a StageResultStatus>) -> Self {
        let mut timed_out = false;
        for status in statuses {
            match status {
                StageResultStatus::Failed => return Self::Failed,
                StageResultStatus::TimedOut => timed_out = true,
                StageResultStatus::Succeeded | StageResultStatus::Skipped => {}
            }
        }
        if timed_out {
            Self::TimedOut
        } else {
            Self::Succeeded
        }
    }
}

/// The terminal outcome of one stage within a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StageResultStatus {
    /// Not executed because an upstream stage did not succeed.
    Skipped,
    /// The stage produced its artifact.
    Succeeded,
    /// Every attempt failed.
    Failed,
    /// The final attempt exceeded the stage's execution time limit.
    TimedOut,
}

impl fmt::Display for StageResultStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Skipped => write!(f, "SKIPPED"),
            Self::Succeeded => write!(f, "SUCCEEDED"),
            Self::Failed => write!(f, "FAILED"),
            Self::TimedOut => write!(f, "TIMED_OUT"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_kind_display() {
        assert_eq!(StageKind::Acquire.to_string(), "acquire");
        assert_eq!(StageKind::Enrich.to_string(), "enrich");
        assert_eq!(StageKind::default(), StageKind::Work);
    }

    #[test]
    fn test_run_status_serialize() {
        let json = serde_json::to_string(&RunStatus::TimedOut).unwrap();
        assert_eq!(json, r#""TIMED_OUT""#);

        let back: RunStatus = serde_json::from_str(r#""SUCCEEDED""#).unwrap();
        assert_eq!(back, RunStatus::Succeeded);
    }

    #[test]
    fn test_run_status_is_terminal() {
        assert!(RunStatus::Succeeded.is_terminal());
        assert!(RunStatus::TimedOut.is_terminal());
        assert!(!RunStatus::Running.is_terminal());
        assert!(!RunStatus::Pending.is_terminal());
    }

    #[test]
    fn test_run_status_from_results() {
        use StageResultStatus::*;

        assert_eq!(RunStatus::from_results(&[Succeeded, Succeeded]), RunStatus::Succeeded);
        assert_eq!(RunStatus::from_results(&[Succeeded, TimedOut, Skipped]), RunStatus::TimedOut);
        assert_eq!(RunStatus::from_results(&[TimedOut, Failed, Skipped]), RunStatus::Failed);
        assert_eq!(RunStatus::from_results(&Vec::new()), RunStatus::Succeeded);
    }
}
