//! Pipeline and data-volume statistics.

use crate::core::{Run, RunStatus};
use crate::utils::{hours_between, Timestamp};
use serde::{Deserialize, Serialize};

/// Aggregate statistics over the most recent runs of one pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineStats {
    /// The pipeline name.
    pub pipeline: String,
    /// Runs in the sample, including in-flight ones.
    pub total_runs: usize,
    /// Runs that succeeded.
    pub successful_runs: usize,
    /// Runs that failed or timed out.
    pub failed_runs: usize,
    /// Runs that timed out (also counted in `failed_runs`).
    pub timed_out_runs: usize,
    /// Runs not yet terminal.
    pub running_runs: usize,
    /// `successful_runs / total_runs`; zero for an empty sample.
    pub success_rate: f64,
    /// `failed_runs / total_runs`; zero for an empty sample.
    pub failure_rate: f64,
    /// Mean run duration in seconds over runs with both start and end times.
    pub avg_execution_time: Option<f64>,
    /// Longest run duration in seconds over runs with both start and end times.
    pub max_execution_time: Option<f64>,
    /// Start time of the most recent run.
    pub last_run_time: Option<Timestamp>,
    /// Hours since the most recent run started.
    pub hours_since_last_run: Option<f64>,
    /// Status of the most recent run.
    pub last_status: Option<RunStatus>,
}

impl PipelineStats {
    /// Statistics for a pipeline with no sampled runs.
    #[must_use]
    pub fn empty(pipeline: impl Into<String>) -> Self {
        Self {
            pipeline: pipeline.into(),
            total_runs: 0,
            successful_runs: 0,
            failed_runs: 0,
            timed_out_runs: 0,
            running_runs: 0,
            success_rate: 0.0,
            failure_rate: 0.0,
            avg_execution_time: None,
            max_execution_time: None,
            last_run_time: None,
            hours_since_last_run: None,
            last_status: None,
        }
    }

    /// Aggregates `runs`, which must be ordered newest first.
    #[must_use]
    pub fn from_runs(pipeline: impl Into<String>, runs: &[Run], now: Timestamp) -> Self {
        let mut stats = Self::empty(pipeline);
        if runs.is_empty() {
            return stats;
        }

        let total = runs.len();
        let count = |status: RunStatus| runs.iter().filter(|r| r.status == status).count();
        stats.total_runs = total;
        stats.successful_runs = count(RunStatus::Succeeded);
        stats.timed_out_runs = count(RunStatus::TimedOut);
        stats.failed_runs = count(RunStatus::Failed) + stats.timed_out_runs;
        stats.running_runs = runs.iter().filter(|r| !r.is_terminal()).count();

        stats.success_rate = stats.successful_runs as f64 / total as f64;
        stats.failure_rate = stats.failed_runs as f64 / total as f64;

        let durations: Vec<f64> = runs.iter().filter_map(Run::duration_seconds).collect();
        if !durations.is_empty() {
            let avg = durations.iter().sum::<f64>() / durations.len() as f64;
            stats.avg_execution_time = Some(avg);
            stats.max_execution_time = durations.iter().copied().reduce(f64::max);
        }

        let last = &runs[0];
        stats.last_run_time = Some(last.started_at);
        stats.hours_since_last_run = Some(hours_between(&last.started_at, &now));
        stats.last_status = Some(last.status);

        stats
    }

    /// Returns true if no runs were sampled.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.total_runs == 0
    }
}

/// Current data-volume totals.
///
/// Every field is optional; an unavailable volume source yields the empty
/// value, which serializes as `{}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DataStats {
    /// Total records (messages) in the store.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_messages: Option<u64>,
    /// Distinct channels.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unique_channels: Option<u64>,
    /// Earliest record covered.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub earliest_message: Option<Timestamp>,
    /// Latest record covered.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latest_message: Option<Timestamp>,
    /// Hours between the earliest and latest record.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_span_hours: Option<f64>,
    /// Images processed by enrichment.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_images: Option<u64>,
    /// Distinct categories detected.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unique_categories: Option<u64>,
}

impl DataStats {
    /// Returns true if no totals are known.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Sets the time span from the earliest and latest record, if both are known.
    #[must_use]
    pub fn with_time_span(mut self) -> Self {
        self.time_span_hours = match (&self.earliest_message, &self.latest_message) {
            (Some(start), Some(end)) => Some(hours_between(start, end)),
            _ => None,
        };
        self
    }
}
