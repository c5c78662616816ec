//! Alert rule evaluation.
//!
//! Each [`AlertKind`] maps to an evaluator that extracts an [`AlertSignal`]
//! from the current statistics. The engine compares the signal's observed
//! value against every rule of that kind and renders a message for each rule
//! that fires. All matching rules fire; rule order carries no meaning.

use super::rules::{AlertKind, AlertRule, Severity};
use super::stats::{DataStats, PipelineStats};
use super::template::AlertContext;
use crate::core::RunStatus;
use crate::errors::TemplateError;
use crate::utils::{now_utc, Timestamp};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, error, warn};

/// The realized result of a triggered alert rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertEvent {
    /// Alert type key.
    pub alert_type: String,
    /// Severity of the rule that fired.
    pub severity: Severity,
    /// Rendered message.
    pub message: String,
    /// When the event was produced.
    pub timestamp: Timestamp,
    /// Values that caused the rule to fire.
    pub data: AlertContext,
}

/// The observation an alert kind is evaluated against.
#[derive(Debug, Clone, PartialEq)]
pub enum AlertSignal {
    /// Status of the latest run.
    PipelineFailure {
        /// The latest run's status.
        status: RunStatus,
    },
    /// Longest run duration in the sample.
    LongExecutionTime {
        /// Duration in seconds.
        execution_time: f64,
    },
    /// Records currently in the store.
    LowDataVolume {
        /// Record count.
        records_processed: u64,
    },
    /// Failed share of sampled runs.
    HighFailureRate {
        /// `failed_runs / total_runs`.
        failure_rate: f64,
        /// Failed or timed-out runs.
        failed_runs: usize,
        /// Sampled runs.
        total_runs: usize,
    },
    /// Time since the latest run started.
    StaleData {
        /// Hours elapsed.
        hours_since_last_run: f64,
    },
}

impl AlertSignal {
    /// Returns the value compared against rule thresholds.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn observed(&self) -> f64 {
        match self {
            Self::PipelineFailure { status } => {
                if status.is_unsuccessful() {
                    1.0
                } else {
                    0.0
                }
            }
            Self::LongExecutionTime { execution_time } => *execution_time,
            Self::LowDataVolume { records_processed } => *records_processed as f64,
            Self::HighFailureRate { failure_rate, .. } => *failure_rate,
            Self::StaleData {
                hours_since_last_run,
            } => *hours_since_last_run,
        }
    }

    /// Builds the template context for a rule with `threshold`.
    #[must_use]
    pub fn context(&self, threshold: f64) -> AlertContext {
        let context = AlertContext::new().with_number("threshold", threshold);
        match self {
            Self::PipelineFailure { status } => context.with_text("status", status.to_string()),
            Self::LongExecutionTime { execution_time } => {
                context.with_number("execution_time", *execution_time)
            }
            Self::LowDataVolume { records_processed } => context.with_integer(
                "records_processed",
                i64::try_from(*records_processed).unwrap_or(i64::MAX),
            ),
            Self::HighFailureRate {
                failure_rate,
                failed_runs,
                total_runs,
            } => context
                .with_number("failure_rate", *failure_rate)
                .with_integer("failed_runs", i64::try_from(*failed_runs).unwrap_or(i64::MAX))
                .with_integer("total_runs", i64::try_from(*total_runs).unwrap_or(i64::MAX)),
            Self::StaleData {
                hours_since_last_run,
            } => context.with_number("hours_since_last_run", *hours_since_last_run),
        }
    }
}

/// Extracts a signal from the statistics, or `None` if the value is unavailable.
pub type Evaluator = fn(&PipelineStats, &DataStats) -> Option<AlertSignal>;

fn pipeline_failure(stats: &PipelineStats, _: &DataStats) -> Option<AlertSignal> {
    stats
        .last_status
        .map(|status| AlertSignal::PipelineFailure { status })
}

fn long_execution_time(stats: &PipelineStats, _: &DataStats) -> Option<AlertSignal> {
    stats
        .max_execution_time
        .map(|execution_time| AlertSignal::LongExecutionTime { execution_time })
}

fn low_data_volume(_: &PipelineStats, data: &DataStats) -> Option<AlertSignal> {
    data.total_messages
        .map(|records_processed| AlertSignal::LowDataVolume { records_processed })
}

fn high_failure_rate(stats: &PipelineStats, _: &DataStats) -> Option<AlertSignal> {
    (!stats.is_empty()).then(|| AlertSignal::HighFailureRate {
        failure_rate: stats.failure_rate,
        failed_runs: stats.failed_runs,
        total_runs: stats.total_runs,
    })
}

fn stale_data(stats: &PipelineStats, _: &DataStats) -> Option<AlertSignal> {
    stats
        .hours_since_last_run
        .map(|hours_since_last_run| AlertSignal::StaleData {
            hours_since_last_run,
        })
}

/// Why a rule produced no event despite being evaluated.
#[derive(Debug, Clone, PartialEq)]
pub enum SkipReason {
    /// The alert type has no evaluator.
    UnknownAlertType,
    /// The rule fired but its message could not be rendered.
    Render(TemplateError),
}

/// A rule that was skipped during evaluation.
#[derive(Debug, Clone, PartialEq)]
pub struct SkippedRule {
    /// The rule's alert type.
    pub alert_type: String,
    /// Why it was skipped.
    pub reason: SkipReason,
}

/// Events and skipped rules from one evaluation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Evaluation {
    /// Events for rules that fired.
    pub events: Vec<AlertEvent>,
    /// Rules that could not be evaluated or rendered.
    pub skipped: Vec<SkippedRule>,
}

/// Evaluates alert rules against pipeline and data statistics.
#[derive(Debug, Clone)]
pub struct AlertRuleEngine {
    evaluators: HashMap<AlertKind, Evaluator>,
}

impl Default for AlertRuleEngine {
    fn default() -> Self {
        let evaluators: [(AlertKind, Evaluator); 5] = [
            (AlertKind::PipelineFailure, pipeline_failure),
            (AlertKind::LongExecutionTime, long_execution_time),
            (AlertKind::LowDataVolume, low_data_volume),
            (AlertKind::HighFailureRate, high_failure_rate),
            (AlertKind::StaleData, stale_data),
        ];
        Self {
            evaluators: evaluators.into_iter().collect(),
        }
    }
}

impl AlertRuleEngine {
    /// Creates an engine with the built-in evaluators.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the evaluator for `kind`.
    #[must_use]
    pub fn with_evaluator(mut self, kind: AlertKind, evaluator: Evaluator) -> Self {
        self.evaluators.insert(kind, evaluator);
        self
    }

    /// Evaluates `rules`, returning the events of every rule that fired.
    #[must_use]
    pub fn evaluate(
        &self,
        rules: &[AlertRule],
        stats: &PipelineStats,
        data: &DataStats,
    ) -> Vec<AlertEvent> {
        self.evaluate_detailed(rules, stats, data).events
    }

    /// Evaluates `rules`, also reporting rules that were skipped.
    #[must_use]
    pub fn evaluate_detailed(
        &self,
        rules: &[AlertRule],
        stats: &PipelineStats,
        data: &DataStats,
    ) -> Evaluation {
        let mut evaluation = Evaluation::default();

        for rule in rules {
            let Some(evaluator) = rule.kind().and_then(|k| self.evaluators.get(&k)) else {
                warn!(alert_type = %rule.alert_type, "Skipping rule with unknown alert type");
                evaluation.skipped.push(SkippedRule {
                    alert_type: rule.alert_type.clone(),
                    reason: SkipReason::UnknownAlertType,
                });
                continue;
            };

            let Some(signal) = evaluator(stats, data) else {
                debug!(alert_type = %rule.alert_type, "No observation available for rule");
                continue;
            };

            if !rule.comparison.apply(signal.observed(), rule.threshold) {
                continue;
            }

            let context = signal.context(rule.threshold);
            match rule.message_template.render(&context) {
                Ok(message) => evaluation.events.push(AlertEvent {
                    alert_type: rule.alert_type.clone(),
                    severity: rule.severity,
                    message,
                    timestamp: now_utc(),
                    data: context,
                }),
                Err(e) => {
                    error!(
                        alert_type = %rule.alert_type,
                        error = %e,
                        "Alert rule message could not be rendered; rule skipped"
                    );
                    evaluation.skipped.push(SkippedRule {
                        alert_type: rule.alert_type.clone(),
                        reason: SkipReason::Render(e),
                    });
                }
            }
        }

        evaluation
    }
}
