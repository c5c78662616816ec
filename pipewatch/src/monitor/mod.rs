//! Pipeline health monitoring.
//!
//! A [`MonitorCycle`] samples recent runs from the run history, reads
//! data-volume totals, evaluates the configured [`AlertRule`]s through the
//! [`AlertRuleEngine`], appends each [`AlertEvent`] to an [`AlertLog`] and
//! persists a [`MonitoringReport`]. [`MonitorScheduler`] repeats this on a
//! fixed interval.

mod alert_log;
mod cycle;
mod engine;
mod report;
mod rules;
mod scheduler;
mod stats;
mod template;

pub use alert_log::{AlertLog, FileAlertLog, InMemoryAlertLog};
pub use cycle::{MonitorCycle, DEFAULT_SAMPLE_SIZE};
pub use engine::{
    AlertEvent, AlertRuleEngine, AlertSignal, Evaluation, Evaluator, SkipReason, SkippedRule,
};
pub use report::{
    FileReportStore, HealthStatus, InMemoryReportStore, MonitoringReport, ReportStore,
    LATEST_REPORT_FILE,
};
pub use rules::{AlertKind, AlertRule, AlertRuleSet, Comparator, Severity};
pub use scheduler::{MonitorScheduler, SchedulerSnapshot, SchedulerStats};
pub use stats::{DataStats, PipelineStats};
pub use template::{AlertContext, ContextValue, MessageTemplate};

#[cfg(test)]
pub use alert_log::MockAlertLog;
#[cfg(test)]
pub use report::MockReportStore;
