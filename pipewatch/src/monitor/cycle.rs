//! One monitoring pass: gather statistics, evaluate rules, persist a report.

use super::alert_log::AlertLog;
use super::engine::{AlertEvent, AlertRuleEngine};
use super::report::{MonitoringReport, ReportStore};
use super::rules::{AlertRuleSet, Severity};
use super::stats::{DataStats, PipelineStats};
use crate::collaborators::DataVolumeSource;
use crate::errors::{AlertConfigError, CycleError};
use crate::history::RunHistoryStore;
use crate::observability::SpanTimer;
use crate::utils::now_utc;
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::{error, info, instrument, warn};

/// Default number of recent runs sampled per cycle.
pub const DEFAULT_SAMPLE_SIZE: usize = 50;

/// Produces a [`MonitoringReport`] for one pipeline from its run history and
/// data-volume totals.
///
/// Collaborator failures degrade the cycle instead of aborting it; only a
/// failure to persist the report fails the cycle, and that never touches the
/// previously persisted report.
#[derive(Debug)]
pub struct MonitorCycle {
    pipeline: String,
    sample_size: usize,
    history: Arc<dyn RunHistoryStore>,
    volume: Arc<dyn DataVolumeSource>,
    alert_log: Arc<dyn AlertLog>,
    reports: Arc<dyn ReportStore>,
    rules: RwLock<AlertRuleSet>,
    engine: AlertRuleEngine,
}

impl MonitorCycle {
    /// Creates a cycle for `pipeline` with the default rules and engine.
    #[must_use]
    pub fn new(
        pipeline: impl Into<String>,
        history: Arc<dyn RunHistoryStore>,
        volume: Arc<dyn DataVolumeSource>,
        alert_log: Arc<dyn AlertLog>,
        reports: Arc<dyn ReportStore>,
    ) -> Self {
        Self {
            pipeline: pipeline.into(),
            sample_size: DEFAULT_SAMPLE_SIZE,
            history,
            volume,
            alert_log,
            reports,
            rules: RwLock::new(AlertRuleSet::defaults()),
            engine: AlertRuleEngine::default(),
        }
    }

    /// Sets the alert rules.
    #[must_use]
    pub fn with_rules(mut self, rules: AlertRuleSet) -> Self {
        *self.rules.get_mut() = rules;
        self
    }

    /// Sets the number of recent runs sampled.
    #[must_use]
    pub fn with_sample_size(mut self, sample_size: usize) -> Self {
        self.sample_size = sample_size;
        self
    }

    /// Sets the rule engine.
    #[must_use]
    pub fn with_engine(mut self, engine: AlertRuleEngine) -> Self {
        self.engine = engine;
        self
    }

    /// Returns the monitored pipeline.
    #[must_use]
    pub fn pipeline(&self) -> &str {
        &self.pipeline
    }

    /// Returns a copy of the current rules.
    #[must_use]
    pub fn rules(&self) -> AlertRuleSet {
        self.rules.read().clone()
    }

    /// Reloads the alert rules from their backing file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file is unreadable or invalid; the current
    /// rules stay in effect.
    pub async fn reload_rules(&self) -> Result<(), AlertConfigError> {
        let mut fresh = self.rules();
        fresh.reload().await?;
        *self.rules.write() = fresh;
        Ok(())
    }

    /// Runs one cycle.
    ///
    /// # Errors
    ///
    /// Returns [`CycleError::Report`] if the report cannot be persisted.
    #[instrument(skip(self), fields(pipeline = %self.pipeline))]
    pub async fn run_cycle(&self) -> Result<MonitoringReport, CycleError> {
        let timer = SpanTimer::start("monitor_cycle");
        let timestamp = now_utc();
        let mut warnings = Vec::new();

        let pipeline_stats = match self
            .history
            .query_recent_runs(&self.pipeline, self.sample_size)
            .await
        {
            Ok(runs) => PipelineStats::from_runs(&self.pipeline, &runs, timestamp),
            Err(e) => {
                warn!(error = %e, "Run history unavailable; continuing with empty pipeline statistics");
                warnings.push(format!("run history unavailable: {e}"));
                PipelineStats::empty(&self.pipeline)
            }
        };

        let data_stats = match self.volume.current_totals().await {
            Ok(stats) => stats,
            Err(e) => {
                warn!(error = %e, "Data volume source unavailable; continuing with empty data statistics");
                warnings.push(format!("data volume unavailable: {e}"));
                DataStats::default()
            }
        };

        let rules = self.rules();
        let alerts = self
            .engine
            .evaluate(rules.rules(), &pipeline_stats, &data_stats);

        for alert in &alerts {
            log_alert(alert);
            if let Err(e) = self.alert_log.append(alert).await {
                warn!(alert_type = %alert.alert_type, error = %e, "Failed to append alert to alert log");
                warnings.push(format!("alert log append failed: {e}"));
            }
        }

        let report = MonitoringReport::new(timestamp, pipeline_stats, data_stats, alerts)
            .with_warnings(warnings);

        self.reports.save(&report).await.map_err(|e| {
            error!(error = %e, "Failed to persist monitoring report");
            CycleError::Report(e)
        })?;

        info!(
            health_status = %report.health_status,
            alert_count = report.alert_count,
            degraded = report.degraded,
            duration_ms = timer.finish(),
            "Monitor cycle completed"
        );
        Ok(report)
    }
}

fn log_alert(alert: &AlertEvent) {
    match alert.severity {
        Severity::Info => info!(alert_type = %alert.alert_type, severity = %alert.severity, "{}", alert.message),
        Severity::Warning => warn!(alert_type = %alert.alert_type, severity = %alert.severity, "{}", alert.message),
        Severity::Error | Severity::Critical => {
            error!(alert_type = %alert.alert_type, severity = %alert.severity, "{}", alert.message);
        }
    }
}
