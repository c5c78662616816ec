//! Monitoring reports and where they are persisted.

use super::engine::AlertEvent;
use super::stats::{DataStats, PipelineStats};
use crate::errors::PersistenceError;
use crate::utils::{file_stamp, Timestamp};
use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Overall health derived from a cycle's alerts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// No ERROR or CRITICAL alerts.
    Healthy,
    /// At least one ERROR or CRITICAL alert.
    Unhealthy,
}

impl HealthStatus {
    /// Derives health from a set of alert events.
    #[must_use]
    pub fn from_alerts(alerts: &[AlertEvent]) -> Self {
        if alerts.iter().any(|a| a.severity.is_unhealthy()) {
            Self::Unhealthy
        } else {
            Self::Healthy
        }
    }
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Healthy => write!(f, "healthy"),
            Self::Unhealthy => write!(f, "unhealthy"),
        }
    }
}

/// A snapshot of pipeline and data health for one monitor cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitoringReport {
    /// When the cycle ran.
    pub timestamp: Timestamp,
    /// Aggregated run statistics.
    pub pipeline_stats: PipelineStats,
    /// Data-volume totals (empty if unavailable).
    pub data_stats: DataStats,
    /// Alerts raised this cycle.
    pub alerts: Vec<AlertEvent>,
    /// `alerts.len()`.
    pub alert_count: usize,
    /// Derived health.
    pub health_status: HealthStatus,
    /// True if a collaborator was unavailable and statistics are partial.
    #[serde(default)]
    pub degraded: bool,
    /// What degraded the cycle.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

impl MonitoringReport {
    /// Assembles a report, deriving the alert count and health.
    #[must_use]
    pub fn new(
        timestamp: Timestamp,
        pipeline_stats: PipelineStats,
        data_stats: DataStats,
        alerts: Vec<AlertEvent>,
    ) -> Self {
        Self {
            timestamp,
            pipeline_stats,
            data_stats,
            alert_count: alerts.len(),
            health_status: HealthStatus::from_alerts(&alerts),
            alerts,
            degraded: false,
            warnings: Vec::new(),
        }
    }

    /// Marks the report as degraded with the given warnings.
    #[must_use]
    pub fn with_warnings(mut self, warnings: Vec<String>) -> Self {
        self.degraded = !warnings.is_empty();
        self.warnings = warnings;
        self
    }

    /// Returns true if the report is healthy.
    #[must_use]
    pub fn is_healthy(&self) -> bool {
        self.health_status == HealthStatus::Healthy
    }
}

/// Persists monitoring reports.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ReportStore: Send + Sync + std::fmt::Debug {
    /// Persists a report.
    async fn save(&self, report: &MonitoringReport) -> Result<(), PersistenceError>;

    /// Returns the most recently saved report, if any.
    async fn latest(&self) -> Result<Option<MonitoringReport>, PersistenceError>;
}

/// File name of the latest report.
pub const LATEST_REPORT_FILE: &str = "monitoring_report.json";

/// Writes each report to a timestamped archive file and replaces the latest
/// report atomically.
#[derive(Debug, Clone)]
pub struct FileReportStore {
    dir: PathBuf,
}

impl FileReportStore {
    /// Creates a store writing into `dir`.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Returns the report directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Returns the path of the latest report.
    #[must_use]
    pub fn latest_path(&self) -> PathBuf {
        self.dir.join(LATEST_REPORT_FILE)
    }

    fn archive_path(&self, report: &MonitoringReport) -> PathBuf {
        self.dir.join(format!(
            "monitoring_report_{}.json",
            file_stamp(&report.timestamp)
        ))
    }

    fn temp_path(&self, report: &MonitoringReport) -> PathBuf {
        self.dir.join(format!(
            ".{LATEST_REPORT_FILE}.{}.{}.tmp",
            std::process::id(),
            file_stamp(&report.timestamp)
        ))
    }
}

#[async_trait]
impl ReportStore for FileReportStore {
    async fn save(&self, report: &MonitoringReport) -> Result<(), PersistenceError> {
        let json = serde_json::to_string_pretty(report)?;
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| PersistenceError::io(&self.dir, e))?;

        let archive = self.archive_path(report);
        tokio::fs::write(&archive, &json)
            .await
            .map_err(|e| PersistenceError::io(&archive, e))?;

        let latest = self.latest_path();
        let tmp = self.temp_path(report);
        tokio::fs::write(&tmp, &json)
            .await
            .map_err(|e| PersistenceError::io(&tmp, e))?;
        tokio::fs::rename(&tmp, &latest)
            .await
            .map_err(|e| PersistenceError::io(&latest, e))
    }

    async fn latest(&self) -> Result<Option<MonitoringReport>, PersistenceError> {
        let path = self.latest_path();
        match tokio::fs::read_to_string(&path).await {
            Ok(contents) => Ok(Some(serde_json::from_str(&contents)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(PersistenceError::io(&path, e)),
        }
    }
}

/// In-memory report store.
#[derive(Debug, Default)]
pub struct InMemoryReportStore {
    reports: RwLock<Vec<MonitoringReport>>,
}

impl InMemoryReportStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns every saved report, oldest first.
    #[must_use]
    pub fn reports(&self) -> Vec<MonitoringReport> {
        self.reports.read().clone()
    }
}

#[async_trait]
impl ReportStore for InMemoryReportStore {
    async fn save(&self, report: &MonitoringReport) -> Result<(), PersistenceError> {
        self.reports.write().push(report.clone());
        Ok(())
    }

    async fn latest(&self) -> Result<Option<MonitoringReport>, PersistenceError> {
        Ok(self.reports.read().last().cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitor::rules::Severity;
    use crate::monitor::template::AlertContext;
    use crate::utils::now_utc;
    use chrono::Duration;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn alert(severity: Severity) -> AlertEvent {
        AlertEvent {
            alert_type: "stale_data".into(),
            severity,
            message: "stale".into(),
            timestamp: now_utc(),
            data: AlertContext::new(),
        }
    }

    fn report(alerts: Vec<AlertEvent>) -> MonitoringReport {
        MonitoringReport::new(
            now_utc(),
            PipelineStats::empty("etl_pipeline"),
            DataStats::default(),
            alerts,
        )
    }

    #[test]
    fn test_health_from_severity() {
        assert_eq!(report(vec![]).health_status, HealthStatus::Healthy);
        assert_eq!(
            report(vec![alert(Severity::Warning), alert(Severity::Info)]).health_status,
            HealthStatus::Healthy
        );
        assert_eq!(
            report(vec![alert(Severity::Warning), alert(Severity::Error)]).health_status,
            HealthStatus::Unhealthy
        );
        assert_eq!(
            report(vec![alert(Severity::Critical)]).health_status,
            HealthStatus::Unhealthy
        );
    }

    #[test]
    fn test_report_json_shape() {
        let r = report(vec![alert(Severity::Error)]);
        let json = serde_json::to_value(&r).unwrap();

        assert_eq!(json["health_status"], "unhealthy");
        assert_eq!(json["alert_count"], 1);
        assert_eq!(json["alerts"][0]["alert_type"], "stale_data");
        assert_eq!(json["alerts"][0]["severity"], "error");
        assert_eq!(json["data_stats"], serde_json::json!({}));
        assert!(json.get("warnings").is_none());
    }

    #[test]
    fn test_with_warnings_marks_degraded() {
        let r = report(vec![]).with_warnings(vec!["data volume unavailable".into()]);
        assert!(r.degraded);
        assert!(r.is_healthy());
    }

    #[tokio::test]
    async fn test_file_store_writes_archive_and_latest() {
        let dir = TempDir::new().unwrap();
        let store = FileReportStore::new(dir.path().join("results"));

        let first = report(vec![]);
        let mut second = report(vec![alert(Severity::Critical)]);
        second.timestamp = first.timestamp + Duration::seconds(1);

        store.save(&first).await.unwrap();
        store.save(&second).await.unwrap();

        let latest = store.latest().await.unwrap().unwrap();
        assert_eq!(latest.health_status, HealthStatus::Unhealthy);

        let mut names = Vec::new();
        let mut entries = tokio::fs::read_dir(store.dir()).await.unwrap();
        while let Some(entry) = entries.next_entry().await.unwrap() {
            names.push(entry.file_name().to_string_lossy().to_string());
        }
        names.sort();
        assert_eq!(names.len(), 3);
        assert!(names.contains(&LATEST_REPORT_FILE.to_string()));
        assert_eq!(
            names
                .iter()
                .filter(|n| n.starts_with("monitoring_report_"))
                .count(),
            2
        );
    }

    #[tokio::test]
    async fn test_empty_store_has_no_latest() {
        let dir = TempDir::new().unwrap();
        let store = FileReportStore::new(dir.path());
        assert!(store.latest().await.unwrap().is_none());
        assert!(InMemoryReportStore::new().latest().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_concurrent_saves_use_separate_temp_files() {
        let dir = TempDir::new().unwrap();
        let watch = FileReportStore::new(dir.path());
        let once = FileReportStore::new(dir.path());

        let first = report(vec![]);
        let mut second = report(vec![alert(Severity::Warning)]);
        second.timestamp = first.timestamp + Duration::milliseconds(5);
        assert_ne!(watch.temp_path(&first), once.temp_path(&second));

        let (a, b) = tokio::join!(watch.save(&first), once.save(&second));
        a.unwrap();
        b.unwrap();

        let mut entries = tokio::fs::read_dir(dir.path()).await.unwrap();
        while let Some(entry) = entries.next_entry().await.unwrap() {
            let name = entry.file_name().to_string_lossy().to_string();
            assert!(!name.ends_with(".tmp"), "leftover temp file {name}");
        }
        assert!(watch.latest().await.unwrap().is_some());
    }
}
