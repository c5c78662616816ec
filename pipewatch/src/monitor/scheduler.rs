//! Periodic execution of monitor cycles.

use super::cycle::MonitorCycle;
use super::report::MonitoringReport;
use crate::errors::CycleError;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

/// Counters describing a scheduler's activity.
#[derive(Debug, Default)]
pub struct SchedulerStats {
    /// Cycles that produced a report.
    pub cycles_completed: AtomicU64,
    /// Cycles that failed.
    pub cycles_failed: AtomicU64,
    /// Triggers dropped because a cycle was already running.
    pub cycles_skipped: AtomicU64,
}

/// A point-in-time copy of [`SchedulerStats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerSnapshot {
    /// Cycles that produced a report.
    pub cycles_completed: u64,
    /// Cycles that failed.
    pub cycles_failed: u64,
    /// Triggers dropped because a cycle was already running.
    pub cycles_skipped: u64,
}

impl SchedulerStats {
    /// Takes a snapshot of the counters.
    #[must_use]
    pub fn snapshot(&self) -> SchedulerSnapshot {
        SchedulerSnapshot {
            cycles_completed: self.cycles_completed.load(Ordering::Relaxed),
            cycles_failed: self.cycles_failed.load(Ordering::Relaxed),
            cycles_skipped: self.cycles_skipped.load(Ordering::Relaxed),
        }
    }
}

/// Runs a [`MonitorCycle`] on a fixed interval.
///
/// At most one cycle runs at a time: a trigger that arrives while a cycle is
/// in progress is dropped and counted, and missed interval ticks are skipped
/// rather than bursted.
#[derive(Debug)]
pub struct MonitorScheduler {
    cycle: Arc<MonitorCycle>,
    period: Duration,
    reload_rules: bool,
    in_flight: Arc<Mutex<()>>,
    stats: Arc<SchedulerStats>,
}

impl MonitorScheduler {
    /// Creates a scheduler running `cycle` every `period`.
    #[must_use]
    pub fn new(cycle: Arc<MonitorCycle>, period: Duration) -> Self {
        Self {
            cycle,
            period,
            reload_rules: false,
            in_flight: Arc::new(Mutex::new(())),
            stats: Arc::new(SchedulerStats::default()),
        }
    }

    /// Reloads alert rules from disk before every cycle.
    #[must_use]
    pub fn with_rule_reload(mut self, reload: bool) -> Self {
        self.reload_rules = reload;
        self
    }

    /// Returns the activity counters.
    #[must_use]
    pub fn stats(&self) -> Arc<SchedulerStats> {
        Arc::clone(&self.stats)
    }

    /// Runs one cycle unless one is already in progress.
    ///
    /// Returns `None` when the trigger was dropped.
    pub async fn trigger(&self) -> Option<Result<MonitoringReport, CycleError>> {
        let Ok(_guard) = Arc::clone(&self.in_flight).try_lock_owned() else {
            self.stats.cycles_skipped.fetch_add(1, Ordering::Relaxed);
            debug!(pipeline = %self.cycle.pipeline(), "Monitor cycle already running; trigger skipped");
            return None;
        };

        if self.reload_rules {
            if let Err(e) = self.cycle.reload_rules().await {
                warn!(error = %e, "Alert rule reload failed; keeping current rules");
            }
        }

        let result = self.cycle.run_cycle().await;
        match &result {
            Ok(_) => {
                self.stats.cycles_completed.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => {
                self.stats.cycles_failed.fetch_add(1, Ordering::Relaxed);
                error!(pipeline = %self.cycle.pipeline(), error = %e, "Monitor cycle failed");
            }
        }
        Some(result)
    }

    /// Runs cycles until `shutdown` completes. The first cycle runs
    /// immediately.
    pub async fn run<F>(&self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        let mut ticker = interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        tokio::pin!(shutdown);

        info!(
            pipeline = %self.cycle.pipeline(),
            period_secs = self.period.as_secs(),
            "Monitor scheduler started"
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.trigger().await;
                }
                () = &mut shutdown => {
                    break;
                }
            }
        }

        let stats = self.stats.snapshot();
        info!(
            pipeline = %self.cycle.pipeline(),
            cycles_completed = stats.cycles_completed,
            cycles_failed = stats.cycles_failed,
            cycles_skipped = stats.cycles_skipped,
            "Monitor scheduler stopped"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::MockDataVolumeSource;
    use crate::errors::PersistenceError;
    use crate::history::InMemoryRunHistory;
    use crate::monitor::alert_log::InMemoryAlertLog;
    use crate::monitor::report::{InMemoryReportStore, MockReportStore};
    use crate::monitor::stats::DataStats;
    use tokio::sync::oneshot;

    fn volume() -> Arc<MockDataVolumeSource> {
        let mut source = MockDataVolumeSource::new();
        source
            .expect_current_totals()
            .returning(|| Ok(DataStats::default()));
        Arc::new(source)
    }

    fn cycle(reports: Arc<dyn crate::monitor::report::ReportStore>) -> Arc<MonitorCycle> {
        Arc::new(MonitorCycle::new(
            "etl_pipeline",
            Arc::new(InMemoryRunHistory::new()),
            volume(),
            Arc::new(InMemoryAlertLog::new()),
            reports,
        ))
    }

    #[tokio::test(start_paused = true)]
    async fn test_runs_on_interval_until_shutdown() {
        let reports = Arc::new(InMemoryReportStore::new());
        let scheduler = MonitorScheduler::new(cycle(reports.clone()), Duration::from_secs(60));
        let (tx, rx) = oneshot::channel::<()>();

        let stopper = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(150)).await;
            let _ = tx.send(());
        });
        scheduler
            .run(async {
                let _ = rx.await;
            })
            .await;
        stopper.await.unwrap();

        // Ticks at 0s, 60s and 120s.
        assert_eq!(reports.reports().len(), 3);
        assert_eq!(scheduler.stats().snapshot().cycles_completed, 3);
    }

    #[tokio::test]
    async fn test_trigger_while_running_is_skipped() {
        let scheduler = MonitorScheduler::new(
            cycle(Arc::new(InMemoryReportStore::new())),
            Duration::from_secs(60),
        );

        let guard = Arc::clone(&scheduler.in_flight).try_lock_owned().unwrap();
        assert!(scheduler.trigger().await.is_none());
        drop(guard);
        assert!(scheduler.trigger().await.is_some());

        let stats = scheduler.stats().snapshot();
        assert_eq!(stats.cycles_skipped, 1);
        assert_eq!(stats.cycles_completed, 1);
    }

    #[tokio::test]
    async fn test_failed_cycle_is_counted() {
        let mut reports = MockReportStore::new();
        reports
            .expect_save()
            .returning(|_| Err(PersistenceError::Unavailable("disk".into())));
        let scheduler = MonitorScheduler::new(cycle(Arc::new(reports)), Duration::from_secs(60));

        let result = scheduler.trigger().await.unwrap();
        assert!(matches!(result, Err(CycleError::Report(_))));
        assert_eq!(scheduler.stats().snapshot().cycles_failed, 1);
    }
}
