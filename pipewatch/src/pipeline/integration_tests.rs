//! End-to-end tests: ETL runs through the executor, then monitor cycles over
//! the resulting history and materialization log.

use super::{etl_pipeline, EtlCollaborators, RunExecutor, ETL_PIPELINE};
use crate::collaborators::{
    CheckOutcome, EnrichmentOutcome, LoadReport, MockEnrichmentCollaborator, MockLoadCollaborator,
    MockTransformCollaborator, RawDataHandle, TransformSummary,
};
use crate::core::{RunStatus, StageResultStatus};
use crate::events::CollectingEventSink;
use crate::history::{InMemoryRunHistory, JsonlRunHistory, RunHistoryStore};
use crate::materialization::{
    InMemoryMaterializationLog, JsonlMaterializationLog, MaterializationLog,
    MaterializationVolumeSource,
};
use crate::monitor::{
    FileAlertLog, FileReportStore, HealthStatus, InMemoryAlertLog, InMemoryReportStore,
    MonitorCycle, ReportStore, Severity,
};
use crate::stages::{DATA_WAREHOUSE, IMAGE_ENRICHMENT, RAW_DATABASE, RAW_MESSAGES};
use crate::testing::{FakeAcquisitionClient, ScriptedFetch};
use pretty_assertions::assert_eq;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

const SOURCES: [&str; 3] = ["chemed", "lobelia4cosmetics", "tikvahpharma"];

fn loader(records: u64) -> MockLoadCollaborator {
    let mut loader = MockLoadCollaborator::new();
    loader
        .expect_load()
        .returning(move |handle: &RawDataHandle| {
            Ok(LoadReport {
                records_loaded: records,
                unique_channels: handle.completed_sources().len() as u64,
                ..LoadReport::default()
            })
        });
    loader
}

fn transformer(passing: bool) -> MockTransformCollaborator {
    let mut transformer = MockTransformCollaborator::new();
    transformer.expect_transform().returning(move |_| {
        let test = if passing {
            CheckOutcome::passed("test")
        } else {
            CheckOutcome::failed("test", "1 of 12 tests failed")
        };
        Ok(TransformSummary {
            checks: vec![CheckOutcome::passed("run"), test],
        })
    });
    transformer
}

fn enricher() -> MockEnrichmentCollaborator {
    let mut enricher = MockEnrichmentCollaborator::new();
    enricher.expect_enrich().returning(|_| {
        Ok(EnrichmentOutcome::Completed {
            items_processed: 40,
            items_categorized: 38,
            items_loaded: 38,
            categories_detected: 4,
        })
    });
    enricher
}

fn collaborators(client: FakeAcquisitionClient, passing: bool) -> EtlCollaborators {
    EtlCollaborators::new(
        Arc::new(client),
        SOURCES.iter().map(ToString::to_string).collect(),
        Arc::new(loader(1200)),
        Arc::new(transformer(passing)),
        Arc::new(enricher()),
    )
    .with_limit(400)
}

#[tokio::test]
async fn test_etl_runs_then_monitor_cycles_on_disk() {
    let dir = TempDir::new().unwrap();
    let history: Arc<dyn RunHistoryStore> =
        Arc::new(JsonlRunHistory::open(dir.path().join("runs.jsonl")).await.unwrap());
    let materializations: Arc<dyn MaterializationLog> = Arc::new(
        JsonlMaterializationLog::open(dir.path().join("materializations.jsonl"))
            .await
            .unwrap(),
    );
    let events = Arc::new(CollectingEventSink::new());
    let executor = RunExecutor::new(Arc::clone(&history), Arc::clone(&materializations))
        .with_event_sink(events.clone());

    let alert_log = Arc::new(FileAlertLog::new(dir.path().join("logs/alerts.log")));
    let reports = Arc::new(FileReportStore::new(dir.path().join("results")));
    let cycle = MonitorCycle::new(
        ETL_PIPELINE,
        Arc::clone(&history),
        Arc::new(MaterializationVolumeSource::new(Arc::clone(&materializations))),
        alert_log.clone(),
        reports.clone(),
    );

    // A clean run: every stage materializes, nothing alerts.
    let client = FakeAcquisitionClient::new();
    let first = executor
        .execute(&etl_pipeline(&collaborators(client, true)).unwrap(), None)
        .await
        .unwrap();
    assert_eq!(first.status, RunStatus::Succeeded);

    let assets: Vec<String> = materializations
        .records_for_run(&first.id)
        .await
        .unwrap()
        .into_iter()
        .map(|r| r.asset)
        .collect();
    assert_eq!(
        assets,
        vec![RAW_MESSAGES, RAW_DATABASE, DATA_WAREHOUSE, IMAGE_ENRICHMENT]
    );

    let report = cycle.run_cycle().await.unwrap();
    assert_eq!(report.health_status, HealthStatus::Healthy);
    assert_eq!(report.alert_count, 0);
    assert_eq!(report.pipeline_stats.total_runs, 1);
    assert_eq!(report.data_stats.total_messages, Some(1200));
    assert_eq!(report.data_stats.unique_channels, Some(3));
    assert_eq!(report.data_stats.unique_categories, Some(4));

    // A failing transform check fails the run and skips enrichment.
    let second = executor
        .execute(
            &etl_pipeline(&collaborators(FakeAcquisitionClient::new(), false)).unwrap(),
            None,
        )
        .await
        .unwrap();
    assert_eq!(second.status, RunStatus::Failed);
    let transform = second.result_for("transform").unwrap();
    assert_eq!(transform.status, StageResultStatus::Failed);
    assert_eq!(transform.attempts, 1);
    assert_eq!(
        second.result_for("enrich").unwrap().status,
        StageResultStatus::Skipped
    );
    assert_eq!(events.events_of_type("stage.skipped").len(), 1);

    let report = cycle.run_cycle().await.unwrap();
    let mut types: Vec<_> = report.alerts.iter().map(|a| a.alert_type.clone()).collect();
    types.sort();
    assert_eq!(types, vec!["high_failure_rate", "pipeline_failure"]);
    assert_eq!(report.health_status, HealthStatus::Unhealthy);
    assert_eq!(report.pipeline_stats.failed_runs, 1);
    assert_eq!(report.data_stats.total_messages, Some(2400));

    let logged = alert_log.read_all().await.unwrap();
    assert_eq!(logged.len(), 2);
    assert!(logged.iter().any(|a| a.severity == Severity::Critical));

    let latest = reports.latest().await.unwrap().unwrap();
    assert_eq!(latest.timestamp, report.timestamp);

    // The history survives a reopen.
    let reopened = JsonlRunHistory::open(dir.path().join("runs.jsonl")).await.unwrap();
    let recent = reopened.query_recent_runs(ETL_PIPELINE, 10).await.unwrap();
    assert_eq!(recent.len(), 2);
    assert_eq!(recent[0].id, second.id);
}

#[tokio::test(start_paused = true)]
async fn test_rate_limited_source_still_completes_run() {
    let history = Arc::new(InMemoryRunHistory::new());
    let materializations = Arc::new(InMemoryMaterializationLog::new());
    let executor = RunExecutor::new(history.clone(), materializations.clone());

    let client = FakeAcquisitionClient::new().script(
        "chemed",
        vec![ScriptedFetch::RateLimited(Duration::from_secs(30))],
    );
    let run = executor
        .execute(&etl_pipeline(&collaborators(client, true)).unwrap(), None)
        .await
        .unwrap();

    assert_eq!(run.status, RunStatus::Succeeded);
    let acquired = materializations.records_for_asset(RAW_MESSAGES).await.unwrap();
    assert_eq!(acquired[0].metadata_u64("records_acquired"), Some(1200));

    let reports = Arc::new(InMemoryReportStore::new());
    let cycle = MonitorCycle::new(
        ETL_PIPELINE,
        history,
        Arc::new(MaterializationVolumeSource::new(materializations)),
        Arc::new(InMemoryAlertLog::new()),
        reports.clone(),
    );
    let report = cycle.run_cycle().await.unwrap();
    assert!(report.is_healthy());
    assert_eq!(reports.reports().len(), 1);
}
