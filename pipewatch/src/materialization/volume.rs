//! Data-volume statistics derived from the materialization log.

use super::{MaterializationLog, MaterializationRecord};
use crate::collaborators::DataVolumeSource;
use crate::errors::{CollaboratorError, PersistenceError};
use crate::monitor::DataStats;
use crate::stages::{IMAGE_ENRICHMENT, RAW_DATABASE};
use crate::utils::{parse_iso8601, Timestamp};
use async_trait::async_trait;
use std::sync::Arc;

/// Read-only data-volume source backed by a materialization log.
///
/// Totals come from the metadata the load and enrich stages record:
/// `records_loaded` is summed over every load, channel and category counts
/// are taken from the latest materialization, and the covered time span runs
/// from the earliest `date_range.start` to the latest `date_range.end` across
/// loads.
#[derive(Debug, Clone)]
pub struct MaterializationVolumeSource {
    log: Arc<dyn MaterializationLog>,
}

impl MaterializationVolumeSource {
    /// Creates a volume source over `log`.
    #[must_use]
    pub fn new(log: Arc<dyn MaterializationLog>) -> Self {
        Self { log }
    }
}

#[async_trait]
impl DataVolumeSource for MaterializationVolumeSource {
    async fn current_totals(&self) -> Result<DataStats, CollaboratorError> {
        let unavailable =
            |e: PersistenceError| CollaboratorError::Unavailable(format!("materialization log: {e}"));
        let loads = self
            .log
            .records_for_asset(RAW_DATABASE)
            .await
            .map_err(unavailable)?;
        let enrichments = self
            .log
            .records_for_asset(IMAGE_ENRICHMENT)
            .await
            .map_err(unavailable)?;

        let mut stats = DataStats {
            total_messages: Some(
                loads
                    .iter()
                    .filter_map(|r| r.metadata_u64("records_loaded"))
                    .sum(),
            ),
            unique_channels: loads.iter().rev().find_map(|r| r.metadata_u64("unique_channels")),
            earliest_message: loads.iter().filter_map(|r| date_bound(r, "start")).min(),
            latest_message: loads.iter().filter_map(|r| date_bound(r, "end")).max(),
            ..DataStats::default()
        };

        if !enrichments.is_empty() {
            stats.total_images = Some(
                enrichments
                    .iter()
                    .filter_map(|r| r.metadata_u64("images_processed"))
                    .sum(),
            );
            stats.unique_categories = enrichments
                .iter()
                .rev()
                .find_map(|r| r.metadata_u64("categories_detected"));
        }

        Ok(stats.with_time_span())
    }
}

fn date_bound(record: &MaterializationRecord, bound: &str) -> Option<Timestamp> {
    record
        .metadata
        .get("date_range")?
        .get(bound)?
        .as_str()
        .and_then(parse_iso8601)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Artifact, StageOutput};
    use crate::materialization::InMemoryMaterializationLog;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    async fn append(log: &InMemoryMaterializationLog, asset: &str, metadata: serde_json::Value) {
        let mut output = StageOutput::new(Artifact::new(asset, json!({})));
        if let serde_json::Value::Object(map) = metadata {
            for (k, v) in map {
                output = output.with_metadata(k, v);
            }
        }
        log.append(&MaterializationRecord::from_output("r", "etl_pipeline", "s", &output))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_totals_from_log() {
        let log = Arc::new(InMemoryMaterializationLog::new());
        append(&log, RAW_DATABASE, json!({"records_loaded": 40, "unique_channels": 2})).await;
        append(&log, RAW_DATABASE, json!({"records_loaded": 10, "unique_channels": 3})).await;
        append(&log, IMAGE_ENRICHMENT, json!({"images_processed": 7, "categories_detected": 4})).await;

        let stats = MaterializationVolumeSource::new(log).current_totals().await.unwrap();

        assert_eq!(stats.total_messages, Some(50));
        assert_eq!(stats.unique_channels, Some(3));
        assert_eq!(stats.total_images, Some(7));
        assert_eq!(stats.unique_categories, Some(4));
        assert!(stats.time_span_hours.is_none());
    }

    #[tokio::test]
    async fn test_time_span_covers_loaded_record_dates() {
        let log = Arc::new(InMemoryMaterializationLog::new());
        append(
            &log,
            RAW_DATABASE,
            json!({
                "records_loaded": 40,
                "date_range": {
                    "start": "2024-01-10T00:00:00.000000+00:00",
                    "end": "2024-03-01T00:00:00.000000+00:00",
                },
            }),
        )
        .await;
        append(
            &log,
            RAW_DATABASE,
            json!({
                "records_loaded": 10,
                "date_range": {
                    "start": "2024-01-01T00:00:00.000000+00:00",
                    "end": "2024-02-01T00:00:00.000000+00:00",
                },
            }),
        )
        .await;
        append(&log, RAW_DATABASE, json!({"records_loaded": 5, "date_range": null})).await;

        let stats = MaterializationVolumeSource::new(log).current_totals().await.unwrap();

        assert_eq!(stats.total_messages, Some(55));
        assert_eq!(stats.earliest_message, parse_iso8601("2024-01-01T00:00:00+00:00"));
        assert_eq!(stats.latest_message, parse_iso8601("2024-03-01T00:00:00+00:00"));
        assert_eq!(stats.time_span_hours, Some(1440.0));
    }

    #[tokio::test]
    async fn test_empty_log_reports_zero_records() {
        let log = Arc::new(InMemoryMaterializationLog::new());
        let stats = MaterializationVolumeSource::new(log).current_totals().await.unwrap();

        assert_eq!(stats.total_messages, Some(0));
        assert!(stats.total_images.is_none());
        assert!(stats.time_span_hours.is_none());
    }
}
