//! ETL stages wrapping the external collaborators.
//!
//! Each stage decodes its upstream artifact, drives one collaborator and
//! publishes a typed artifact plus the metadata recorded as its
//! materialization.

use super::Stage;
use crate::acquisition::AcquisitionPool;
use crate::collaborators::{
    AcquisitionClient, EnrichmentCollaborator, EnrichmentOutcome, LoadCollaborator, LoadReport,
    RawDataHandle, SourceStatus, TransformCollaborator, TransformSummary,
};
use crate::context::StageContext;
use crate::core::StageOutput;
use crate::errors::StageError;
use crate::utils::format_iso8601;
use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;
use tracing::{info, warn};

/// Asset produced by the acquire stage.
pub const RAW_MESSAGES: &str = "raw_messages";
/// Asset produced by the load stage.
pub const RAW_DATABASE: &str = "raw_database";
/// Asset produced by the transform stage.
pub const DATA_WAREHOUSE: &str = "data_warehouse";
/// Asset produced by the enrich stage.
pub const IMAGE_ENRICHMENT: &str = "image_enrichment";

/// Acquires raw data from the configured sources through the worker pool.
#[derive(Debug, Clone)]
pub struct AcquireStage {
    name: String,
    client: Arc<dyn AcquisitionClient>,
    pool: AcquisitionPool,
    sources: Vec<String>,
    limit: usize,
}

impl AcquireStage {
    /// Creates an acquire stage with the default pool.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        client: Arc<dyn AcquisitionClient>,
        sources: Vec<String>,
        limit: usize,
    ) -> Self {
        Self {
            name: name.into(),
            client,
            pool: AcquisitionPool::default(),
            sources,
            limit,
        }
    }

    /// Sets the worker pool.
    #[must_use]
    pub fn with_pool(mut self, pool: AcquisitionPool) -> Self {
        self.pool = pool;
        self
    }
}

#[async_trait]
impl Stage for AcquireStage {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, ctx: &StageContext) -> Result<StageOutput, StageError> {
        let handle = self
            .pool
            .run(Arc::clone(&self.client), &self.sources, self.limit)
            .await?;

        let completed: Vec<String> = handle
            .completed_sources()
            .into_iter()
            .map(str::to_string)
            .collect();
        let failed = handle
            .sources
            .iter()
            .filter(|s| s.status == SourceStatus::Failed)
            .count();

        if completed.is_empty() && failed > 0 {
            return Err(StageError::transient(format!(
                "no source completed; {failed} source(s) failed"
            )));
        }
        if failed > 0 {
            warn!(
                run_id = %ctx.run_id(),
                failed,
                completed = completed.len(),
                "Some sources failed during acquisition"
            );
        }

        let records = handle.records_acquired();
        info!(run_id = %ctx.run_id(), records, "Acquisition complete");

        Ok(StageOutput::typed(RAW_MESSAGES, &handle)?
            .with_metadata("data_path", json!(handle.location))
            .with_metadata("sources", json!(completed))
            .with_metadata("records_acquired", json!(records)))
    }
}

/// Loads acquired raw data into the relational store.
#[derive(Debug, Clone)]
pub struct LoadStage {
    name: String,
    loader: Arc<dyn LoadCollaborator>,
}

impl LoadStage {
    /// Creates a load stage.
    #[must_use]
    pub fn new(name: impl Into<String>, loader: Arc<dyn LoadCollaborator>) -> Self {
        Self {
            name: name.into(),
            loader,
        }
    }
}

#[async_trait]
impl Stage for LoadStage {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, ctx: &StageContext) -> Result<StageOutput, StageError> {
        let handle: RawDataHandle = ctx.inputs().decode_single()?;
        let report = self.loader.load(&handle).await?;

        let date_range = match (&report.earliest_record, &report.latest_record) {
            (Some(start), Some(end)) => json!({
                "start": format_iso8601(start),
                "end": format_iso8601(end),
            }),
            _ => serde_json::Value::Null,
        };

        Ok(StageOutput::typed(RAW_DATABASE, &report)?
            .with_metadata("records_loaded", json!(report.records_loaded))
            .with_metadata("unique_channels", json!(report.unique_channels))
            .with_metadata("messages_with_media", json!(report.messages_with_media))
            .with_metadata("date_range", date_range))
    }
}

/// Runs the warehouse transformations and their checks.
#[derive(Debug, Clone)]
pub struct TransformStage {
    name: String,
    transformer: Arc<dyn TransformCollaborator>,
}

impl TransformStage {
    /// Creates a transform stage.
    #[must_use]
    pub fn new(name: impl Into<String>, transformer: Arc<dyn TransformCollaborator>) -> Self {
        Self {
            name: name.into(),
            transformer,
        }
    }
}

#[async_trait]
impl Stage for TransformStage {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, ctx: &StageContext) -> Result<StageOutput, StageError> {
        let report: LoadReport = ctx.inputs().decode_single()?;
        let summary = self.transformer.transform(report.records_loaded).await?;

        if !summary.all_passed() {
            let failed: Vec<String> = summary
                .failed_checks()
                .iter()
                .map(|c| match &c.message {
                    Some(message) => format!("{}: {message}", c.name),
                    None => c.name.clone(),
                })
                .collect();
            return Err(StageError::fatal(format!(
                "transformation checks failed: {}",
                failed.join("; ")
            )));
        }

        Ok(StageOutput::typed(DATA_WAREHOUSE, &summary)?
            .with_metadata("checks_run", json!(summary.checks.len()))
            .with_metadata("checks_passed", json!(summary.passed_count())))
    }
}

/// Runs image enrichment over the warehouse.
#[derive(Debug, Clone)]
pub struct EnrichStage {
    name: String,
    enricher: Arc<dyn EnrichmentCollaborator>,
}

impl EnrichStage {
    /// Creates an enrich stage.
    #[must_use]
    pub fn new(name: impl Into<String>, enricher: Arc<dyn EnrichmentCollaborator>) -> Self {
        Self {
            name: name.into(),
            enricher,
        }
    }
}

#[async_trait]
impl Stage for EnrichStage {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, ctx: &StageContext) -> Result<StageOutput, StageError> {
        let summary: TransformSummary = ctx.inputs().decode_single()?;
        let outcome = self.enricher.enrich(&summary).await?;

        let output = StageOutput::typed(IMAGE_ENRICHMENT, &outcome)?;
        Ok(match outcome {
            EnrichmentOutcome::Skipped { reason } => {
                info!(run_id = %ctx.run_id(), %reason, "Enrichment skipped");
                output
                    .with_metadata("status", json!("skipped"))
                    .with_metadata("reason", json!(reason))
            }
            EnrichmentOutcome::Completed {
                items_processed,
                categories_detected,
                items_loaded,
                ..
            } => output
                .with_metadata("images_processed", json!(items_processed))
                .with_metadata("categories_detected", json!(categories_detected))
                .with_metadata("items_loaded", json!(items_loaded)),
        })
    }
}
