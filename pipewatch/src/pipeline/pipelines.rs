//! Reference ETL pipelines built from the collaborator-backed stages.

use super::{PipelineBuilder, PipelineDefinition, RetryPolicy, StageSpec};
use crate::collaborators::{
    AcquisitionClient, CheckOutcome, EnrichmentCollaborator, LoadCollaborator, LoadReport,
    TransformCollaborator, TransformSummary,
};
use crate::core::{Artifact, StageKind};
use crate::errors::PipewatchError;
use crate::stages::{
    AcquireStage, EnrichStage, LoadStage, TransformStage, DATA_WAREHOUSE, RAW_DATABASE,
};
use std::sync::Arc;
use std::time::Duration;

/// Name of the full acquire → load → transform → enrich pipeline.
pub const ETL_PIPELINE: &str = "etl_pipeline";
/// Name of the acquire → load pipeline.
pub const ACQUIRE_AND_LOAD_PIPELINE: &str = "acquire_and_load_pipeline";
/// Name of the transform-only pipeline.
pub const TRANSFORM_PIPELINE: &str = "transform_pipeline";
/// Name of the enrich-only pipeline.
pub const ENRICH_PIPELINE: &str = "enrich_pipeline";

/// Records requested per source by default.
pub const DEFAULT_SOURCE_LIMIT: usize = 500;
/// Record count assumed by transform-only runs.
pub const DEFAULT_SEED_RECORDS: u64 = 1000;

const TRANSFORM_TIMEOUT: Duration = Duration::from_secs(300);

/// The collaborators the ETL stages drive.
#[derive(Debug, Clone)]
pub struct EtlCollaborators {
    /// Acquisition client.
    pub acquisition: Arc<dyn AcquisitionClient>,
    /// Sources to acquire from.
    pub sources: Vec<String>,
    /// Records requested per source.
    pub limit: usize,
    /// Relational loader.
    pub loader: Arc<dyn LoadCollaborator>,
    /// Warehouse transformer.
    pub transformer: Arc<dyn TransformCollaborator>,
    /// Enrichment collaborator.
    pub enricher: Arc<dyn EnrichmentCollaborator>,
}

impl EtlCollaborators {
    /// Bundles the collaborators with the default per-source limit.
    #[must_use]
    pub fn new(
        acquisition: Arc<dyn AcquisitionClient>,
        sources: Vec<String>,
        loader: Arc<dyn LoadCollaborator>,
        transformer: Arc<dyn TransformCollaborator>,
        enricher: Arc<dyn EnrichmentCollaborator>,
    ) -> Self {
        Self {
            acquisition,
            sources,
            limit: DEFAULT_SOURCE_LIMIT,
            loader,
            transformer,
            enricher,
        }
    }

    /// Sets the records requested per source.
    #[must_use]
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    fn acquire(&self) -> StageSpec {
        StageSpec::new(
            "acquire",
            Arc::new(AcquireStage::new(
                "acquire",
                Arc::clone(&self.acquisition),
                self.sources.clone(),
                self.limit,
            )),
        )
        .with_kind(StageKind::Acquire)
        .with_retry(RetryPolicy::default().with_retry_count(2))
    }

    fn load(&self) -> StageSpec {
        StageSpec::new("load", Arc::new(LoadStage::new("load", Arc::clone(&self.loader))))
            .with_kind(StageKind::Load)
    }

    fn transform(&self) -> StageSpec {
        StageSpec::new(
            "transform",
            Arc::new(TransformStage::new("transform", Arc::clone(&self.transformer))),
        )
        .with_kind(StageKind::Transform)
        .with_timeout(TRANSFORM_TIMEOUT)
    }

    fn enrich(&self) -> StageSpec {
        StageSpec::new(
            "enrich",
            Arc::new(EnrichStage::new("enrich", Arc::clone(&self.enricher))),
        )
        .with_kind(StageKind::Enrich)
    }
}

/// Builds the full ETL pipeline: acquire → load → transform → enrich.
///
/// # Errors
///
/// Never fails for the fixed graph; validation errors are propagated.
pub fn etl_pipeline(collaborators: &EtlCollaborators) -> Result<PipelineDefinition, PipewatchError> {
    PipelineBuilder::new(ETL_PIPELINE)
        .stage(collaborators.acquire())
        .stage(collaborators.load().with_dependency("acquire"))
        .stage(collaborators.transform().with_dependency("load"))
        .stage(collaborators.enrich().with_dependency("transform"))
        .build()
}

/// Builds the acquire → load pipeline.
pub fn acquire_and_load_pipeline(
    collaborators: &EtlCollaborators,
) -> Result<PipelineDefinition, PipewatchError> {
    PipelineBuilder::new(ACQUIRE_AND_LOAD_PIPELINE)
        .stage(collaborators.acquire())
        .stage(collaborators.load().with_dependency("acquire"))
        .build()
}

/// Builds the transform-only pipeline. Run it with [`transform_seed`].
pub fn transform_pipeline(
    collaborators: &EtlCollaborators,
) -> Result<PipelineDefinition, PipewatchError> {
    PipelineBuilder::new(TRANSFORM_PIPELINE)
        .stage(collaborators.transform())
        .build()
}

/// Builds the enrich-only pipeline. Run it with [`enrich_seed`].
pub fn enrich_pipeline(
    collaborators: &EtlCollaborators,
) -> Result<PipelineDefinition, PipewatchError> {
    PipelineBuilder::new(ENRICH_PIPELINE)
        .stage(collaborators.enrich())
        .build()
}

/// Initial input for [`transform_pipeline`]: a load report of `records`.
pub fn transform_seed(records: u64) -> Result<Artifact, serde_json::Error> {
    Artifact::from_typed(RAW_DATABASE, &LoadReport::with_records(records))
}

/// Initial input for [`enrich_pipeline`]: a transform summary whose checks
/// all passed.
pub fn enrich_seed() -> Result<Artifact, serde_json::Error> {
    let summary = TransformSummary {
        checks: vec![CheckOutcome::passed("run"), CheckOutcome::passed("test")],
    };
    Artifact::from_typed(DATA_WAREHOUSE, &summary)
}
