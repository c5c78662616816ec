//! Pipeline building and execution.
//!
//! This module provides:
//! - Stage specifications with per-stage timeout and retry policy
//! - A validating builder producing topologically ordered definitions
//! - The run executor that records runs and materializations
//! - The reference ETL pipelines

mod builder;
mod definition;
mod executor;
mod pipelines;
mod retry;
mod spec;

#[cfg(test)]
mod integration_tests;

pub use builder::PipelineBuilder;
pub use definition::PipelineDefinition;
pub use executor::RunExecutor;
pub use pipelines::{
    acquire_and_load_pipeline, enrich_pipeline, enrich_seed, etl_pipeline, transform_pipeline,
    transform_seed, EtlCollaborators, ACQUIRE_AND_LOAD_PIPELINE, DEFAULT_SEED_RECORDS,
    DEFAULT_SOURCE_LIMIT, ENRICH_PIPELINE, ETL_PIPELINE, TRANSFORM_PIPELINE,
};
pub use retry::{BackoffStrategy, JitterStrategy, RetryPolicy};
pub use spec::{StageSpec, DEFAULT_STAGE_TIMEOUT};
