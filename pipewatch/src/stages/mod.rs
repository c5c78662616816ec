//! Stage trait and implementations.
//!
//! Stages are the fundamental units of work in a pipewatch pipeline. Each
//! stage consumes the artifacts of its upstream stages and produces one
//! artifact plus materialization metadata.

mod etl;

pub use etl::{
    AcquireStage, EnrichStage, LoadStage, TransformStage, DATA_WAREHOUSE, IMAGE_ENRICHMENT,
    RAW_DATABASE, RAW_MESSAGES,
};

use crate::context::StageContext;
use crate::core::{Artifact, StageOutput};
use crate::errors::StageError;
use async_trait::async_trait;
use std::fmt::Debug;

/// Trait for pipeline stages.
///
/// Implementations may suspend on external I/O. The executor enforces the
/// stage's time limit by dropping the returned future, so implementations
/// must not rely on running to completion once started.
#[async_trait]
pub trait Stage: Send + Sync + Debug {
    /// Returns the name of the stage.
    fn name(&self) -> &str;

    /// Executes one attempt of the stage.
    ///
    /// # Arguments
    ///
    /// * `ctx` - The stage execution context
    ///
    /// # Errors
    ///
    /// Returns a [`StageError`]; retryable errors are attempted again up to
    /// the stage's retry count.
    async fn execute(&self, ctx: &StageContext) -> Result<StageOutput, StageError>;
}

/// A simple function-based stage.
pub struct FnStage<F>
where
    F: Fn(&StageContext) -> Result<StageOutput, StageError> + Send + Sync,
{
    name: String,
    func: F,
}

impl<F> FnStage<F>
where
    F: Fn(&StageContext) -> Result<StageOutput, StageError> + Send + Sync,
{
    /// Creates a new function-based stage.
    pub fn new(name: impl Into<String>, func: F) -> Self {
        Self {
            name: name.into(),
            func,
        }
    }
}

impl<F> Debug for FnStage<F>
where
    F: Fn(&StageContext) -> Result<StageOutput, StageError> + Send + Sync,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnStage")
            .field("name", &self.name)
            .finish()
    }
}

#[async_trait]
impl<F> Stage for FnStage<F>
where
    F: Fn(&StageContext) -> Result<StageOutput, StageError> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, ctx: &StageContext) -> Result<StageOutput, StageError> {
        (self.func)(ctx)
    }
}

/// A stage that forwards its input unchanged (or `null` for a root stage).
#[derive(Debug, Clone)]
pub struct NoOpStage {
    name: String,
}

impl NoOpStage {
    /// Creates a new no-op stage.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

#[async_trait]
impl Stage for NoOpStage {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, ctx: &StageContext) -> Result<StageOutput, StageError> {
        let value = ctx
            .inputs()
            .single()
            .map(|artifact| artifact.value.clone())
            .unwrap_or(serde_json::Value::Null);
        Ok(StageOutput::new(Artifact::new(&self.name, value)))
    }
}
