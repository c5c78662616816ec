//! Stage specifications.

use super::RetryPolicy;
use crate::core::StageKind;
use crate::errors::{ContractErrorInfo, PipelineValidationError};
use crate::stages::Stage;
use std::sync::Arc;
use std::time::Duration;

/// Default maximum execution time for a stage attempt.
pub const DEFAULT_STAGE_TIMEOUT: Duration = Duration::from_secs(300);

/// Specification for a single stage in a pipeline.
///
/// Immutable once registered into a [`super::PipelineDefinition`].
#[derive(Debug, Clone)]
pub struct StageSpec {
    /// The unique name of the stage.
    pub name: String,
    /// The stage implementation.
    pub runner: Arc<dyn Stage>,
    /// Names of stages this stage depends on, in declaration order.
    pub dependencies: Vec<String>,
    /// The kind of stage.
    pub kind: StageKind,
    /// Maximum execution time of one attempt.
    pub timeout: Duration,
    /// Retry policy.
    pub retry: RetryPolicy,
}

impl StageSpec {
    /// Creates a new stage specification.
    #[must_use]
    pub fn new(name: impl Into<String>, runner: Arc<dyn Stage>) -> Self {
        Self {
            name: name.into(),
            runner,
            dependencies: Vec::new(),
            kind: StageKind::Work,
            timeout: DEFAULT_STAGE_TIMEOUT,
            retry: RetryPolicy::default(),
        }
    }

    /// Sets the dependencies.
    #[must_use]
    pub fn with_dependencies(mut self, deps: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.dependencies = Vec::new();
        for dep in deps {
            self = self.with_dependency(dep);
        }
        self
    }

    /// Adds a dependency. Repeated names are ignored.
    #[must_use]
    pub fn with_dependency(mut self, dep: impl Into<String>) -> Self {
        let dep = dep.into();
        if !self.dependencies.contains(&dep) {
            self.dependencies.push(dep);
        }
        self
    }

    /// Sets the stage kind.
    #[must_use]
    pub fn with_kind(mut self, kind: StageKind) -> Self {
        self.kind = kind;
        self
    }

    /// Sets the per-attempt time limit.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the retry policy.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Returns true if this stage has no dependencies.
    #[must_use]
    pub fn is_root(&self) -> bool {
        self.dependencies.is_empty()
    }

    /// Validates the stage specification in isolation.
    ///
    /// # Errors
    ///
    /// Returns an error if the name is blank, the stage depends on itself,
    /// or the time limit is zero.
    pub fn validate(&self) -> Result<(), PipelineValidationError> {
        if self.name.trim().is_empty() {
            return Err(PipelineValidationError::new("Stage name cannot be empty")
                .with_error_info(ContractErrorInfo::new(
                    "CONFIG-PIPELINE-EMPTY",
                    "Stage name is empty or whitespace-only",
                )));
        }

        if self.dependencies.contains(&self.name) {
            return Err(PipelineValidationError::new(format!(
                "Stage '{}' cannot depend on itself",
                self.name
            ))
            .with_stages(vec![self.name.clone()])
            .with_error_info(
                ContractErrorInfo::new(
                    "CONFIG-PIPELINE-SELF_DEP",
                    format!("Stage '{}' lists itself as a dependency", self.name),
                )
                .with_fix_hint("Remove the stage from its own dependency list."),
            ));
        }

        if self.timeout.is_zero() {
            return Err(PipelineValidationError::new(format!(
                "Stage '{}' has a zero time limit",
                self.name
            ))
            .with_stages(vec![self.name.clone()]));
        }

        Ok(())
    }
}
