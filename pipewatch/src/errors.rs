//! Error types for pipewatch.
//!
//! Errors fall into four families: configuration errors (malformed pipeline
//! graphs, alert rules, templates) that must stop startup, stage execution
//! errors that are retried and then recorded on the run, collaborator errors
//! reported by external systems, and persistence errors raised by the
//! history, materialization, alert and report stores.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// The main error type for pipewatch operations.
#[derive(Debug, Error)]
pub enum PipewatchError {
    /// A pipeline definition failed validation.
    #[error("{0}")]
    Validation(#[from] PipelineValidationError),

    /// The pipeline graph contains a cycle.
    #[error("{0}")]
    CyclicDependency(#[from] CyclicDependencyError),

    /// The alert rule configuration is invalid.
    #[error("{0}")]
    AlertConfig(#[from] AlertConfigError),

    /// The run history store failed.
    #[error("{0}")]
    History(#[from] HistoryError),

    /// A persistence layer (materialization log, alert log, report store) failed.
    #[error("{0}")]
    Persistence(#[from] PersistenceError),

    /// A monitor cycle failed.
    #[error("{0}")]
    Cycle(#[from] CycleError),

    /// Invalid runtime configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl PipewatchError {
    /// Returns true for errors that must prevent startup.
    #[must_use]
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            Self::Validation(_) | Self::CyclicDependency(_) | Self::AlertConfig(_) | Self::Config(_)
        )
    }
}

/// Metadata about a configuration error for better diagnostics.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ContractErrorInfo {
    /// Error code (e.g., "CONFIG-PIPELINE-CYCLE").
    pub code: String,
    /// Short summary of the error.
    pub summary: String,
    /// Hint for fixing the error.
    pub fix_hint: Option<String>,
    /// Additional context key-value pairs.
    #[serde(default)]
    pub context: HashMap<String, String>,
}

impl ContractErrorInfo {
    /// Creates a new contract error info.
    #[must_use]
    pub fn new(code: impl Into<String>, summary: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            summary: summary.into(),
            fix_hint: None,
            context: HashMap::new(),
        }
    }

    /// Sets the fix hint.
    #[must_use]
    pub fn with_fix_hint(mut self, hint: impl Into<String>) -> Self {
        self.fix_hint = Some(hint.into());
        self
    }

    /// Adds a single context entry.
    #[must_use]
    pub fn with_context_entry(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }
}

/// Error raised when a pipeline definition fails validation.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct PipelineValidationError {
    /// The error message.
    pub message: String,
    /// The stages involved in the error.
    pub stages: Vec<String>,
    /// Optional contract error info.
    pub error_info: Option<ContractErrorInfo>,
}

impl PipelineValidationError {
    /// Creates a new pipeline validation error.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            stages: Vec::new(),
            error_info: None,
        }
    }

    /// Sets the stages involved.
    #[must_use]
    pub fn with_stages(mut self, stages: Vec<String>) -> Self {
        self.stages = stages;
        self
    }

    /// Sets the contract error info.
    #[must_use]
    pub fn with_error_info(mut self, info: ContractErrorInfo) -> Self {
        self.error_info = Some(info);
        self
    }

    /// Returns the error code, if any.
    #[must_use]
    pub fn code(&self) -> Option<&str> {
        self.error_info.as_ref().map(|info| info.code.as_str())
    }
}

/// Error raised when no topological order exists for a pipeline definition.
#[derive(Debug, Clone, Error)]
#[error("Cyclic dependency in pipeline '{pipeline}': {}", cycle_path.join(" -> "))]
pub struct CyclicDependencyError {
    /// The pipeline name.
    pub pipeline: String,
    /// The path of stages forming the cycle, first stage repeated at the end.
    pub cycle_path: Vec<String>,
    /// Contract error info.
    pub error_info: ContractErrorInfo,
}

impl CyclicDependencyError {
    /// Creates a new cyclic dependency error.
    #[must_use]
    pub fn new(pipeline: impl Into<String>, cycle_path: Vec<String>) -> Self {
        let info = ContractErrorInfo::new(
            "CONFIG-PIPELINE-CYCLE",
            format!("Pipeline contains a dependency cycle: {}", cycle_path.join(" -> ")),
        )
        .with_fix_hint("Remove one of the dependencies in the cycle to break it.");

        Self {
            pipeline: pipeline.into(),
            cycle_path,
            error_info: info,
        }
    }
}

/// Errors raised while rendering an alert message template.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TemplateError {
    /// The template references a value the context does not provide.
    #[error("template placeholder '{name}' has no value")]
    MissingPlaceholder {
        /// The placeholder name.
        name: String,
    },

    /// A placeholder uses a format spec that is not supported.
    #[error("unsupported format spec '{spec}' for placeholder '{name}'")]
    UnsupportedFormat {
        /// The placeholder name.
        name: String,
        /// The format spec.
        spec: String,
    },

    /// A numeric format spec was applied to a text value.
    #[error("placeholder '{name}' is not numeric but uses format spec '{spec}'")]
    NotNumeric {
        /// The placeholder name.
        name: String,
        /// The format spec.
        spec: String,
    },

    /// A brace was opened but never closed.
    #[error("unbalanced brace at byte {position}")]
    UnbalancedBrace {
        /// Byte offset of the offending brace.
        position: usize,
    },
}

/// Errors raised while loading or validating alert rules.
#[derive(Debug, Error)]
pub enum AlertConfigError {
    /// The rules file could not be read.
    #[error("failed to read alert rules from {}: {source}", path.display())]
    Read {
        /// The rules file path.
        path: PathBuf,
        /// The underlying IO error.
        source: std::io::Error,
    },

    /// The default rules file could not be written.
    #[error("failed to write alert rules to {}: {source}", path.display())]
    Write {
        /// The rules file path.
        path: PathBuf,
        /// The underlying IO error.
        source: std::io::Error,
    },

    /// The rules document is malformed.
    #[error("malformed alert rules: {0}")]
    Malformed(String),

    /// A rule has a threshold that is not a finite number.
    #[error("alert rule '{alert_type}' has a non-finite threshold")]
    InvalidThreshold {
        /// The rule's alert type.
        alert_type: String,
    },

    /// A rule's message template is invalid for its alert type.
    #[error("alert rule '{alert_type}' has an invalid message template: {source}")]
    Template {
        /// The rule's alert type.
        alert_type: String,
        /// The template error.
        source: TemplateError,
    },
}

/// A stage attempt failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct StageError {
    /// Human readable summary.
    pub message: String,
    /// Whether another attempt may succeed.
    pub retryable: bool,
}

impl StageError {
    /// Creates a retryable stage error.
    #[must_use]
    pub fn transient(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            retryable: true,
        }
    }

    /// Creates a stage error that must not be retried.
    #[must_use]
    pub fn fatal(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            retryable: false,
        }
    }
}

/// Errors reported by external collaborators.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CollaboratorError {
    /// A failure that may succeed on retry.
    #[error("transient collaborator failure: {0}")]
    Transient(String),

    /// A failure that will not succeed on retry.
    #[error("fatal collaborator failure: {0}")]
    Fatal(String),

    /// The collaborator asked the caller to wait before retrying.
    #[error("rate limited; retry after {retry_after:?}")]
    RateLimited {
        /// Delay requested by the collaborator.
        retry_after: Duration,
    },

    /// Access to the requested resource was denied.
    #[error("access denied: {0}")]
    AccessDenied(String),

    /// The collaborator could not be reached.
    #[error("collaborator unavailable: {0}")]
    Unavailable(String),
}

impl CollaboratorError {
    /// Returns true if the failure may succeed on retry.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Transient(_) | Self::RateLimited { .. } | Self::Unavailable(_)
        )
    }
}

impl From<CollaboratorError> for StageError {
    fn from(err: CollaboratorError) -> Self {
        Self {
            retryable: err.is_retryable(),
            message: err.to_string(),
        }
    }
}

/// Errors raised by run history stores.
#[derive(Debug, Error)]
pub enum HistoryError {
    /// A write referenced a run that was never started.
    #[error("unknown run: {0}")]
    UnknownRun(String),

    /// The store could not be reached.
    #[error("run history unavailable: {0}")]
    Unavailable(String),

    /// A record could not be (de)serialized.
    #[error("run history serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error.
    #[error("run history IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised by append-only logs and report stores.
#[derive(Debug, Error)]
pub enum PersistenceError {
    /// IO error on a specific path.
    #[error("IO error on {}: {source}", path.display())]
    Io {
        /// The file involved.
        path: PathBuf,
        /// The underlying IO error.
        source: std::io::Error,
    },

    /// A record could not be (de)serialized.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The store could not be reached.
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl PersistenceError {
    /// Wraps an IO error with the path it occurred on.
    #[must_use]
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// A monitor cycle failure, distinct from a pipeline failure.
#[derive(Debug, Error)]
pub enum CycleError {
    /// The monitoring report could not be persisted.
    #[error("monitor cycle failed to persist report: {0}")]
    Report(#[source] PersistenceError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contract_error_info_creation() {
        let info = ContractErrorInfo::new("TEST-001", "Test error")
            .with_fix_hint("Fix this by doing that")
            .with_context_entry("stage", "load");

        assert_eq!(info.code, "TEST-001");
        assert_eq!(info.fix_hint, Some("Fix this by doing that".to_string()));
        assert_eq!(info.context.get("stage"), Some(&"load".to_string()));
    }

    #[test]
    fn test_cyclic_dependency_error() {
        let err = CyclicDependencyError::new(
            "etl",
            vec!["a".to_string(), "b".to_string(), "a".to_string()],
        );

        assert!(err.to_string().contains("a -> b -> a"));
        assert_eq!(err.error_info.code, "CONFIG-PIPELINE-CYCLE");
    }

    #[test]
    fn test_collaborator_error_to_stage_error() {
        let transient: StageError = CollaboratorError::Transient("socket reset".into()).into();
        assert!(transient.retryable);

        let fatal: StageError = CollaboratorError::Fatal("bad schema".into()).into();
        assert!(!fatal.retryable);
        assert!(fatal.message.contains("bad schema"));

        let denied: StageError = CollaboratorError::AccessDenied("private".into()).into();
        assert!(!denied.retryable);
    }

    #[test]
    fn test_configuration_error_classification() {
        let err: PipewatchError = PipelineValidationError::new("empty").into();
        assert!(err.is_configuration_error());

        let err: PipewatchError = HistoryError::Unavailable("down".into()).into();
        assert!(!err.is_configuration_error());
    }
}
