//! # Pipewatch
//!
//! Dependency-ordered ETL pipeline orchestration with run-history monitoring
//! and alerting.
//!
//! Pipewatch provides:
//!
//! - **Stage-based execution**: stages with declared dependencies run in
//!   topological order, with per-stage retry and time limits
//! - **Run history**: every run and stage transition is recorded as it
//!   happens, so in-flight runs are observable
//! - **Materializations**: each successful stage records the asset it produced
//! - **Monitoring**: periodic cycles aggregate run and data-volume statistics,
//!   evaluate configurable alert rules and persist a health report
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use pipewatch::prelude::*;
//!
//! let pipeline = PipelineBuilder::new("etl_pipeline")
//!     .add("acquire", acquire, &[])
//!     .add("load", load, &["acquire"])
//!     .build()?;
//!
//! let executor = RunExecutor::new(history.clone(), materializations);
//! let run = executor.execute(&pipeline, None).await?;
//!
//! let cycle = MonitorCycle::new("etl_pipeline", history, volume, alert_log, reports);
//! let report = cycle.run_cycle().await?;
//! ```

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, missing_docs, rust_2018_idioms)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::cast_precision_loss
)]

pub mod acquisition;
pub mod collaborators;
pub mod config;
pub mod context;
pub mod core;
pub mod errors;
pub mod events;
pub mod history;
pub mod materialization;
pub mod monitor;
pub mod observability;
pub mod pipeline;
pub mod stages;
pub mod testing;
pub mod utils;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::collaborators::{
        AcquisitionClient, DataVolumeSource, EnrichmentCollaborator, LoadCollaborator,
        TransformCollaborator,
    };
    pub use crate::config::PipewatchConfig;
    pub use crate::context::{StageContext, StageInputs};
    pub use crate::core::{Artifact, Run, RunStatus, StageOutput, StageResult, StageResultStatus};
    pub use crate::errors::{
        AlertConfigError, CollaboratorError, CycleError, HistoryError, PersistenceError,
        PipewatchError, StageError,
    };
    pub use crate::events::{EventSink, LoggingEventSink, NoOpEventSink, PipelineEvent};
    pub use crate::history::{InMemoryRunHistory, JsonlRunHistory, RunHistoryStore};
    pub use crate::materialization::{
        InMemoryMaterializationLog, JsonlMaterializationLog, MaterializationLog,
        MaterializationVolumeSource,
    };
    pub use crate::monitor::{
        AlertEvent, AlertRule, AlertRuleEngine, AlertRuleSet, FileAlertLog, FileReportStore,
        HealthStatus, MonitorCycle, MonitorScheduler, MonitoringReport, Severity,
    };
    pub use crate::pipeline::{
        PipelineBuilder, PipelineDefinition, RetryPolicy, RunExecutor, StageSpec,
    };
    pub use crate::stages::Stage;
    pub use crate::utils::{iso_timestamp, Timestamp};
}
