//! Core domain model types for pipewatch.
//!
//! This module contains the fundamental types used throughout the crate:
//! - Run, stage result and stage kind enums
//! - Artifacts and stage outputs
//! - Runs and stage results

mod artifact;
mod output;
mod run;
mod status;

pub use artifact::{Artifact, ArtifactRef};
pub use output::StageOutput;
pub use run::{Run, StageResult};
pub use status::{RunStatus, StageKind, StageResultStatus};
