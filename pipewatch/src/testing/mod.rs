//! Testing utilities for pipewatch pipelines.
//!
//! This module provides:
//! - Mock stages (scripted, failing, slow, recording)
//! - A scriptable fake acquisition client
//! - Run fixtures for seeding history stores

mod fakes;
mod fixtures;
mod mocks;

pub use fakes::{FakeAcquisitionClient, ScriptedFetch};
pub use fixtures::{finished_run, run_with_status, seed_history};
pub use mocks::{FailingStage, MockStage, RecordedExecution, RecordingStage, SlowStage};
