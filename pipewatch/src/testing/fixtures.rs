//! Run fixtures for seeding history stores.

use crate::core::{Run, RunStatus};
use crate::errors::HistoryError;
use crate::history::RunHistoryStore;
use chrono::Duration;

/// Creates a run of `pipeline` with `status` and no end time.
#[must_use]
pub fn run_with_status(pipeline: &str, status: RunStatus) -> Run {
    let mut run = Run::new(pipeline);
    run.status = status;
    run
}

/// Creates a terminal run that lasted `seconds`.
#[must_use]
pub fn finished_run(pipeline: &str, status: RunStatus, seconds: i64) -> Run {
    let mut run = run_with_status(pipeline, status);
    run.ended_at = Some(run.started_at + Duration::seconds(seconds));
    run
}

/// Records `runs` in `store` in the given order (the last one is newest).
///
/// # Errors
///
/// Returns the first store error.
pub async fn seed_history(store: &dyn RunHistoryStore, runs: &[Run]) -> Result<(), HistoryError> {
    for run in runs {
        store.record_run_start(run).await?;
        if let Some(ended_at) = run.ended_at {
            store.record_run_end(&run.id, run.status, ended_at).await?;
        }
    }
    Ok(())
}
