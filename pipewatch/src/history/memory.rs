//! In-memory run history.

use super::{HistoryEvent, RunHistoryStore};
use crate::core::{Run, RunStatus, StageResult};
use crate::errors::HistoryError;
use crate::utils::Timestamp;
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// In-memory run history.
///
/// Each run lives behind its own lock, so a writer only ever locks the run
/// it owns and readers take short snapshots.
#[derive(Debug, Default)]
pub struct InMemoryRunHistory {
    runs: RwLock<HashMap<String, Arc<RwLock<Run>>>>,
    order: RwLock<Vec<String>>,
}

impl InMemoryRunHistory {
    /// Creates an empty history.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of runs recorded.
    #[must_use]
    pub fn len(&self) -> usize {
        self.order.read().len()
    }

    /// Returns true if no runs are recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.order.read().is_empty()
    }

    /// Returns true if a run with this id is recorded.
    #[must_use]
    pub fn contains(&self, run_id: &str) -> bool {
        self.runs.read().contains_key(run_id)
    }

    /// Inserts a finished or in-flight run as-is.
    pub fn insert(&self, run: Run) {
        let id = run.id.clone();
        let previous = self.runs.write().insert(id.clone(), Arc::new(RwLock::new(run)));
        if previous.is_none() {
            self.order.write().push(id);
        }
    }

    /// Applies one history transition.
    ///
    /// # Errors
    ///
    /// Returns [`HistoryError::UnknownRun`] if the event references a run
    /// that was never started.
    pub fn apply(&self, event: HistoryEvent) -> Result<(), HistoryError> {
        match event {
            HistoryEvent::RunStarted { run } => {
                self.insert(run);
                Ok(())
            }
            HistoryEvent::StageStarted { run_id, stage, .. } => self.update(&run_id, |run| {
                run.status = RunStatus::Running;
                run.current_stage = Some(stage);
            }),
            HistoryEvent::StageFinished { run_id, result } => self.update(&run_id, |run| {
                if run.current_stage.as_deref() == Some(result.stage.as_str()) {
                    run.current_stage = None;
                }
                match run.stage_results.iter_mut().find(|r| r.stage == result.stage) {
                    Some(existing) => *existing = result,
                    None => run.stage_results.push(result),
                }
            }),
            HistoryEvent::RunEnded {
                run_id,
                status,
                ended_at,
            } => self.update(&run_id, |run| {
                run.status = status;
                run.ended_at = Some(ended_at);
                run.current_stage = None;
            }),
        }
    }

    fn update(&self, run_id: &str, f: impl FnOnce(&mut Run)) -> Result<(), HistoryError> {
        let entry = self
            .runs
            .read()
            .get(run_id)
            .cloned()
            .ok_or_else(|| HistoryError::UnknownRun(run_id.to_string()))?;
        f(&mut entry.write());
        Ok(())
    }

    /// Returns up to `limit` runs of `pipeline`, newest first.
    #[must_use]
    pub fn recent(&self, pipeline: &str, limit: usize) -> Vec<Run> {
        let order = self.order.read();
        let runs = self.runs.read();
        order
            .iter()
            .rev()
            .filter_map(|id| runs.get(id))
            .map(|entry| entry.read().clone())
            .filter(|run| run.pipeline == pipeline)
            .take(limit)
            .collect()
    }

    /// Returns a snapshot of a run.
    #[must_use]
    pub fn snapshot(&self, run_id: &str) -> Option<Run> {
        self.runs.read().get(run_id).map(|entry| entry.read().clone())
    }
}

#[async_trait]
impl RunHistoryStore for InMemoryRunHistory {
    async fn record_run_start(&self, run: &Run) -> Result<(), HistoryError> {
        self.apply(HistoryEvent::RunStarted { run: run.clone() })
    }

    async fn record_stage_start(
        &self,
        run_id: &str,
        stage: &str,
        at: Timestamp,
    ) -> Result<(), HistoryError> {
        self.apply(HistoryEvent::StageStarted {
            run_id: run_id.to_string(),
            stage: stage.to_string(),
            at,
        })
    }

    async fn record_stage_result(
        &self,
        run_id: &str,
        result: &StageResult,
    ) -> Result<(), HistoryError> {
        self.apply(HistoryEvent::StageFinished {
            run_id: run_id.to_string(),
            result: result.clone(),
        })
    }

    async fn record_run_end(
        &self,
        run_id: &str,
        status: RunStatus,
        ended_at: Timestamp,
    ) -> Result<(), HistoryError> {
        self.apply(HistoryEvent::RunEnded {
            run_id: run_id.to_string(),
            status,
            ended_at,
        })
    }

    async fn query_recent_runs(
        &self,
        pipeline: &str,
        limit: usize,
    ) -> Result<Vec<Run>, HistoryError> {
        Ok(self.recent(pipeline, limit))
    }

    async fn get_run(&self, run_id: &str) -> Result<Option<Run>, HistoryError> {
        Ok(self.snapshot(run_id))
    }
}
