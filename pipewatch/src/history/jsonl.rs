//! JSON-lines file run history.

use super::{HistoryEvent, InMemoryRunHistory, RunHistoryStore};
use crate::core::{Run, RunStatus, StageResult};
use crate::errors::HistoryError;
use crate::utils::Timestamp;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Run history persisted as an append-only JSON-lines file.
///
/// Every transition is appended as one [`HistoryEvent`] line and applied to
/// an in-memory index that serves reads. Opening the store replays the file;
/// malformed lines (e.g., a torn final write) are skipped with a warning.
#[derive(Debug)]
pub struct JsonlRunHistory {
    path: PathBuf,
    index: InMemoryRunHistory,
    file: Mutex<tokio::fs::File>,
}

impl JsonlRunHistory {
    /// Opens (or creates) the history file at `path` and replays it.
    ///
    /// # Errors
    ///
    /// Returns an error if the file or its parent directory cannot be
    /// created or read.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, HistoryError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let index = InMemoryRunHistory::new();
        match tokio::fs::read_to_string(&path).await {
            Ok(contents) => replay(&index, &contents, &path),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        let file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;

        debug!(path = %path.display(), runs = index.len(), "Opened run history");
        Ok(Self {
            path,
            index,
            file: Mutex::new(file),
        })
    }

    /// Returns the history file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn append(&self, event: HistoryEvent) -> Result<(), HistoryError> {
        if !matches!(event, HistoryEvent::RunStarted { .. }) && !self.index.contains(event.run_id())
        {
            return Err(HistoryError::UnknownRun(event.run_id().to_string()));
        }

        let mut line = serde_json::to_string(&event)?;
        line.push('\n');
        // The index must see events in file order.
        let mut file = self.file.lock().await;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        self.index.apply(event)
    }
}

fn replay(index: &InMemoryRunHistory, contents: &str, path: &Path) {
    for (lineno, line) in contents.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let applied = serde_json::from_str::<HistoryEvent>(line)
            .map_err(HistoryError::from)
            .and_then(|event| index.apply(event));
        if let Err(e) = applied {
            warn!(
                path = %path.display(),
                line = lineno + 1,
                error = %e,
                "Skipping unreadable run history line"
            );
        }
    }
}

#[async_trait]
impl RunHistoryStore for JsonlRunHistory {
    async fn record_run_start(&self, run: &Run) -> Result<(), HistoryError> {
        self.append(HistoryEvent::RunStarted { run: run.clone() }).await
    }

    async fn record_stage_start(
        &self,
        run_id: &str,
        stage: &str,
        at: Timestamp,
    ) -> Result<(), HistoryError> {
        self.append(HistoryEvent::StageStarted {
            run_id: run_id.to_string(),
            stage: stage.to_string(),
            at,
        })
        .await
    }

    async fn record_stage_result(
        &self,
        run_id: &str,
        result: &StageResult,
    ) -> Result<(), HistoryError> {
        self.append(HistoryEvent::StageFinished {
            run_id: run_id.to_string(),
            result: result.clone(),
        })
        .await
    }

    async fn record_run_end(
        &self,
        run_id: &str,
        status: RunStatus,
        ended_at: Timestamp,
    ) -> Result<(), HistoryError> {
        self.append(HistoryEvent::RunEnded {
            run_id: run_id.to_string(),
            status,
            ended_at,
        })
        .await
    }

    async fn query_recent_runs(
        &self,
        pipeline: &str,
        limit: usize,
    ) -> Result<Vec<Run>, HistoryError> {
        Ok(self.index.recent(pipeline, limit))
    }

    async fn get_run(&self, run_id: &str) -> Result<Option<Run>, HistoryError> {
        Ok(self.index.snapshot(run_id))
    }
}

/// Read-only view of a JSON-lines run history.
///
/// Every query replays the file, so runs recorded by another process are
/// visible. Writes are rejected.
#[derive(Debug, Clone)]
pub struct JsonlRunHistoryReader {
    path: PathBuf,
}

impl JsonlRunHistoryReader {
    /// Creates a reader for the history at `path`. The file need not exist
    /// yet.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Returns the history file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load(&self) -> Result<InMemoryRunHistory, HistoryError> {
        let index = InMemoryRunHistory::new();
        match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => replay(&index, &contents, &self.path),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        Ok(index)
    }

    fn read_only(&self) -> HistoryError {
        HistoryError::Unavailable(format!("{} is opened read-only", self.path.display()))
    }
}

#[async_trait]
impl RunHistoryStore for JsonlRunHistoryReader {
    async fn record_run_start(&self, _run: &Run) -> Result<(), HistoryError> {
        Err(self.read_only())
    }

    async fn record_stage_start(
        &self,
        _run_id: &str,
        _stage: &str,
        _at: Timestamp,
    ) -> Result<(), HistoryError> {
        Err(self.read_only())
    }

    async fn record_stage_result(
        &self,
        _run_id: &str,
        _result: &StageResult,
    ) -> Result<(), HistoryError> {
        Err(self.read_only())
    }

    async fn record_run_end(
        &self,
        _run_id: &str,
        _status: RunStatus,
        _ended_at: Timestamp,
    ) -> Result<(), HistoryError> {
        Err(self.read_only())
    }

    async fn query_recent_runs(
        &self,
        pipeline: &str,
        limit: usize,
    ) -> Result<Vec<Run>, HistoryError> {
        Ok(self.load().await?.recent(pipeline, limit))
    }

    async fn get_run(&self, run_id: &str) -> Result<Option<Run>, HistoryError> {
        Ok(self.load().await?.snapshot(run_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::StageResultStatus;
    use crate::utils::now_utc;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    async fn record_finished_run(history: &JsonlRunHistory, status: RunStatus) -> String {
        let run = Run::new("etl_pipeline");
        history.record_run_start(&run).await.unwrap();
        history
            .record_stage_start(&run.id, "acquire", now_utc())
            .await
            .unwrap();
        let stage_status = if status == RunStatus::Succeeded {
            StageResultStatus::Succeeded
        } else {
            StageResultStatus::Failed
        };
        let result = StageResult {
            stage: "acquire".into(),
            status: stage_status,
            started_at: Some(run.started_at),
            ended_at: Some(now_utc()),
            attempts: 1,
            error: None,
            artifact: None,
        };
        history.record_stage_result(&run.id, &result).await.unwrap();
        history.record_run_end(&run.id, status, now_utc()).await.unwrap();
        run.id
    }

    #[tokio::test]
    async fn test_history_survives_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("history").join("runs.jsonl");

        let latest = {
            let history = JsonlRunHistory::open(&path).await.unwrap();
            record_finished_run(&history, RunStatus::Succeeded).await;
            record_finished_run(&history, RunStatus::Failed).await
        };

        let reopened = JsonlRunHistory::open(&path).await.unwrap();
        let runs = reopened.query_recent_runs("etl_pipeline", 10).await.unwrap();

        assert_eq!(runs.len(), 2);
        assert_eq!(runs[0].id, latest);
        assert_eq!(runs[0].status, RunStatus::Failed);
        assert_eq!(runs[1].status, RunStatus::Succeeded);
        assert_eq!(runs[1].stage_results.len(), 1);
    }

    #[tokio::test]
    async fn test_torn_line_is_skipped() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("runs.jsonl");

        {
            let history = JsonlRunHistory::open(&path).await.unwrap();
            record_finished_run(&history, RunStatus::Succeeded).await;
        }
        let mut contents = tokio::fs::read_to_string(&path).await.unwrap();
        contents.push_str("{\"event\":\"run_ended\",\"run_id\":");
        tokio::fs::write(&path, contents).await.unwrap();

        let reopened = JsonlRunHistory::open(&path).await.unwrap();
        let runs = reopened.query_recent_runs("etl_pipeline", 10).await.unwrap();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].status, RunStatus::Succeeded);
    }

    #[tokio::test]
    async fn test_in_flight_run_persisted() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("runs.jsonl");

        let history = JsonlRunHistory::open(&path).await.unwrap();
        let run = Run::new("etl_pipeline");
        history.record_run_start(&run).await.unwrap();
        history.record_stage_start(&run.id, "load", now_utc()).await.unwrap();

        let reopened = JsonlRunHistory::open(&path).await.unwrap();
        let seen = reopened.get_run(&run.id).await.unwrap().unwrap();
        assert_eq!(seen.status, RunStatus::Running);
        assert_eq!(seen.current_stage.as_deref(), Some("load"));
    }

    #[tokio::test]
    async fn test_unknown_run_not_written() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("runs.jsonl");

        let history = JsonlRunHistory::open(&path).await.unwrap();
        let err = history
            .record_stage_start("ghost", "load", now_utc())
            .await
            .unwrap_err();

        assert!(matches!(err, HistoryError::UnknownRun(_)));
        assert!(tokio::fs::read_to_string(&path).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_reader_sees_runs_recorded_after_creation() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("runs.jsonl");
        let reader = JsonlRunHistoryReader::new(&path);
        assert!(reader.query_recent_runs("etl_pipeline", 10).await.unwrap().is_empty());

        let history = JsonlRunHistory::open(&path).await.unwrap();
        let id = record_finished_run(&history, RunStatus::Failed).await;

        let run = reader.get_run(&id).await.unwrap().unwrap();
        assert_eq!(run.status, RunStatus::Failed);
        assert!(matches!(
            reader.record_run_start(&run).await,
            Err(HistoryError::Unavailable(_))
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_starts_keep_file_order() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("runs.jsonl");
        let history = std::sync::Arc::new(JsonlRunHistory::open(&path).await.unwrap());

        let starts = (0..32).map(|_| {
            let history = std::sync::Arc::clone(&history);
            tokio::spawn(async move {
                history.record_run_start(&Run::new("etl_pipeline")).await.unwrap();
            })
        });
        for handle in futures::future::join_all(starts).await {
            handle.unwrap();
        }

        let ids = |runs: Vec<Run>| runs.into_iter().map(|r| r.id).collect::<Vec<_>>();
        let live = ids(history.query_recent_runs("etl_pipeline", 50).await.unwrap());
        let replayed = ids(
            JsonlRunHistoryReader::new(&path)
                .query_recent_runs("etl_pipeline", 50)
                .await
                .unwrap(),
        );
        assert_eq!(live.len(), 32);
        assert_eq!(live, replayed);
    }
}
