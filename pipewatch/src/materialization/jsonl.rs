//! JSON-lines file materialization log.

use super::{InMemoryMaterializationLog, MaterializationLog, MaterializationRecord};
use crate::errors::PersistenceError;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::warn;

/// Materialization log persisted as an append-only JSON-lines file.
#[derive(Debug)]
pub struct JsonlMaterializationLog {
    path: PathBuf,
    index: InMemoryMaterializationLog,
    file: Mutex<tokio::fs::File>,
}

impl JsonlMaterializationLog {
    /// Opens (or creates) the log at `path` and loads existing records.
    ///
    /// # Errors
    ///
    /// Returns an error if the file or its parent directory cannot be
    /// created or read.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, PersistenceError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| PersistenceError::io(parent, e))?;
        }

        let index = InMemoryMaterializationLog::new();
        match tokio::fs::read_to_string(&path).await {
            Ok(contents) => load_lines(&index, &contents, &path),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(PersistenceError::io(&path, e)),
        }

        let file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(|e| PersistenceError::io(&path, e))?;

        Ok(Self {
            path,
            index,
            file: Mutex::new(file),
        })
    }

    /// Returns the log file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl MaterializationLog for JsonlMaterializationLog {
    async fn append(&self, record: &MaterializationRecord) -> Result<(), PersistenceError> {
        let mut line = serde_json::to_string(record)?;
        line.push('\n');
        {
            let mut file = self.file.lock().await;
            file.write_all(line.as_bytes())
                .await
                .map_err(|e| PersistenceError::io(&self.path, e))?;
            file.flush()
                .await
                .map_err(|e| PersistenceError::io(&self.path, e))?;
        }
        self.index.push(record.clone());
        Ok(())
    }

    async fn records_for_run(
        &self,
        run_id: &str,
    ) -> Result<Vec<MaterializationRecord>, PersistenceError> {
        self.index.records_for_run(run_id).await
    }

    async fn records_for_asset(
        &self,
        asset: &str,
    ) -> Result<Vec<MaterializationRecord>, PersistenceError> {
        self.index.records_for_asset(asset).await
    }

    async fn all(&self) -> Result<Vec<MaterializationRecord>, PersistenceError> {
        self.index.all().await
    }
}

fn load_lines(index: &InMemoryMaterializationLog, contents: &str, path: &Path) {
    for (lineno, line) in contents.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<MaterializationRecord>(line) {
            Ok(record) => index.push(record),
            Err(e) => warn!(
                path = %path.display(),
                line = lineno + 1,
                error = %e,
                "Skipping unreadable materialization record"
            ),
        }
    }
}

/// Read-only view of a JSON-lines materialization log.
///
/// Every query re-reads the file, so records appended by another process
/// are visible. Appends are rejected.
#[derive(Debug, Clone)]
pub struct JsonlMaterializationReader {
    path: PathBuf,
}

impl JsonlMaterializationReader {
    /// Creates a reader for the log at `path`. The file need not exist yet.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Returns the log file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load(&self) -> Result<InMemoryMaterializationLog, PersistenceError> {
        let index = InMemoryMaterializationLog::new();
        match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => load_lines(&index, &contents, &self.path),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(PersistenceError::io(&self.path, e)),
        }
        Ok(index)
    }
}

#[async_trait]
impl MaterializationLog for JsonlMaterializationReader {
    async fn append(&self, _record: &MaterializationRecord) -> Result<(), PersistenceError> {
        Err(PersistenceError::Unavailable(format!(
            "{} is opened read-only",
            self.path.display()
        )))
    }

    async fn records_for_run(
        &self,
        run_id: &str,
    ) -> Result<Vec<MaterializationRecord>, PersistenceError> {
        self.load().await?.records_for_run(run_id).await
    }

    async fn records_for_asset(
        &self,
        asset: &str,
    ) -> Result<Vec<MaterializationRecord>, PersistenceError> {
        self.load().await?.records_for_asset(asset).await
    }

    async fn all(&self) -> Result<Vec<MaterializationRecord>, PersistenceError> {
        self.load().await?.all().await
    }
}
