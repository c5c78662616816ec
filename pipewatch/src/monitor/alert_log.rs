//! Durable log of alert events.

use super::engine::AlertEvent;
use crate::errors::PersistenceError;
use async_trait::async_trait;
use parking_lot::RwLock;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

/// Append-only sink for alert events.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AlertLog: Send + Sync + std::fmt::Debug {
    /// Appends an event.
    async fn append(&self, event: &AlertEvent) -> Result<(), PersistenceError>;
}

/// Alert log written as JSON lines, one event per line.
#[derive(Debug)]
pub struct FileAlertLog {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl FileAlertLog {
    /// Creates a log at `path`. The file and its parent directory are
    /// created on first append.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// Returns the log path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads every event in the log, skipping lines that do not parse.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read.
    pub async fn read_all(&self) -> Result<Vec<AlertEvent>, PersistenceError> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => Ok(contents
                .lines()
                .filter_map(|line| serde_json::from_str(line).ok())
                .collect()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(PersistenceError::io(&self.path, e)),
        }
    }
}

#[async_trait]
impl AlertLog for FileAlertLog {
    async fn append(&self, event: &AlertEvent) -> Result<(), PersistenceError> {
        let mut line = serde_json::to_string(event)?;
        line.push('\n');

        let _guard = self.write_lock.lock().await;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| PersistenceError::io(parent, e))?;
        }
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|e| PersistenceError::io(&self.path, e))?;
        file.write_all(line.as_bytes())
            .await
            .map_err(|e| PersistenceError::io(&self.path, e))?;
        file.flush()
            .await
            .map_err(|e| PersistenceError::io(&self.path, e))
    }
}

/// In-memory alert log.
#[derive(Debug, Default)]
pub struct InMemoryAlertLog {
    events: RwLock<Vec<AlertEvent>>,
}

impl InMemoryAlertLog {
    /// Creates an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of the logged events.
    #[must_use]
    pub fn events(&self) -> Vec<AlertEvent> {
        self.events.read().clone()
    }

    /// Returns the number of logged events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.read().len()
    }

    /// Returns true if nothing was logged.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.read().is_empty()
    }
}

#[async_trait]
impl AlertLog for InMemoryAlertLog {
    async fn append(&self, event: &AlertEvent) -> Result<(), PersistenceError> {
        self.events.write().push(event.clone());
        Ok(())
    }
}
