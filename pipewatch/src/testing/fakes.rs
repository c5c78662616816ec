//! Fake collaborators for testing.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crate::collaborators::{AcquisitionClient, SourceBatch};
use crate::errors::CollaboratorError;

/// A scripted response to one fetch.
#[derive(Debug, Clone)]
pub enum ScriptedFetch {
    /// Rate limited with the given retry-after delay.
    RateLimited(Duration),
    /// Access denied.
    Denied(String),
    /// A retryable failure.
    Transient(String),
    /// A non-retryable failure.
    Fatal(String),
}

impl From<ScriptedFetch> for CollaboratorError {
    fn from(fetch: ScriptedFetch) -> Self {
        match fetch {
            ScriptedFetch::RateLimited(retry_after) => Self::RateLimited { retry_after },
            ScriptedFetch::Denied(msg) => Self::AccessDenied(msg),
            ScriptedFetch::Transient(msg) => Self::Transient(msg),
            ScriptedFetch::Fatal(msg) => Self::Fatal(msg),
        }
    }
}

/// An acquisition client whose fetches follow a per-source script.
///
/// Once a source's script is exhausted, fetches succeed with `limit`
/// records and no media.
#[derive(Debug, Default)]
pub struct FakeAcquisitionClient {
    scripts: Mutex<HashMap<String, VecDeque<ScriptedFetch>>>,
    fetches: Mutex<Vec<String>>,
    refuse_connect: bool,
    closed: AtomicBool,
}

impl FakeAcquisitionClient {
    /// Creates a client where every fetch succeeds.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Scripts the next fetches of `source`.
    #[must_use]
    pub fn script(self, source: impl Into<String>, responses: Vec<ScriptedFetch>) -> Self {
        self.scripts
            .lock()
            .entry(source.into())
            .or_default()
            .extend(responses);
        self
    }

    /// Makes `connect` fail.
    #[must_use]
    pub fn refuse_connect(mut self) -> Self {
        self.refuse_connect = true;
        self
    }

    /// Returns true once `close` has been called.
    #[must_use]
    pub fn was_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Returns the sources fetched, in call order.
    #[must_use]
    pub fn fetch_order(&self) -> Vec<String> {
        self.fetches.lock().clone()
    }
}

#[async_trait]
impl AcquisitionClient for FakeAcquisitionClient {
    async fn connect(&self) -> Result<(), CollaboratorError> {
        if self.refuse_connect {
            Err(CollaboratorError::Unavailable("connection refused".into()))
        } else {
            Ok(())
        }
    }

    async fn fetch(&self, source: &str, limit: usize) -> Result<SourceBatch, CollaboratorError> {
        self.fetches.lock().push(source.to_string());
        let scripted = self
            .scripts
            .lock()
            .get_mut(source)
            .and_then(VecDeque::pop_front);
        match scripted {
            Some(response) => Err(response.into()),
            None => Ok(SourceBatch {
                records: u64::try_from(limit).unwrap_or(u64::MAX),
                media_files: 0,
            }),
        }
    }

    async fn close(&self) -> Result<(), CollaboratorError> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn raw_data_location(&self) -> String {
        "data/raw".to_string()
    }
}
