//! Bounded-concurrency acquisition worker pool.
//!
//! Requests for `(source, limit)` are pulled from a queue by at most
//! `concurrency` in-flight fetches. A rate-limited request is parked for the
//! delay the collaborator reports and then requeued, so other sources keep
//! making progress in the meantime.

use crate::collaborators::{AcquisitionClient, RawDataHandle, SourceOutcome, SourceStatus};
use crate::errors::CollaboratorError;
use futures::stream::{FuturesUnordered, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Configuration for the acquisition pool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AcquisitionPoolConfig {
    /// Maximum concurrent fetches.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    /// Maximum non-rate-limited attempts per source.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Maximum times one source may be requeued after rate limiting.
    #[serde(default = "default_max_requeues")]
    pub max_requeues: u32,
    /// Upper bound on a single rate-limit delay.
    #[serde(default = "default_max_rate_limit_delay_secs")]
    pub max_rate_limit_delay_secs: u64,
}

fn default_concurrency() -> usize {
    3
}

fn default_max_attempts() -> u32 {
    3
}

fn default_max_requeues() -> u32 {
    5
}

fn default_max_rate_limit_delay_secs() -> u64 {
    900
}

impl Default for AcquisitionPoolConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            max_attempts: default_max_attempts(),
            max_requeues: default_max_requeues(),
            max_rate_limit_delay_secs: default_max_rate_limit_delay_secs(),
        }
    }
}

impl AcquisitionPoolConfig {
    /// Sets the concurrency.
    #[must_use]
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    /// Sets the maximum attempts per source.
    #[must_use]
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    /// Sets the maximum requeues per source.
    #[must_use]
    pub fn with_max_requeues(mut self, requeues: u32) -> Self {
        self.max_requeues = requeues;
        self
    }
}

#[derive(Debug, Clone)]
struct AcquisitionRequest {
    index: usize,
    source: String,
    limit: usize,
    attempts: u32,
    failures: u32,
    requeues: u32,
}

/// Runs acquisition requests against a client with bounded concurrency.
#[derive(Debug, Clone, Default)]
pub struct AcquisitionPool {
    config: AcquisitionPoolConfig,
}

impl AcquisitionPool {
    /// Creates a new pool.
    #[must_use]
    pub fn new(config: AcquisitionPoolConfig) -> Self {
        Self { config }
    }

    /// Returns the pool configuration.
    #[must_use]
    pub fn config(&self) -> &AcquisitionPoolConfig {
        &self.config
    }

    /// Acquires up to `limit` records from each source.
    ///
    /// The client is connected first and always closed afterwards; a close
    /// failure is logged and does not discard the acquired data.
    ///
    /// # Errors
    ///
    /// Returns the connect error if the session cannot be opened. Per-source
    /// failures are reported in the returned handle, not as errors.
    pub async fn run(
        &self,
        client: Arc<dyn AcquisitionClient>,
        sources: &[String],
        limit: usize,
    ) -> Result<RawDataHandle, CollaboratorError> {
        client.connect().await?;
        info!(sources = sources.len(), limit, "Acquisition session opened");

        let outcomes = self.drain(&client, sources, limit).await;

        if let Err(e) = client.close().await {
            warn!(error = %e, "Failed to close acquisition session");
        }

        Ok(RawDataHandle {
            location: client.raw_data_location(),
            sources: outcomes,
        })
    }

    async fn drain(
        &self,
        client: &Arc<dyn AcquisitionClient>,
        sources: &[String],
        limit: usize,
    ) -> Vec<SourceOutcome> {
        let concurrency = self.config.concurrency.max(1);
        let max_delay = Duration::from_secs(self.config.max_rate_limit_delay_secs);

        let mut ready: VecDeque<AcquisitionRequest> = sources
            .iter()
            .enumerate()
            .map(|(index, source)| AcquisitionRequest {
                index,
                source: source.clone(),
                limit,
                attempts: 0,
                failures: 0,
                requeues: 0,
            })
            .collect();
        let mut outcomes: Vec<Option<SourceOutcome>> = vec![None; sources.len()];
        let mut active = FuturesUnordered::new();
        let mut parked = FuturesUnordered::new();

        loop {
            while active.len() < concurrency {
                let Some(mut request) = ready.pop_front() else {
                    break;
                };
                request.attempts += 1;
                let client = Arc::clone(client);
                active.push(async move {
                    let result = client.fetch(&request.source, request.limit).await;
                    (request, result)
                });
            }

            if active.is_empty() && parked.is_empty() {
                break;
            }

            tokio::select! {
                Some((mut request, result)) = active.next(), if !active.is_empty() => {
                    let index = request.index;
                    match result {
                        Ok(batch) => {
                            debug!(source = %request.source, records = batch.records, "Source acquired");
                            outcomes[index] = Some(SourceOutcome {
                                source: request.source,
                                status: SourceStatus::Completed,
                                records: batch.records,
                                media_files: batch.media_files,
                                attempts: request.attempts,
                                error: None,
                            });
                        }
                        Err(CollaboratorError::RateLimited { retry_after }) => {
                            if request.requeues < self.config.max_requeues {
                                request.requeues += 1;
                                let delay = retry_after.min(max_delay);
                                warn!(
                                    source = %request.source,
                                    delay_secs = delay.as_secs_f64(),
                                    "Rate limited; requeueing source"
                                );
                                parked.push(async move {
                                    tokio::time::sleep(delay).await;
                                    request
                                });
                            } else {
                                let error = format!(
                                    "rate limited {} times; giving up",
                                    request.requeues + 1
                                );
                                outcomes[index] = Some(failed(request, SourceStatus::Failed, error));
                            }
                        }
                        Err(CollaboratorError::AccessDenied(reason)) => {
                            warn!(source = %request.source, %reason, "Access denied; skipping source");
                            outcomes[index] = Some(failed(request, SourceStatus::Denied, reason));
                        }
                        Err(e) if e.is_retryable() => {
                            request.failures += 1;
                            if request.failures < self.config.max_attempts {
                                warn!(source = %request.source, error = %e, "Transient acquisition failure; retrying");
                                ready.push_back(request);
                            } else {
                                outcomes[index] = Some(failed(request, SourceStatus::Failed, e.to_string()));
                            }
                        }
                        Err(e) => {
                            warn!(source = %request.source, error = %e, "Acquisition failed for source");
                            outcomes[index] = Some(failed(request, SourceStatus::Failed, e.to_string()));
                        }
                    }
                }
                Some(request) = parked.next(), if !parked.is_empty() => {
                    ready.push_back(request);
                }
                else => break,
            }
        }

        outcomes.into_iter().flatten().collect()
    }
}

fn failed(request: AcquisitionRequest, status: SourceStatus, error: String) -> SourceOutcome {
    SourceOutcome {
        source: request.source,
        status,
        records: 0,
        media_files: 0,
        attempts: request.attempts,
        error: Some(error),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeAcquisitionClient, ScriptedFetch};

    fn sources(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| (*s).to_string()).collect()
    }

    #[tokio::test(start_paused = true)]
    async fn test_all_sources_complete() {
        let client = Arc::new(FakeAcquisitionClient::new());
        let pool = AcquisitionPool::new(AcquisitionPoolConfig::default());

        let handle = pool
            .run(client.clone(), &sources(&["a", "b", "c"]), 10)
            .await
            .unwrap();

        assert_eq!(handle.records_acquired(), 30);
        assert_eq!(handle.completed_sources(), vec!["a", "b", "c"]);
        assert!(client.was_closed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limited_source_is_requeued_after_delay() {
        let client = Arc::new(
            FakeAcquisitionClient::new()
                .script("slow", vec![ScriptedFetch::RateLimited(Duration::from_secs(30))]),
        );
        let pool = AcquisitionPool::new(AcquisitionPoolConfig::default().with_concurrency(1));

        let started = tokio::time::Instant::now();
        let handle = pool
            .run(client.clone(), &sources(&["slow", "fast"]), 5)
            .await
            .unwrap();

        assert!(started.elapsed() >= Duration::from_secs(30));
        assert_eq!(handle.sources[0].status, SourceStatus::Completed);
        assert_eq!(handle.sources[0].attempts, 2);
        // The other source was fetched while "slow" was parked.
        assert_eq!(client.fetch_order(), vec!["slow", "fast", "slow"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_access_denied_is_fatal_for_that_source_only() {
        let client = Arc::new(
            FakeAcquisitionClient::new()
                .script("private", vec![ScriptedFetch::Denied("channel is private".into())]),
        );
        let pool = AcquisitionPool::default();

        let handle = pool
            .run(client.clone(), &sources(&["private", "public"]), 5)
            .await
            .unwrap();

        assert_eq!(handle.sources[0].status, SourceStatus::Denied);
        assert_eq!(handle.sources[0].attempts, 1);
        assert_eq!(handle.sources[1].status, SourceStatus::Completed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_failures_exhaust_attempts() {
        let client = Arc::new(FakeAcquisitionClient::new().script(
            "flaky",
            vec![
                ScriptedFetch::Transient("reset".into()),
                ScriptedFetch::Transient("reset".into()),
                ScriptedFetch::Transient("reset".into()),
            ],
        ));
        let pool = AcquisitionPool::new(AcquisitionPoolConfig::default().with_max_attempts(3));

        let handle = pool.run(client, &sources(&["flaky"]), 5).await.unwrap();

        assert_eq!(handle.sources[0].status, SourceStatus::Failed);
        assert_eq!(handle.sources[0].attempts, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_requeue_limit() {
        let client = Arc::new(FakeAcquisitionClient::new().script(
            "busy",
            vec![ScriptedFetch::RateLimited(Duration::from_secs(1)); 3],
        ));
        let pool = AcquisitionPool::new(AcquisitionPoolConfig::default().with_max_requeues(2));

        let handle = pool.run(client, &sources(&["busy"]), 5).await.unwrap();

        assert_eq!(handle.sources[0].status, SourceStatus::Failed);
        assert_eq!(handle.sources[0].attempts, 3);
    }

    #[tokio::test]
    async fn test_connect_failure_is_returned() {
        let client = Arc::new(FakeAcquisitionClient::new().refuse_connect());
        let pool = AcquisitionPool::default();

        let err = pool.run(client, &sources(&["a"]), 5).await.unwrap_err();
        assert!(matches!(err, CollaboratorError::Unavailable(_)));
    }
}
