//! Run executor.
//!
//! Walks a [`PipelineDefinition`] in topological order, one stage at a time.
//! A stage whose upstream did not succeed is skipped without being invoked.
//! Every transition is written to the run history as it happens, so a
//! monitor can observe the run while it is still in flight.

use super::{PipelineDefinition, StageSpec};
use crate::context::{StageContext, StageInputs};
use crate::core::{Artifact, Run, RunStatus, StageOutput, StageResult, StageResultStatus};
use crate::errors::PipewatchError;
use crate::events::{EventSink, NoOpEventSink, PipelineEvent};
use crate::history::RunHistoryStore;
use crate::materialization::{MaterializationLog, MaterializationRecord};
use crate::utils::now_utc;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// How a stage's attempts ended.
#[derive(Debug)]
enum AttemptOutcome {
    Succeeded { output: StageOutput, attempts: u32 },
    Failed { error: String, attempts: u32 },
    TimedOut { error: String, attempts: u32 },
}

/// Executes pipeline runs against a run history and materialization log.
#[derive(Debug, Clone)]
pub struct RunExecutor {
    history: Arc<dyn RunHistoryStore>,
    materializations: Arc<dyn MaterializationLog>,
    events: Arc<dyn EventSink>,
}

impl RunExecutor {
    /// Creates an executor.
    #[must_use]
    pub fn new(
        history: Arc<dyn RunHistoryStore>,
        materializations: Arc<dyn MaterializationLog>,
    ) -> Self {
        Self {
            history,
            materializations,
            events: Arc::new(NoOpEventSink),
        }
    }

    /// Sets the event sink.
    #[must_use]
    pub fn with_event_sink(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    /// Returns the run history.
    #[must_use]
    pub fn history(&self) -> &Arc<dyn RunHistoryStore> {
        &self.history
    }

    /// Executes one run of `definition`.
    ///
    /// `initial` is offered to root stages. Stage failures never surface as
    /// errors here; they are recorded on the returned [`Run`].
    ///
    /// # Errors
    ///
    /// Returns an error if the run history or materialization log cannot be
    /// written.
    pub async fn execute(
        &self,
        definition: &PipelineDefinition,
        initial: Option<Artifact>,
    ) -> Result<Run, PipewatchError> {
        let mut run = Run::new(definition.name());
        run.status = RunStatus::Running;
        self.history.record_run_start(&run).await?;
        self.emit(PipelineEvent::RunStarted {
            run_id: run.id.clone(),
            pipeline: run.pipeline.clone(),
        });
        info!(run_id = %run.id, pipeline = %run.pipeline, stages = definition.len(), "Run started");

        if let Err(e) = self.run_stages(&mut run, definition, initial).await {
            self.abandon(&run, &e).await;
            return Err(e);
        }

        let status = RunStatus::from_results(run.stage_results.iter().map(|r| &r.status));
        let ended_at = now_utc();
        self.history.record_run_end(&run.id, status, ended_at).await?;
        run.status = status;
        run.ended_at = Some(ended_at);

        self.emit(PipelineEvent::RunCompleted {
            run_id: run.id.clone(),
            pipeline: run.pipeline.clone(),
            status,
        });
        info!(
            run_id = %run.id,
            pipeline = %run.pipeline,
            status = %status,
            duration_secs = run.duration_seconds().unwrap_or_default(),
            "Run completed"
        );

        Ok(run)
    }

    async fn run_stages(
        &self,
        run: &mut Run,
        definition: &PipelineDefinition,
        initial: Option<Artifact>,
    ) -> Result<(), PipewatchError> {
        let mut artifacts: HashMap<String, Artifact> = HashMap::new();

        for spec in definition.execution_order() {
            let blocked_by = spec.dependencies.iter().find(|dep| {
                run.result_for(dep)
                    .is_none_or(|r| r.status != StageResultStatus::Succeeded)
            });

            let result = if let Some(dep) = blocked_by {
                let reason = format!("upstream stage '{dep}' did not succeed");
                debug!(run_id = %run.id, stage = %spec.name, %reason, "Skipping stage");
                self.emit(PipelineEvent::StageSkipped {
                    run_id: run.id.clone(),
                    stage: spec.name.clone(),
                    reason: reason.clone(),
                });
                StageResult::skipped(&spec.name, reason)
            } else {
                let inputs = if spec.is_root() {
                    StageInputs::root(&spec.name, initial.clone())
                } else {
                    StageInputs::new(
                        &spec.name,
                        spec.dependencies
                            .iter()
                            .filter_map(|dep| artifacts.get(dep).map(|a| (dep.clone(), a.clone())))
                            .collect(),
                    )
                };
                self.run_stage(run, spec, inputs, &mut artifacts).await?
            };

            self.history.record_stage_result(&run.id, &result).await?;
            run.current_stage = None;
            run.stage_results.push(result);
        }
        Ok(())
    }

    /// Closes a run whose bookkeeping failed mid-flight, so it does not
    /// stay RUNNING in the history.
    async fn abandon(&self, run: &Run, cause: &PipewatchError) {
        warn!(run_id = %run.id, stage = ?run.current_stage, error = %cause, "Run aborted; marking failed");
        if let Err(e) = self
            .history
            .record_run_end(&run.id, RunStatus::Failed, now_utc())
            .await
        {
            warn!(run_id = %run.id, error = %e, "Failed to record end of aborted run");
        }
    }

    async fn run_stage(
        &self,
        run: &mut Run,
        spec: &StageSpec,
        inputs: StageInputs,
        artifacts: &mut HashMap<String, Artifact>,
    ) -> Result<StageResult, PipewatchError> {
        let started_at = now_utc();
        self.history
            .record_stage_start(&run.id, &spec.name, started_at)
            .await?;
        run.current_stage = Some(spec.name.clone());

        let clock = Instant::now();
        let outcome = self.attempt_stage(run, spec, &inputs).await;
        let duration_ms = u64::try_from(clock.elapsed().as_millis()).unwrap_or(u64::MAX);

        let result = match outcome {
            AttemptOutcome::Succeeded { output, attempts } => {
                let record =
                    MaterializationRecord::from_output(&run.id, &run.pipeline, &spec.name, &output);
                self.materializations.append(&record).await?;

                self.emit(PipelineEvent::StageCompleted {
                    run_id: run.id.clone(),
                    stage: spec.name.clone(),
                    attempts,
                    duration_ms,
                });
                let result =
                    StageResult::succeeded(&spec.name, started_at, attempts, output.artifact.reference());
                artifacts.insert(spec.name.clone(), output.artifact);
                result
            }
            AttemptOutcome::Failed { error, attempts } => {
                self.emit(PipelineEvent::StageFailed {
                    run_id: run.id.clone(),
                    stage: spec.name.clone(),
                    attempts,
                    error: error.clone(),
                });
                StageResult::unsuccessful(
                    &spec.name,
                    StageResultStatus::Failed,
                    started_at,
                    attempts,
                    error,
                )
            }
            AttemptOutcome::TimedOut { error, attempts } => {
                self.emit(PipelineEvent::StageTimedOut {
                    run_id: run.id.clone(),
                    stage: spec.name.clone(),
                    attempts,
                });
                StageResult::unsuccessful(
                    &spec.name,
                    StageResultStatus::TimedOut,
                    started_at,
                    attempts,
                    error,
                )
            }
        };

        Ok(result)
    }

    async fn attempt_stage(&self, run: &Run, spec: &StageSpec, inputs: &StageInputs) -> AttemptOutcome {
        let mut attempt = 0;
        loop {
            attempt += 1;
            self.emit(PipelineEvent::StageStarted {
                run_id: run.id.clone(),
                stage: spec.name.clone(),
                attempt,
            });

            let ctx = StageContext::new(&run.id, &run.pipeline, &spec.name, attempt, inputs.clone());
            let (error, timed_out, retryable) =
                match tokio::time::timeout(spec.timeout, spec.runner.execute(&ctx)).await {
                    Ok(Ok(output)) => {
                        return AttemptOutcome::Succeeded {
                            output,
                            attempts: attempt,
                        }
                    }
                    Ok(Err(e)) => (e.message, false, e.retryable),
                    Err(_) => (
                        format!(
                            "stage '{}' exceeded its time limit of {:.1}s",
                            spec.name,
                            spec.timeout.as_secs_f64()
                        ),
                        true,
                        true,
                    ),
                };

            if retryable && spec.retry.allows_retry_after(attempt) {
                let delay = spec.retry.delay_for(attempt);
                warn!(
                    run_id = %run.id,
                    stage = %spec.name,
                    attempt,
                    delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    error = %error,
                    "Stage attempt failed; retrying"
                );
                self.emit(PipelineEvent::StageRetrying {
                    run_id: run.id.clone(),
                    stage: spec.name.clone(),
                    attempt,
                    delay_ms: u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    error,
                });
                tokio::time::sleep(delay).await;
                continue;
            }

            warn!(run_id = %run.id, stage = %spec.name, attempts = attempt, error = %error, "Stage gave up");
            return if timed_out {
                AttemptOutcome::TimedOut {
                    error,
                    attempts: attempt,
                }
            } else {
                AttemptOutcome::Failed {
                    error,
                    attempts: attempt,
                }
            };
        }
    }

    fn emit(&self, event: PipelineEvent) {
        self.events.emit(&event);
    }
}
