//! Mock stages for testing.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::json;
use std::collections::VecDeque;
use std::time::Duration;

use crate::context::StageContext;
use crate::core::{Artifact, StageOutput};
use crate::errors::StageError;
use crate::stages::Stage;

/// A stage that returns scripted results, then a default output.
#[derive(Debug)]
pub struct MockStage {
    name: String,
    output: Mutex<StageOutput>,
    script: Mutex<VecDeque<Result<StageOutput, StageError>>>,
    call_count: Mutex<usize>,
}

impl MockStage {
    /// Creates a mock stage that succeeds with an artifact named after it.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            output: Mutex::new(StageOutput::new(Artifact::new(&name, json!({"stage": name})))),
            name,
            script: Mutex::new(VecDeque::new()),
            call_count: Mutex::new(0),
        }
    }

    /// Sets the output returned once the script is exhausted.
    pub fn set_output(&self, output: StageOutput) {
        *self.output.lock() = output;
    }

    /// Queues results returned by the next calls, in order.
    #[must_use]
    pub fn with_script(self, results: Vec<Result<StageOutput, StageError>>) -> Self {
        self.script.lock().extend(results);
        self
    }

    /// Returns the number of times the stage was called.
    #[must_use]
    pub fn call_count(&self) -> usize {
        *self.call_count.lock()
    }
}

#[async_trait]
impl Stage for MockStage {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, _ctx: &StageContext) -> Result<StageOutput, StageError> {
        *self.call_count.lock() += 1;
        match self.script.lock().pop_front() {
            Some(result) => result,
            None => Ok(self.output.lock().clone()),
        }
    }
}

/// A stage that always fails.
#[derive(Debug)]
pub struct FailingStage {
    name: String,
    error: String,
    retryable: bool,
    call_count: Mutex<usize>,
}

impl FailingStage {
    /// Creates a stage failing with a non-retryable error.
    #[must_use]
    pub fn new(name: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            error: error.into(),
            retryable: false,
            call_count: Mutex::new(0),
        }
    }

    /// Creates a stage failing with a retryable error.
    #[must_use]
    pub fn retryable(name: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            retryable: true,
            ..Self::new(name, error)
        }
    }

    /// Returns the number of times the stage was called.
    #[must_use]
    pub fn call_count(&self) -> usize {
        *self.call_count.lock()
    }
}

#[async_trait]
impl Stage for FailingStage {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, _ctx: &StageContext) -> Result<StageOutput, StageError> {
        *self.call_count.lock() += 1;
        Err(StageError {
            message: self.error.clone(),
            retryable: self.retryable,
        })
    }
}

/// A stage that sleeps before succeeding.
#[derive(Debug)]
pub struct SlowStage {
    name: String,
    delay: Duration,
    call_count: Mutex<usize>,
}

impl SlowStage {
    /// Creates a slow stage.
    #[must_use]
    pub fn new(name: impl Into<String>, delay: Duration) -> Self {
        Self {
            name: name.into(),
            delay,
            call_count: Mutex::new(0),
        }
    }

    /// Creates a slow stage with a delay in seconds.
    #[must_use]
    pub fn with_delay_secs(name: impl Into<String>, secs: u64) -> Self {
        Self::new(name, Duration::from_secs(secs))
    }

    /// Returns the number of times the stage was called.
    #[must_use]
    pub fn call_count(&self) -> usize {
        *self.call_count.lock()
    }
}

#[async_trait]
impl Stage for SlowStage {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, _ctx: &StageContext) -> Result<StageOutput, StageError> {
        *self.call_count.lock() += 1;
        tokio::time::sleep(self.delay).await;
        Ok(StageOutput::new(Artifact::new(&self.name, json!(null))))
    }
}

/// A recorded execution.
#[derive(Debug, Clone)]
pub struct RecordedExecution {
    /// Stage name from the context.
    pub stage_name: String,
    /// Attempt number from the context.
    pub attempt: u32,
    /// Upstream stage names visible to the stage.
    pub upstream: Vec<String>,
    /// The initial input value, for root stages.
    pub initial: Option<serde_json::Value>,
}

/// A stage that records what it saw and forwards a counter artifact.
///
/// The artifact value is the number of upstream artifacts plus one, so
/// downstream stages can check what was handed to them.
#[derive(Debug)]
pub struct RecordingStage {
    name: String,
    executions: Mutex<Vec<RecordedExecution>>,
}

impl RecordingStage {
    /// Creates a recording stage.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            executions: Mutex::new(Vec::new()),
        }
    }

    /// Returns all recorded executions.
    #[must_use]
    pub fn executions(&self) -> Vec<RecordedExecution> {
        self.executions.lock().clone()
    }

    /// Returns the number of executions.
    #[must_use]
    pub fn execution_count(&self) -> usize {
        self.executions.lock().len()
    }
}

#[async_trait]
impl Stage for RecordingStage {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, ctx: &StageContext) -> Result<StageOutput, StageError> {
        let inputs = ctx.inputs();
        let upstream: Vec<String> = inputs.stages().into_iter().map(str::to_string).collect();
        let count = upstream.len() + 1;
        self.executions.lock().push(RecordedExecution {
            stage_name: ctx.stage_name().to_string(),
            attempt: ctx.attempt(),
            upstream,
            initial: inputs.initial().map(|a| a.value.clone()),
        });
        Ok(StageOutput::new(Artifact::new(&self.name, json!(count))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::StageInputs;
    use pretty_assertions::assert_eq;

    fn ctx(name: &str) -> StageContext {
        StageContext::detached(name, StageInputs::default())
    }

    #[tokio::test]
    async fn test_mock_stage_script_then_default() {
        let stage = MockStage::new("load").with_script(vec![Err(StageError::transient("busy"))]);

        assert!(stage.execute(&ctx("load")).await.is_err());
        let output = stage.execute(&ctx("load")).await.unwrap();
        assert_eq!(output.artifact.name, "load");
        assert_eq!(stage.call_count(), 2);
    }

    #[tokio::test]
    async fn test_failing_stage() {
        let stage = FailingStage::retryable("load", "socket reset");
        let err = stage.execute(&ctx("load")).await.unwrap_err();
        assert!(err.retryable);
        assert_eq!(err.message, "socket reset");
        assert!(!FailingStage::new("load", "bad").execute(&ctx("load")).await.unwrap_err().retryable);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_stage() {
        let stage = SlowStage::with_delay_secs("slow", 10);
        let start = tokio::time::Instant::now();
        stage.execute(&ctx("slow")).await.unwrap();
        assert!(start.elapsed() >= Duration::from_secs(10));
    }

    #[tokio::test]
    async fn test_recording_stage() {
        let stage = RecordingStage::new("transform");
        let inputs = StageInputs::new(
            "transform",
            vec![("load".to_string(), Artifact::new("load", json!(1)))],
        );
        let output = stage
            .execute(&StageContext::detached("transform", inputs))
            .await
            .unwrap();

        assert_eq!(output.artifact.value, json!(2));
        let executions = stage.executions();
        assert_eq!(executions[0].upstream, vec!["load"]);
        assert_eq!(executions[0].attempt, 1);
    }
}
