//! Execution context handed to stages.

mod inputs;

pub use inputs::StageInputs;

/// Per-attempt context for a stage execution.
#[derive(Debug, Clone)]
pub struct StageContext {
    run_id: String,
    pipeline: String,
    stage_name: String,
    attempt: u32,
    inputs: StageInputs,
}

impl StageContext {
    /// Creates a new stage context.
    #[must_use]
    pub fn new(
        run_id: impl Into<String>,
        pipeline: impl Into<String>,
        stage_name: impl Into<String>,
        attempt: u32,
        inputs: StageInputs,
    ) -> Self {
        Self {
            run_id: run_id.into(),
            pipeline: pipeline.into(),
            stage_name: stage_name.into(),
            attempt,
            inputs,
        }
    }

    /// Creates a first-attempt context with no run, for tests and ad-hoc calls.
    #[must_use]
    pub fn detached(stage_name: impl Into<String>, inputs: StageInputs) -> Self {
        Self::new("detached", "detached", stage_name, 1, inputs)
    }

    /// Returns the run id.
    #[must_use]
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Returns the pipeline name.
    #[must_use]
    pub fn pipeline(&self) -> &str {
        &self.pipeline
    }

    /// Returns the stage name.
    #[must_use]
    pub fn stage_name(&self) -> &str {
        &self.stage_name
    }

    /// Returns the 1-based attempt number.
    #[must_use]
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Returns the stage inputs.
    #[must_use]
    pub fn inputs(&self) -> &StageInputs {
        &self.inputs
    }
}
