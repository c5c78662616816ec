//! Validated pipeline definitions.

use super::StageSpec;

/// An acyclic collection of stages with a fixed execution order.
///
/// Only [`super::PipelineBuilder::build`] creates definitions, so every
/// dependency resolves and the execution order respects every edge.
#[derive(Debug, Clone)]
pub struct PipelineDefinition {
    name: String,
    stages: Vec<StageSpec>,
    order: Vec<usize>,
}

impl PipelineDefinition {
    pub(crate) fn new(name: String, stages: Vec<StageSpec>, order: Vec<usize>) -> Self {
        Self {
            name,
            stages,
            order,
        }
    }

    /// Returns the pipeline name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the stages in declaration order.
    #[must_use]
    pub fn stages(&self) -> &[StageSpec] {
        &self.stages
    }

    /// Returns a stage by name.
    #[must_use]
    pub fn stage(&self, name: &str) -> Option<&StageSpec> {
        self.stages.iter().find(|s| s.name == name)
    }

    /// Returns the stages in execution order.
    pub fn execution_order(&self) -> impl Iterator<Item = &StageSpec> {
        self.order.iter().map(move |&i| &self.stages[i])
    }

    /// Returns the stage names in execution order.
    #[must_use]
    pub fn stage_names(&self) -> Vec<&str> {
        self.execution_order().map(|s| s.name.as_str()).collect()
    }

    /// Returns the stages that depend on `name`, directly or transitively.
    #[must_use]
    pub fn downstream_of(&self, name: &str) -> Vec<&str> {
        let mut affected: Vec<&str> = Vec::new();
        for spec in self.execution_order() {
            if spec
                .dependencies
                .iter()
                .any(|d| d == name || affected.contains(&d.as_str()))
            {
                affected.push(spec.name.as_str());
            }
        }
        affected
    }

    /// Returns the number of stages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.stages.len()
    }

    /// Returns true if the definition has no stages.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }
}
