//! Pipeline builder with load-time validation.

use super::{PipelineDefinition, StageSpec};
use crate::errors::{
    ContractErrorInfo, CyclicDependencyError, PipelineValidationError, PipewatchError,
};
use crate::stages::Stage;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Builder for creating validated pipeline definitions.
///
/// Stages may be added in any order; dependencies are resolved and checked
/// in [`PipelineBuilder::build`].
#[derive(Debug, Clone)]
pub struct PipelineBuilder {
    name: String,
    stages: Vec<StageSpec>,
}

impl PipelineBuilder {
    /// Creates a new pipeline builder.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            stages: Vec::new(),
        }
    }

    /// Adds a stage with default timeout and retry policy.
    #[must_use]
    pub fn add(self, name: impl Into<String>, runner: Arc<dyn Stage>, dependencies: &[&str]) -> Self {
        self.stage(StageSpec::new(name, runner).with_dependencies(dependencies.iter().copied()))
    }

    /// Adds a fully specified stage.
    #[must_use]
    pub fn stage(mut self, spec: StageSpec) -> Self {
        self.stages.push(spec);
        self
    }

    /// Returns the pipeline name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the number of stages.
    #[must_use]
    pub fn stage_count(&self) -> usize {
        self.stages.len()
    }

    /// Validates the graph and builds the definition.
    ///
    /// # Errors
    ///
    /// Returns [`PipewatchError::Validation`] for an empty pipeline, duplicate
    /// or blank stage names, self-dependencies and unknown dependencies, and
    /// [`PipewatchError::CyclicDependency`] if the graph has a cycle.
    pub fn build(self) -> Result<PipelineDefinition, PipewatchError> {
        if self.stages.is_empty() {
            return Err(PipelineValidationError::new(format!(
                "Pipeline '{}' has no stages",
                self.name
            ))
            .with_error_info(
                ContractErrorInfo::new("CONFIG-PIPELINE-EMPTY", "Cannot build an empty pipeline")
                    .with_fix_hint("Add at least one stage to the pipeline before building."),
            )
            .into());
        }

        let mut seen = HashSet::new();
        for spec in &self.stages {
            spec.validate()?;
            if !seen.insert(spec.name.as_str()) {
                return Err(PipelineValidationError::new(format!(
                    "Stage '{}' is declared more than once",
                    spec.name
                ))
                .with_stages(vec![spec.name.clone()])
                .with_error_info(
                    ContractErrorInfo::new(
                        "CONFIG-PIPELINE-DUPLICATE",
                        format!("Duplicate stage name '{}'", spec.name),
                    )
                    .with_fix_hint("Give every stage in a pipeline a unique name."),
                )
                .into());
            }
        }

        for spec in &self.stages {
            for dep in &spec.dependencies {
                if !seen.contains(dep.as_str()) {
                    return Err(PipelineValidationError::new(format!(
                        "Stage '{}' depends on unknown stage '{}'",
                        spec.name, dep
                    ))
                    .with_stages(vec![spec.name.clone(), dep.clone()])
                    .with_error_info(
                        ContractErrorInfo::new(
                            "CONFIG-PIPELINE-MISSING_DEP",
                            format!("Dependency '{dep}' not found"),
                        )
                        .with_fix_hint("Add the missing stage or remove the dependency.")
                        .with_context_entry("pipeline", self.name.clone()),
                    )
                    .into());
                }
            }
        }

        self.detect_cycles()?;

        let order = topological_order(&self.stages);
        Ok(PipelineDefinition::new(self.name, self.stages, order))
    }

    fn detect_cycles(&self) -> Result<(), CyclicDependencyError> {
        let index: HashMap<&str, &StageSpec> =
            self.stages.iter().map(|s| (s.name.as_str(), s)).collect();
        let mut visited = HashSet::new();
        let mut on_path = HashSet::new();
        let mut path = Vec::new();

        for spec in &self.stages {
            if !visited.contains(spec.name.as_str()) {
                if let Some(cycle) =
                    dfs_cycle(&index, &spec.name, &mut visited, &mut on_path, &mut path)
                {
                    return Err(CyclicDependencyError::new(self.name.clone(), cycle));
                }
            }
        }

        Ok(())
    }
}

fn dfs_cycle<'a>(
    index: &HashMap<&'a str, &'a StageSpec>,
    node: &'a str,
    visited: &mut HashSet<&'a str>,
    on_path: &mut HashSet<&'a str>,
    path: &mut Vec<&'a str>,
) -> Option<Vec<String>> {
    visited.insert(node);
    on_path.insert(node);
    path.push(node);

    if let Some(spec) = index.get(node).copied() {
        for dep in &spec.dependencies {
            let dep = dep.as_str();
            if on_path.contains(dep) {
                let start = path.iter().position(|n| *n == dep).unwrap_or(0);
                let mut cycle: Vec<String> = path[start..].iter().map(|n| (*n).to_string()).collect();
                cycle.push(dep.to_string());
                return Some(cycle);
            }
            if !visited.contains(dep) {
                if let Some(cycle) = dfs_cycle(index, dep, visited, on_path, path) {
                    return Some(cycle);
                }
            }
        }
    }

    path.pop();
    on_path.remove(node);
    None
}

/// Orders an acyclic stage list so every stage follows its dependencies.
///
/// At each step the earliest-declared stage whose dependencies are all
/// placed is chosen, which makes the order unique for a given declaration.
fn topological_order(stages: &[StageSpec]) -> Vec<usize> {
    let mut placed: HashSet<&str> = HashSet::new();
    let mut order = Vec::with_capacity(stages.len());

    while order.len() < stages.len() {
        let next = stages.iter().enumerate().find(|(i, spec)| {
            !order.contains(i) && spec.dependencies.iter().all(|d| placed.contains(d.as_str()))
        });
        match next {
            Some((i, spec)) => {
                placed.insert(spec.name.as_str());
                order.push(i);
            }
            // Unreachable for a graph that passed cycle detection.
            None => break,
        }
    }

    order
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stages::NoOpStage;
    use pretty_assertions::assert_eq;

    fn noop(name: &str) -> Arc<dyn Stage> {
        Arc::new(NoOpStage::new(name))
    }

    #[test]
    fn test_build_linear_pipeline() {
        let definition = PipelineBuilder::new("etl")
            .add("acquire", noop("acquire"), &[])
            .add("load", noop("load"), &["acquire"])
            .add("transform", noop("transform"), &["load"])
            .build()
            .unwrap();

        assert_eq!(definition.name(), "etl");
        assert_eq!(definition.stage_names(), vec!["acquire", "load", "transform"]);
    }

    #[test]
    fn test_forward_references_are_resolved() {
        let definition = PipelineBuilder::new("etl")
            .add("load", noop("load"), &["acquire"])
            .add("acquire", noop("acquire"), &[])
            .build()
            .unwrap();

        assert_eq!(definition.stage_names(), vec!["acquire", "load"]);
    }

    #[test]
    fn test_ties_broken_by_declaration_order() {
        let definition = PipelineBuilder::new("fan")
            .add("root", noop("root"), &[])
            .add("c", noop("c"), &["root"])
            .add("a", noop("a"), &["root"])
            .add("b", noop("b"), &["root"])
            .add("join", noop("join"), &["a", "b", "c"])
            .build()
            .unwrap();

        assert_eq!(definition.stage_names(), vec!["root", "c", "a", "b", "join"]);
    }

    #[test]
    fn test_empty_pipeline_rejected() {
        let err = PipelineBuilder::new("empty").build().unwrap_err();
        match err {
            PipewatchError::Validation(e) => assert_eq!(e.code(), Some("CONFIG-PIPELINE-EMPTY")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_missing_dependency_rejected() {
        let err = PipelineBuilder::new("etl")
            .add("load", noop("load"), &["acquire"])
            .build()
            .unwrap_err();

        assert!(err.is_configuration_error());
        match err {
            PipewatchError::Validation(e) => {
                assert_eq!(e.code(), Some("CONFIG-PIPELINE-MISSING_DEP"));
                assert_eq!(e.stages, vec!["load", "acquire"]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_duplicate_stage_rejected() {
        let err = PipelineBuilder::new("etl")
            .add("load", noop("load"), &[])
            .add("load", noop("load"), &[])
            .build()
            .unwrap_err();

        match err {
            PipewatchError::Validation(e) => {
                assert_eq!(e.code(), Some("CONFIG-PIPELINE-DUPLICATE"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_cycle_rejected_with_path() {
        let err = PipelineBuilder::new("loop")
            .add("a", noop("a"), &["c"])
            .add("b", noop("b"), &["a"])
            .add("c", noop("c"), &["b"])
            .build()
            .unwrap_err();

        match err {
            PipewatchError::CyclicDependency(e) => {
                assert_eq!(e.pipeline, "loop");
                assert_eq!(e.cycle_path, vec!["a", "c", "b", "a"]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_self_dependency_rejected() {
        let err = PipelineBuilder::new("etl")
            .add("a", noop("a"), &["a"])
            .build()
            .unwrap_err();

        assert!(matches!(err, PipewatchError::Validation(_)));
    }
}
