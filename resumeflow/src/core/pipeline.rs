//! Declared pipeline shape: ordered stages and their dependencies.

use crate::errors::{EngineError, EngineResult};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

/// Names of the stages in the standard build pipeline, in order.
pub const STANDARD_STAGES: [&str; 5] = [
    "requirements_analysis",
    "architecture_design",
    "implementation",
    "testing",
    "documentation",
];

/// Declaration of one stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageDefinition {
    /// Unique stage name.
    pub name: String,
    /// Stages that must be completed or skipped first.
    #[serde(default)]
    pub depends_on: Vec<String>,
}

impl StageDefinition {
    /// Creates a stage definition with no dependencies.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            depends_on: Vec::new(),
        }
    }

    /// Adds a dependency.
    #[must_use]
    pub fn with_dependency(mut self, dependency: impl Into<String>) -> Self {
        self.depends_on.push(dependency.into());
        self
    }
}

/// An ordered, validated list of stage definitions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<StageDefinition>", into = "Vec<StageDefinition>")]
pub struct PipelineDefinition {
    stages: Vec<StageDefinition>,
}

impl PipelineDefinition {
    /// Validates and creates a pipeline.
    ///
    /// Names must be unique and non-empty, and every dependency must name a
    /// stage declared earlier, which also rules out cycles.
    pub fn new(stages: Vec<StageDefinition>) -> EngineResult<Self> {
        if stages.is_empty() {
            return Err(EngineError::InvalidPipeline(
                "pipeline declares no stages".to_string(),
            ));
        }
        let mut seen = HashSet::new();
        for stage in &stages {
            if stage.name.trim().is_empty() {
                return Err(EngineError::InvalidPipeline(
                    "stage names must not be empty".to_string(),
                ));
            }
            for dep in &stage.depends_on {
                if !seen.contains(dep.as_str()) {
                    return Err(EngineError::InvalidPipeline(format!(
                        "stage '{}' depends on '{}', which is not declared before it",
                        stage.name, dep
                    )));
                }
            }
            if !seen.insert(stage.name.as_str()) {
                return Err(EngineError::InvalidPipeline(format!(
                    "duplicate stage name '{}'",
                    stage.name
                )));
            }
        }
        Ok(Self { stages })
    }

    /// The standard five-stage build pipeline, each stage depending on the previous one.
    #[must_use]
    pub fn standard() -> Self {
        Self {
            stages: chain(&STANDARD_STAGES),
        }
    }

    /// Builds a linear pipeline where each stage depends on its predecessor.
    pub fn sequential(names: &[&str]) -> EngineResult<Self> {
        Self::new(chain(names))
    }

    /// Returns the stage definitions in declared order.
    #[must_use]
    pub fn stages(&self) -> &[StageDefinition] {
        &self.stages
    }

    /// Returns the stage names in declared order.
    pub fn stage_names(&self) -> impl Iterator<Item = &str> {
        self.stages.iter().map(|s| s.name.as_str())
    }

    /// Returns the position of a stage in declared order.
    #[must_use]
    pub fn position(&self, name: &str) -> Option<usize> {
        self.stages.iter().position(|s| s.name == name)
    }

    /// Returns true if the stage is declared.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    /// Returns the dependency mapping.
    #[must_use]
    pub fn dependency_map(&self) -> BTreeMap<String, Vec<String>> {
        self.stages
            .iter()
            .map(|s| (s.name.clone(), s.depends_on.clone()))
            .collect()
    }

    /// Returns the number of declared stages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.stages.len()
    }

    /// Returns true if no stages are declared.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }
}

fn chain(names: &[&str]) -> Vec<StageDefinition> {
    names
        .iter()
        .enumerate()
        .map(|(i, name)| {
            let def = StageDefinition::new(*name);
            if i == 0 {
                def
            } else {
                def.with_dependency(names[i - 1])
            }
        })
        .collect()
}

impl Default for PipelineDefinition {
    fn default() -> Self {
        Self::standard()
    }
}

impl TryFrom<Vec<StageDefinition>> for PipelineDefinition {
    type Error = EngineError;

    fn try_from(stages: Vec<StageDefinition>) -> Result<Self, Self::Error> {
        Self::new(stages)
    }
}

impl From<PipelineDefinition> for Vec<StageDefinition> {
    fn from(pipeline: PipelineDefinition) -> Self {
        pipeline.stages
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_pipeline_order() {
        let pipeline = PipelineDefinition::standard();
        let names: Vec<_> = pipeline.stage_names().collect();
        assert_eq!(names, STANDARD_STAGES);
        assert_eq!(pipeline.position("implementation"), Some(2));
        assert_eq!(
            pipeline.dependency_map()["architecture_design"],
            vec!["requirements_analysis".to_string()]
        );
    }

    #[test]
    fn test_rejects_duplicates() {
        let err = PipelineDefinition::new(vec![
            StageDefinition::new("a"),
            StageDefinition::new("a"),
        ])
        .unwrap_err();
        assert!(err.to_string().contains("duplicate"));
    }

    #[test]
    fn test_rejects_forward_dependency() {
        let err = PipelineDefinition::new(vec![
            StageDefinition::new("a").with_dependency("b"),
            StageDefinition::new("b"),
        ])
        .unwrap_err();
        assert!(matches!(err, EngineError::InvalidPipeline(_)));
    }

    #[test]
    fn test_rejects_self_dependency() {
        let result = PipelineDefinition::new(vec![StageDefinition::new("a").with_dependency("a")]);
        assert!(result.is_err());
    }

    #[test]
    fn test_sequential_chains_dependencies() {
        let pipeline = PipelineDefinition::sequential(&["plan", "build"]).unwrap();
        assert_eq!(pipeline.stages()[1].depends_on, vec!["plan".to_string()]);
        assert!(PipelineDefinition::sequential(&["x", "x"]).is_err());
    }

    #[test]
    fn test_rejects_empty() {
        assert!(PipelineDefinition::new(vec![]).is_err());
    }

    #[test]
    fn test_deserialize_validates() {
        let ok: PipelineDefinition =
            serde_json::from_str(r#"[{"name":"a"},{"name":"b","depends_on":["a"]}]"#).unwrap();
        assert_eq!(ok.len(), 2);

        let bad = serde_json::from_str::<PipelineDefinition>(r#"[{"name":"a"},{"name":"a"}]"#);
        assert!(bad.is_err());
    }
}
