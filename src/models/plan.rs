//! The ordered build plan.

use super::{MineBuildError, Project, Result, SourceConfig};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};

/// Separates the fields of a checkpoint identifier; step names may not contain it.
pub const FIELD_DELIMITER: char = '-';

/// One source-integration step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Step {
    /// Unique step name
    pub name: String,
    /// Position in the plan, 0-based
    pub position: usize,
    /// Take a checkpoint once this step succeeds
    pub dump: bool,
    /// Source type as declared in the descriptor, for logs and status output
    pub source_type: String,
    /// Opaque integration parameters
    pub params: BTreeMap<String, String>,
}

/// Steps in integration order plus a name→position index.
#[derive(Debug, Clone)]
pub struct BuildPlan {
    steps: Vec<Step>,
    positions: HashMap<String, usize>,
}

impl BuildPlan {
    /// Build a plan from sources in descriptor order.
    ///
    /// Rejects empty names, names containing [`FIELD_DELIMITER`] and duplicates,
    /// so that every step can later be recovered from a checkpoint identifier.
    pub fn new(sources: &[SourceConfig]) -> Result<Self> {
        let mut steps = Vec::with_capacity(sources.len());
        let mut positions = HashMap::with_capacity(sources.len());

        for (position, source) in sources.iter().enumerate() {
            validate_step_name(&source.name)?;
            if positions.insert(source.name.clone(), position).is_some() {
                return Err(MineBuildError::InvalidStepName {
                    name: source.name.clone(),
                    reason: "declared more than once".to_string(),
                });
            }
            steps.push(Step {
                name: source.name.clone(),
                position,
                dump: source.dump,
                source_type: source.source_type.clone(),
                params: source.params.clone(),
            });
        }

        Ok(Self { steps, positions })
    }

    pub fn from_project(project: &Project) -> Result<Self> {
        Self::new(&project.sources)
    }

    /// The full plan, for a from-scratch run.
    pub fn all_steps(&self) -> &[Step] {
        &self.steps
    }

    /// Every step positioned strictly after `step_name`.
    ///
    /// Empty when `step_name` is the last step. An unknown name means the
    /// checkpoint history and the descriptor disagree, which is an error.
    pub fn steps_after(&self, step_name: &str) -> Result<&[Step]> {
        let position = self
            .position_of(step_name)
            .ok_or_else(|| MineBuildError::UnknownStep(step_name.to_string()))?;
        Ok(&self.steps[position + 1..])
    }

    pub fn position_of(&self, step_name: &str) -> Option<usize> {
        self.positions.get(step_name).copied()
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

fn validate_step_name(name: &str) -> Result<()> {
    let reason = if name.trim().is_empty() {
        "name is empty"
    } else if name.contains(FIELD_DELIMITER) {
        "name contains the checkpoint field delimiter '-'"
    } else if name.contains(['/', '\\']) || name.chars().any(char::is_whitespace) {
        "name contains a path separator or whitespace"
    } else {
        return Ok(());
    };

    Err(MineBuildError::InvalidStepName {
        name: name.to_string(),
        reason: reason.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source(name: &str, dump: bool) -> SourceConfig {
        SourceConfig {
            name: name.to_string(),
            source_type: name.to_string(),
            dump,
            params: BTreeMap::new(),
        }
    }

    fn plan(names: &[&str]) -> BuildPlan {
        let sources: Vec<_> = names.iter().map(|n| source(n, true)).collect();
        BuildPlan::new(&sources).unwrap()
    }

    fn names(steps: &[Step]) -> Vec<&str> {
        steps.iter().map(|s| s.name.as_str()).collect()
    }

    #[test]
    fn test_steps_after_middle_step() {
        let plan = plan(&["A", "B", "C", "D"]);
        assert_eq!(names(plan.steps_after("B").unwrap()), ["C", "D"]);
    }

    #[test]
    fn test_steps_after_last_step_is_empty() {
        let plan = plan(&["A", "B", "C"]);
        assert!(plan.steps_after("C").unwrap().is_empty());
    }

    #[test]
    fn test_steps_after_unknown_step() {
        let plan = plan(&["A", "B"]);
        let err = plan.steps_after("Z").unwrap_err();
        assert!(matches!(err, MineBuildError::UnknownStep(name) if name == "Z"));
    }

    #[test]
    fn test_positions_are_dense() {
        let plan = plan(&["A", "B", "C"]);
        let positions: Vec<_> = plan.all_steps().iter().map(|s| s.position).collect();
        assert_eq!(positions, [0, 1, 2]);
        assert_eq!(plan.position_of("C"), Some(2));
    }

    #[test]
    fn test_rejects_delimiter_in_name() {
        let err = BuildPlan::new(&[source("uniprot-fasta", true)]).unwrap_err();
        assert!(matches!(err, MineBuildError::InvalidStepName { .. }));
    }

    #[test]
    fn test_rejects_duplicate_name() {
        let err = BuildPlan::new(&[source("go", true), source("go", false)]).unwrap_err();
        assert!(
            matches!(err, MineBuildError::InvalidStepName { reason, .. } if reason.contains("more than once"))
        );
    }
}
