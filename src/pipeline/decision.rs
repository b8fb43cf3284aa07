//! Fresh start or resume: where a build picks up.

use crate::checkpoint::{CheckpointRecord, CheckpointStore, step_name_of};
use crate::models::{BuildPlan, MineBuildError, Result, Step};
use serde::Serialize;
use std::fmt;

/// Whether a build starts from an empty mine or from a checkpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum ResumptionDecision {
    /// No checkpoint found
    Fresh,
    /// Restore `checkpoint` and continue after `step`
    ResumeAfter {
        step: String,
        checkpoint: CheckpointRecord,
    },
}

impl fmt::Display for ResumptionDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fresh => write!(f, "start fresh"),
            Self::ResumeAfter { step, .. } => write!(f, "resume after {step}"),
        }
    }
}

/// The decision plus the work it leaves.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Resumption {
    pub decision: ResumptionDecision,
    /// Steps still to integrate, in plan order
    pub remaining: Vec<Step>,
    /// Ordinal the next checkpoint will get
    pub next_ordinal: u32,
}

/// Work out where a build resumes.
///
/// Depends only on the checkpoint directory's contents and `plan`, so two
/// attempts against the same directory decide the same thing. Touches
/// nothing outside the checkpoint directory, which it only reads.
///
/// Every checkpoint must name a step of `plan`, and taken in ordinal order
/// their steps must appear in plan order.
pub fn plan_resumption(store: &CheckpointStore, plan: &BuildPlan) -> Result<Resumption> {
    let mut history = store.list()?;
    check_history(&history, plan)?;

    let latest = history.pop();
    let next_ordinal = CheckpointStore::next_ordinal(latest.as_ref())?;

    let Some(checkpoint) = latest else {
        return Ok(Resumption {
            decision: ResumptionDecision::Fresh,
            remaining: plan.all_steps().to_vec(),
            next_ordinal,
        });
    };

    let step = step_name_of(&checkpoint.identifier())?;
    let remaining = plan.steps_after(&step)?.to_vec();

    Ok(Resumption {
        decision: ResumptionDecision::ResumeAfter { step, checkpoint },
        remaining,
        next_ordinal,
    })
}

fn check_history(history: &[CheckpointRecord], plan: &BuildPlan) -> Result<()> {
    let mut previous: Option<(&CheckpointRecord, usize)> = None;
    for record in history {
        let position = plan
            .position_of(&record.step)
            .ok_or_else(|| MineBuildError::UnknownStep(record.step.clone()))?;

        if let Some((earlier, earlier_position)) = previous {
            if position <= earlier_position {
                return Err(MineBuildError::InconsistentHistory {
                    identifier: record.identifier(),
                    reason: format!(
                        "step '{}' does not come after '{}' of {} in the plan",
                        record.step,
                        earlier.step,
                        earlier.identifier()
                    ),
                });
            }
        }
        previous = Some((record, position));
    }
    Ok(())
}
