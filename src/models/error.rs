//! Error types for minebuild.
//!
//! Every variant here is terminal for a build: nothing is recovered locally
//! and no external command is retried. The engine turns these into the
//! `Failed` state and the CLI turns that into a non-zero exit.

use crate::process::CommandError;
use std::path::PathBuf;
use thiserror::Error;

/// Top-level error type for minebuild.
#[derive(Debug, Error)]
pub enum MineBuildError {
    // ═══════════════════════════════════════════════════════════════════
    // Inconsistent inputs (plan, descriptor, checkpoint directory)
    // ═══════════════════════════════════════════════════════════════════

    #[error("Project descriptor error: {0}")]
    Project(#[from] super::ProjectError),

    #[error("Invalid step name '{name}': {reason}")]
    InvalidStepName { name: String, reason: String },

    #[error("Malformed checkpoint '{identifier}': {reason}")]
    MalformedCheckpoint { identifier: String, reason: String },

    #[error(
        "Checkpoint references step '{0}' which is not in the current plan \
         (was the project descriptor edited since the checkpoint was taken?)"
    )]
    UnknownStep(String),

    #[error(
        "Checkpoint history does not follow the current plan at '{identifier}': {reason} \
         (was the project descriptor reordered since the checkpoints were taken?)"
    )]
    InconsistentHistory { identifier: String, reason: String },

    #[error("Checkpoint directory {0} does not exist or is not a directory")]
    MissingCheckpointDir(PathBuf),

    // ═══════════════════════════════════════════════════════════════════
    // External commands that exited badly
    // ═══════════════════════════════════════════════════════════════════

    #[error("Environment preparation failed: {0}")]
    PreparationFailure(#[source] CommandError),

    #[error("Restore from checkpoint {checkpoint} failed: {source}")]
    RestoreFailure {
        checkpoint: PathBuf,
        #[source]
        source: CommandError,
    },

    #[error("Integration of source '{step}' failed: {source}")]
    IntegrationFailure {
        step: String,
        #[source]
        source: CommandError,
    },

    #[error(
        "Source '{step}' was integrated but its checkpoint could not be written: {source}. \
         The next resume restores the previous checkpoint and integrates '{step}' again"
    )]
    CheckpointWrite {
        step: String,
        #[source]
        source: CheckpointWriteError,
    },

    #[error("Post-processing failed: {0}")]
    PostProcessFailure(#[source] CommandError),

    // ═══════════════════════════════════════════════════════════════════
    // Local filesystem
    // ═══════════════════════════════════════════════════════════════════

    #[error("IO error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl MineBuildError {
    /// Create an IO error with context.
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Create a malformed-checkpoint error.
    pub fn malformed(identifier: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MalformedCheckpoint {
            identifier: identifier.into(),
            reason: reason.into(),
        }
    }

    /// Name of the source this error is attached to, if any.
    pub fn step(&self) -> Option<&str> {
        match self {
            Self::IntegrationFailure { step, .. } | Self::CheckpointWrite { step, .. } => {
                Some(step.as_str())
            }
            _ => None,
        }
    }

}

/// Why a dump did not end up as a checkpoint artifact.
#[derive(Debug, Error)]
pub enum CheckpointWriteError {
    #[error(transparent)]
    Dump(#[from] CommandError),

    #[error("moving {from} into place failed: {source}")]
    Rename {
        from: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Result type alias for minebuild.
pub type Result<T> = std::result::Result<T, MineBuildError>;
