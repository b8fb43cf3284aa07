//! minebuild - checkpointed, resumable builds of an InterMine data warehouse.
//!
//! ## Architecture
//!
//! A build loads every source listed in the project descriptor into the
//! mine's database, in order, then runs post-processing once:
//! - **Fresh**: no checkpoint → recreate database, build schema, integrate all sources
//! - **Resume**: latest checkpoint after source S → restore it, integrate sources after S
//!
//! Sources flagged `dump = true` get a database checkpoint once they integrate.
//!
//! ## Modules
//!
//! - `models`: project descriptor, build plan, database profile, errors
//! - `checkpoint`: checkpoint naming, discovery and creation
//! - `process`: external command execution with dry-run
//! - `pipeline`: the resumption decision and the build state machine

pub mod checkpoint;
pub mod models;
pub mod pipeline;
pub mod process;

// Re-exports for convenience
pub use checkpoint::{CheckpointRecord, CheckpointStore};
pub use models::{BuildPlan, DatabaseProfile, MineBuildError, Project, Result, Step};
pub use pipeline::{
    BuildReport, BuildState, Mine, Resumption, ResumptionDecision, ResumptionEngine,
    plan_resumption,
};
pub use process::{CommandRunner, ProcessRunner};
