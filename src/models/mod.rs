//! Core data models for minebuild.
//!
//! - `Project`: the descriptor, sources in integration order
//! - `BuildPlan` / `Step`: the validated, immutable plan
//! - `DatabaseProfile`: where the mine lives
//! - `MineBuildError`: every way a build can end badly

mod database;
mod error;
mod plan;
mod project;

pub use database::*;
pub use error::*;
pub use plan::*;
pub use project::*;
