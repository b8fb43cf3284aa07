//! Checkpoint module for resumable builds.
//!
//! Provides:
//! - `CheckpointRecord`: one dump artifact and the naming convention it follows
//! - `CheckpointStore`: discovery of the latest checkpoint and creation of new ones

mod record;
mod store;

pub use record::*;
pub use store::*;
