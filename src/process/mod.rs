//! External process execution.
//!
//! Provides:
//! - `Invocation`: a program plus arguments, optionally bound to a database
//! - `CommandRunner`: the seam every external side effect goes through
//! - `ProcessRunner`: spawns real child processes, or only logs them in dry-run

#[cfg(test)]
mod recording;
mod runner;

#[cfg(test)]
pub(crate) use recording::RecordingRunner;
pub use runner::*;
