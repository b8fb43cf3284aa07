//! In-memory runner used by tests: records invocations instead of spawning.

use super::{CommandError, CommandRunner, Invocation};
use std::cell::RefCell;

#[derive(Debug, Default)]
pub struct RecordingRunner {
    dry_run: bool,
    fail_on: Vec<String>,
    calls: RefCell<Vec<Invocation>>,
}

impl RecordingRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn dry_run() -> Self {
        Self {
            dry_run: true,
            ..Self::default()
        }
    }

    /// Fail any command whose rendered form contains `needle`.
    pub fn failing_on(mut self, needle: &str) -> Self {
        self.fail_on.push(needle.to_string());
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.borrow().iter().map(ToString::to_string).collect()
    }

    /// Source names passed to `integrate`, in call order.
    pub fn integrated(&self) -> Vec<String> {
        self.calls
            .borrow()
            .iter()
            .filter(|inv| inv.args.first().is_some_and(|a| a == "integrate"))
            .filter_map(|inv| {
                inv.args
                    .iter()
                    .find_map(|a| a.strip_prefix("-Psource=").map(str::to_string))
            })
            .collect()
    }

    pub fn count_containing(&self, needle: &str) -> usize {
        self.calls().iter().filter(|c| c.contains(needle)).count()
    }
}

impl CommandRunner for RecordingRunner {
    fn run(&self, invocation: &Invocation) -> Result<(), CommandError> {
        self.calls.borrow_mut().push(invocation.clone());
        let rendered = invocation.to_string();

        if self.fail_on.iter().any(|n| rendered.contains(n.as_str())) {
            return Err(CommandError::Exit {
                command: rendered,
                code: Some(1),
            });
        }

        // pg_dump -Fc -f <path> <db>: leave an artifact behind like the real tool
        if !self.dry_run && invocation.program_name() == "pg_dump" {
            if let Some(i) = invocation.args.iter().position(|a| a == "-f") {
                if let Some(path) = invocation.args.get(i + 1) {
                    std::fs::write(path, b"PGDMP").map_err(|e| CommandError::Spawn {
                        command: rendered.clone(),
                        source: e,
                    })?;
                }
            }
        }
        Ok(())
    }

    fn is_dry_run(&self) -> bool {
        self.dry_run
    }
}
