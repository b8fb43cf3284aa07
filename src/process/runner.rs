//! External command execution.
//!
//! Every side effect of a build (gradle tasks, PostgreSQL client tools) goes
//! through a [`CommandRunner`]. Dry-run lives here and only here: callers
//! make the same calls in the same order either way.

use crate::models::DatabaseProfile;
use std::fmt;
use std::path::PathBuf;
use std::process::Command;
use thiserror::Error;
use tracing::{debug, info};

/// A fully described external command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: PathBuf,
    pub args: Vec<String>,
    /// Connection environment for database tools
    pub database: Option<DatabaseProfile>,
}

impl Invocation {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            database: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Run against `db`, passing its connection details through the environment.
    pub fn on_database(mut self, db: &DatabaseProfile) -> Self {
        self.database = Some(db.clone());
        self
    }

    /// Program file name, e.g. `pg_dump` or `gradlew`.
    pub fn program_name(&self) -> String {
        self.program
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.program.display().to_string())
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program.display())?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// Failure of a single external command.
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("failed to spawn `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("`{command}` exited with {}", exit_description(.code))]
    Exit { command: String, code: Option<i32> },
}

fn exit_description(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("status {code}"),
        None => "no status (killed by signal)".to_string(),
    }
}

/// Executes external commands, one at a time, blocking until each exits.
pub trait CommandRunner {
    /// Run `invocation` to completion; `Ok` only on a zero exit status.
    fn run(&self, invocation: &Invocation) -> Result<(), CommandError>;

    /// True when commands are logged but not executed.
    fn is_dry_run(&self) -> bool;
}

/// Runs commands as child processes of this one.
#[derive(Debug, Clone, Default)]
pub struct ProcessRunner {
    dry_run: bool,
}

impl ProcessRunner {
    pub fn new(dry_run: bool) -> Self {
        Self { dry_run }
    }
}

impl CommandRunner for ProcessRunner {
    fn run(&self, invocation: &Invocation) -> Result<(), CommandError> {
        if self.dry_run {
            info!(command = %invocation, "[dry-run] not executing");
            return Ok(());
        }

        info!(command = %invocation, "Running");
        let mut command = Command::new(&invocation.program);
        command.args(&invocation.args);
        if let Some(db) = &invocation.database {
            command.envs(db.pg_env());
        }

        let status = command.status().map_err(|e| CommandError::Spawn {
            command: invocation.to_string(),
            source: e,
        })?;

        if !status.success() {
            return Err(CommandError::Exit {
                command: invocation.to_string(),
                code: status.code(),
            });
        }

        debug!(command = %invocation, "Command succeeded");
        Ok(())
    }

    fn is_dry_run(&self) -> bool {
        self.dry_run
    }
}
