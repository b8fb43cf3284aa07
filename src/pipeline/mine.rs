//! The external operations a build performs on the mine.
//!
//! Each method is one or more blocking external commands and maps a command
//! failure to the build error for that phase. None of them retries.

use crate::checkpoint::CheckpointRecord;
use crate::models::{DatabaseProfile, MineBuildError, MineSettings, Result, Step};
use crate::process::{CommandError, CommandRunner, Invocation};
use std::path::PathBuf;
use tracing::info;

/// Gradle tasks that build an empty mine.
const PREPARE_TASKS: [&str; 3] = ["buildDB", "buildUserDB", "loadDefaultTemplates"];

/// A mine's database and build tooling, driven through a [`CommandRunner`].
pub struct Mine<R> {
    runner: R,
    db: DatabaseProfile,
    gradle: PathBuf,
}

impl<R: CommandRunner> Mine<R> {
    pub fn new(runner: R, db: DatabaseProfile, settings: &MineSettings) -> Self {
        Self {
            runner,
            db,
            gradle: settings.gradle.clone(),
        }
    }

    /// Drop the database if present and create it empty.
    fn recreate_database(&self) -> std::result::Result<(), CommandError> {
        let name = &self.db.name;
        self.runner.run(
            &Invocation::new("dropdb")
                .args(["--if-exists", name.as_str()])
                .on_database(&self.db),
        )?;
        self.runner.run(
            &Invocation::new("createdb")
                .args(["-E", "UTF8", name.as_str()])
                .on_database(&self.db),
        )
    }

    /// Fresh-start preparation: empty database, schema, user DB and templates.
    pub fn prepare_fresh(&self) -> Result<()> {
        info!(database = %self.db.name, "Preparing a fresh mine database");
        self.recreate_database()
            .map_err(MineBuildError::PreparationFailure)?;

        for task in PREPARE_TASKS {
            self.runner
                .run(&Invocation::new(&self.gradle).arg(task))
                .map_err(MineBuildError::PreparationFailure)?;
        }
        Ok(())
    }

    /// Replace the database with the contents of `checkpoint`.
    ///
    /// Anything applied after the checkpoint was taken is discarded.
    pub fn restore(&self, checkpoint: &CheckpointRecord) -> Result<()> {
        info!(checkpoint = %checkpoint.path.display(), "Restoring from last found checkpoint");
        let restore_failure = |source: CommandError| MineBuildError::RestoreFailure {
            checkpoint: checkpoint.path.clone(),
            source,
        };

        self.recreate_database().map_err(restore_failure)?;
        self.runner
            .run(
                &Invocation::new("pg_restore")
                    .args(["-1", "-d", self.db.name.as_str()])
                    .arg(checkpoint.path.to_string_lossy())
                    .on_database(&self.db),
            )
            .map_err(restore_failure)
    }

    /// Load one source into the mine.
    pub fn integrate(&self, step: &Step) -> Result<()> {
        let invocation = Invocation::new(&self.gradle)
            .arg("integrate")
            .arg(format!("-Psource={}", step.name))
            .arg("--no-daemon")
            .args(step.params.iter().map(|(k, v)| format!("-P{k}={v}")));

        self.runner
            .run(&invocation)
            .map_err(|source| MineBuildError::IntegrationFailure {
                step: step.name.clone(),
                source,
            })
    }

    /// The global post-processing stage that follows all sources.
    pub fn postprocess(&self) -> Result<()> {
        self.runner
            .run(
                &Invocation::new(&self.gradle)
                    .arg("postprocess")
                    .arg("--no-daemon"),
            )
            .map_err(MineBuildError::PostProcessFailure)
    }

    pub fn runner(&self) -> &R {
        &self.runner
    }

    pub fn db(&self) -> &DatabaseProfile {
        &self.db
    }
}
