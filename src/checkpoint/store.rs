//! Checkpoint discovery and creation in a checkpoint directory.
//!
//! The directory is the only record of past checkpoints. Nothing is cached
//! between calls because checkpoints are usually left behind by an earlier,
//! already-terminated process.
//!
//! No lock is taken on the directory. Two builds sharing a checkpoint
//! directory (or a database) are not supported.

use super::{CHECKPOINT_EXTENSION, CheckpointRecord};
use crate::models::{CheckpointWriteError, DatabaseProfile, MineBuildError, Result};
use crate::process::{CommandRunner, Invocation};
use chrono::{NaiveDateTime, Utc};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Suffix for a dump that is still being written.
const PARTIAL_SUFFIX: &str = "partial";

/// Checkpoint artifacts in one directory.
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    dir: PathBuf,
}

impl CheckpointStore {
    /// Open an existing checkpoint directory. The directory is never created here.
    pub fn open(dir: &Path) -> Result<Self> {
        if !dir.is_dir() {
            return Err(MineBuildError::MissingCheckpointDir(dir.to_path_buf()));
        }
        Ok(Self {
            dir: dir.to_path_buf(),
        })
    }

    /// All checkpoints in the directory, oldest first.
    ///
    /// Any `*.dump` file that does not follow the naming convention, or two
    /// artifacts claiming the same ordinal, make the directory unusable.
    pub fn list(&self) -> Result<Vec<CheckpointRecord>> {
        let pattern = format!(
            "{}/*.{CHECKPOINT_EXTENSION}",
            glob::Pattern::escape(&self.dir.to_string_lossy())
        );

        let paths = glob::glob(&pattern)
            .map_err(|e| MineBuildError::Internal(format!("Invalid glob pattern: {e}")))?;

        let mut records = Vec::new();
        for entry in paths {
            let path = entry.map_err(|e| {
                let context = format!("scanning {}", e.path().display());
                MineBuildError::io(context, io::Error::from(e))
            })?;
            if !path.is_file() {
                continue;
            }
            records.push(CheckpointRecord::from_path(&path)?);
        }

        records.sort();
        if let Some(pair) = records.windows(2).find(|w| w[0].ordinal == w[1].ordinal) {
            return Err(MineBuildError::malformed(
                pair[1].identifier(),
                format!("ordinal {} is also used by {}", pair[1].ordinal, pair[0].identifier()),
            ));
        }

        debug!(dir = %self.dir.display(), count = records.len(), "Scanned checkpoints");
        Ok(records)
    }

    /// The checkpoint with the highest ordinal, if any.
    pub fn find_latest(&self) -> Result<Option<CheckpointRecord>> {
        Ok(self.list()?.pop())
    }

    /// Ordinal for the checkpoint that follows `latest`.
    ///
    /// Fails when `latest` already holds the largest representable ordinal.
    pub fn next_ordinal(latest: Option<&CheckpointRecord>) -> Result<u32> {
        let Some(record) = latest else {
            return Ok(0);
        };
        record.ordinal.checked_add(1).ok_or_else(|| {
            MineBuildError::malformed(record.identifier(), "no ordinal left after this checkpoint")
        })
    }

    /// Dump the database into a new checkpoint taken after `step`.
    ///
    /// The dump is written under a temporary name and renamed into place on
    /// success, so an interrupted or failed dump never looks like a checkpoint.
    /// In dry-run nothing is written but the record is still returned.
    pub fn create<R: CommandRunner>(
        &self,
        runner: &R,
        db: &DatabaseProfile,
        ordinal: u32,
        step: &str,
    ) -> Result<CheckpointRecord> {
        self.create_at(runner, db, ordinal, step, Utc::now().naive_utc())
    }

    fn create_at<R: CommandRunner>(
        &self,
        runner: &R,
        db: &DatabaseProfile,
        ordinal: u32,
        step: &str,
        taken_at: NaiveDateTime,
    ) -> Result<CheckpointRecord> {
        let record = CheckpointRecord::new(&self.dir, ordinal, taken_at, step);
        let partial = partial_path(&record.path);
        let write_failure = |source: CheckpointWriteError| {
            remove_partial(&partial);
            MineBuildError::CheckpointWrite {
                step: step.to_string(),
                source,
            }
        };

        let dump = Invocation::new("pg_dump")
            .args(["-Fc", "-f"])
            .arg(partial.to_string_lossy())
            .arg(&db.name)
            .on_database(db);

        runner
            .run(&dump)
            .map_err(|e| write_failure(CheckpointWriteError::Dump(e)))?;

        if !runner.is_dry_run() {
            fs::rename(&partial, &record.path).map_err(|source| {
                write_failure(CheckpointWriteError::Rename {
                    from: partial.clone(),
                    source,
                })
            })?;
        }

        info!(
            checkpoint = %record.identifier(),
            ordinal,
            step,
            "Checkpoint written"
        );
        Ok(record)
    }
}

fn remove_partial(partial: &Path) {
    if partial.exists() {
        if let Err(e) = fs::remove_file(partial) {
            warn!(path = %partial.display(), error = %e, "Could not remove partial dump");
        }
    }
}

fn partial_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".");
    name.push(PARTIAL_SUFFIX);
    PathBuf::from(name)
}
