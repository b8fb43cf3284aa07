//! Checkpoint records and the artifact naming convention.
//!
//! An artifact is named `<ordinal>-<timestamp>-<step>.dump`:
//! - ordinal: zero-padded counter, one higher than the previous checkpoint
//! - timestamp: UTC, `%Y%m%d%H%M%S`
//! - step: the source after which the dump was taken
//!
//! The name carries everything needed to resume, so a checkpoint directory
//! can be copied to another machine without any side index.

use crate::models::{FIELD_DELIMITER, MineBuildError, Result};
use chrono::{NaiveDateTime, Timelike};
use serde::Serialize;
use std::cmp::Ordering;
use std::path::{Path, PathBuf};

/// File extension of checkpoint artifacts.
pub const CHECKPOINT_EXTENSION: &str = "dump";

/// Timestamp layout inside checkpoint identifiers.
pub const TIMESTAMP_FORMAT: &str = "%Y%m%d%H%M%S";

/// One persisted database dump.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckpointRecord {
    /// Position in the checkpoint sequence
    pub ordinal: u32,
    /// When the dump was started (UTC)
    pub taken_at: NaiveDateTime,
    /// Step after which the dump was taken
    pub step: String,
    /// Location of the dump artifact
    pub path: PathBuf,
}

impl CheckpointRecord {
    /// Build the record for a new artifact in `dir`.
    pub fn new(dir: &Path, ordinal: u32, taken_at: NaiveDateTime, step: &str) -> Self {
        let taken_at = truncate_to_seconds(taken_at);
        let file_name = format!(
            "{ordinal:04}{d}{}{d}{step}.{CHECKPOINT_EXTENSION}",
            taken_at.format(TIMESTAMP_FORMAT),
            d = FIELD_DELIMITER,
        );
        Self {
            ordinal,
            taken_at,
            step: step.to_string(),
            path: dir.join(file_name),
        }
    }

    /// Interpret an artifact path according to the naming convention.
    pub fn from_path(path: &Path) -> Result<Self> {
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| MineBuildError::malformed(path.display().to_string(), "not UTF-8"))?;

        let (ordinal, taken_at, step) = parse_identifier(file_name)?;
        Ok(Self {
            ordinal,
            taken_at,
            step,
            path: path.to_path_buf(),
        })
    }

    /// The artifact's file name, e.g. `0001-20240101120000-uniprot.dump`.
    pub fn identifier(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

impl Ord for CheckpointRecord {
    fn cmp(&self, other: &Self) -> Ordering {
        self.ordinal
            .cmp(&other.ordinal)
            .then_with(|| self.taken_at.cmp(&other.taken_at))
            .then_with(|| self.step.cmp(&other.step))
            .then_with(|| self.path.cmp(&other.path))
    }
}

impl PartialOrd for CheckpointRecord {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Extract the step name from a checkpoint identifier.
///
/// Accepts the bare file name, with or without the `.dump` extension.
pub fn step_name_of(identifier: &str) -> Result<String> {
    parse_identifier(identifier).map(|(_, _, step)| step)
}

fn parse_identifier(identifier: &str) -> Result<(u32, NaiveDateTime, String)> {
    let stem = identifier
        .strip_suffix(CHECKPOINT_EXTENSION)
        .and_then(|s| s.strip_suffix('.'))
        .unwrap_or(identifier);

    let fields: Vec<&str> = stem.split(FIELD_DELIMITER).collect();
    let &[ordinal, timestamp, step] = fields.as_slice() else {
        return Err(MineBuildError::malformed(
            identifier,
            format!(
                "expected 3 '{FIELD_DELIMITER}'-separated fields, found {}",
                fields.len()
            ),
        ));
    };

    if ordinal.is_empty() || !ordinal.bytes().all(|b| b.is_ascii_digit()) {
        return Err(MineBuildError::malformed(
            identifier,
            format!("ordinal '{ordinal}' is not a number"),
        ));
    }
    let ordinal = ordinal
        .parse::<u32>()
        .map_err(|e| MineBuildError::malformed(identifier, format!("ordinal out of range: {e}")))?;

    let taken_at = NaiveDateTime::parse_from_str(timestamp, TIMESTAMP_FORMAT).map_err(|e| {
        MineBuildError::malformed(identifier, format!("bad timestamp '{timestamp}': {e}"))
    })?;

    if step.is_empty() {
        return Err(MineBuildError::malformed(identifier, "empty step name"));
    }

    Ok((ordinal, taken_at, step.to_string()))
}

// Identifiers have second resolution.
fn truncate_to_seconds(t: NaiveDateTime) -> NaiveDateTime {
    t.with_nanosecond(0).unwrap_or(t)
}
