//! Transcript Store
//!
//! Append-only persistence for one run directory:
//!
//! ```text
//! <run_dir>/
//!   manifest.json                         written once, before any unit plays
//!   rounds/<condition-slug>/replicate_<r>.jsonl   one writer per unit
//!   units/<condition-slug>/replicate_<r>.json     unit outcome, written when it ends
//!   aggregates.json                       derived, rewritten on recomputation
//! ```
//!
//! Round partitions are never overwritten: opening an existing partition for
//! writing is an error, and appended round indices must increase by one.
//! A partition whose final line lacks its newline was cut off mid-append; the
//! torn line is ignored on read.

mod record;

pub use record::{
    missing_field, PromptLog, RecordContext, ResponseLog, RoundRecord, SeatLogs,
    REQUIRED_MANIFEST_FIELDS, REQUIRED_ROUND_FIELDS, REQUIRED_UNIT_FIELDS,
};

use crate::metrics::AggregateTable;
use crate::orchestrator::{RunManifest, UnitReport};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const MANIFEST_FILE: &str = "manifest.json";
pub const AGGREGATES_FILE: &str = "aggregates.json";
pub const ROUNDS_DIR: &str = "rounds";
pub const UNITS_DIR: &str = "units";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid JSON in {} (line {line:?}): {source}", .path.display())]
    Json {
        path: PathBuf,
        line: Option<usize>,
        #[source]
        source: serde_json::Error,
    },

    #[error("record in {} (line {line:?}) is missing required field `{field}`", .path.display())]
    MissingField {
        path: PathBuf,
        line: Option<usize>,
        field: String,
    },

    #[error("invalid record in {} (line {line:?}): {reason}", .path.display())]
    InvalidRecord {
        path: PathBuf,
        line: Option<usize>,
        reason: String,
    },

    #[error("round out of order in {}: expected index {expected}, found {found}", .path.display())]
    OutOfOrder {
        path: PathBuf,
        expected: usize,
        found: usize,
    },

    #[error("partition {} already exists", .0.display())]
    PartitionExists(PathBuf),

    #[error("manifest {} already exists", .0.display())]
    ManifestExists(PathBuf),

    #[error("no manifest found in {}", .0.display())]
    MissingManifest(PathBuf),
}

fn io_error(path: &Path) -> impl FnOnce(io::Error) -> StoreError + '_ {
    move |source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Filesystem-safe form of a condition name
pub fn condition_slug(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' {
                c.to_ascii_lowercase()
            } else {
                '_'
            }
        })
        .collect()
}

/// Partition path relative to the run directory
pub fn partition_relpath(condition: &str, replicate: usize) -> String {
    format!(
        "{}/{}/replicate_{}.jsonl",
        ROUNDS_DIR,
        condition_slug(condition),
        replicate
    )
}

/// Unit outcome path relative to the run directory
pub fn unit_relpath(condition: &str, replicate: usize) -> String {
    format!(
        "{}/{}/replicate_{}.json",
        UNITS_DIR,
        condition_slug(condition),
        replicate
    )
}

/// One run directory
#[derive(Debug, Clone)]
pub struct TranscriptStore {
    run_dir: PathBuf,
}

impl TranscriptStore {
    /// Create a fresh run directory
    pub fn create(run_dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let run_dir = run_dir.into();
        let manifest = run_dir.join(MANIFEST_FILE);
        if manifest.exists() {
            return Err(StoreError::ManifestExists(manifest));
        }
        let rounds = run_dir.join(ROUNDS_DIR);
        fs::create_dir_all(&rounds).map_err(io_error(&rounds))?;
        Ok(Self { run_dir })
    }

    /// Open an existing run directory, finished or not
    pub fn open(run_dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let run_dir = run_dir.into();
        if !run_dir.join(MANIFEST_FILE).is_file() {
            return Err(StoreError::MissingManifest(run_dir));
        }
        Ok(Self { run_dir })
    }

    pub fn run_dir(&self) -> &Path {
        &self.run_dir
    }

    pub fn partition_path(&self, condition: &str, replicate: usize) -> PathBuf {
        self.run_dir.join(partition_relpath(condition, replicate))
    }

    pub fn has_partition(&self, condition: &str, replicate: usize) -> bool {
        self.partition_path(condition, replicate).is_file()
    }

    // ------------------------------------------------------------------------
    // Rounds
    // ------------------------------------------------------------------------

    /// Open a new partition for appending; fails if it already exists
    pub fn create_partition(&self, condition: &str, replicate: usize) -> Result<PartitionWriter, StoreError> {
        let path = self.partition_path(condition, replicate);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(io_error(parent))?;
        }
        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .map_err(|e| match e.kind() {
                io::ErrorKind::AlreadyExists => StoreError::PartitionExists(path.clone()),
                _ => StoreError::Io {
                    path: path.clone(),
                    source: e,
                },
            })?;

        Ok(PartitionWriter {
            path,
            writer: BufWriter::new(file),
            next_index: 0,
        })
    }

    /// Read and validate every round of a partition, in order
    pub fn read_partition(&self, condition: &str, replicate: usize) -> Result<Vec<RoundRecord>, StoreError> {
        let path = self.partition_path(condition, replicate);
        let text = fs::read_to_string(&path).map_err(io_error(&path))?;
        let mut records = Vec::new();

        for (i, line) in text.split_inclusive('\n').enumerate() {
            let line_no = Some(i + 1);
            let Some(line) = line.strip_suffix('\n') else {
                log::warn!(
                    "ignoring torn final line {} of {}",
                    i + 1,
                    path.display()
                );
                break;
            };
            if line.trim().is_empty() {
                continue;
            }

            let record: RoundRecord = parse_checked(&path, line_no, line, REQUIRED_ROUND_FIELDS)?;
            record.check().map_err(|reason| StoreError::InvalidRecord {
                path: path.clone(),
                line: line_no,
                reason,
            })?;
            if record.condition != condition || record.replicate != replicate {
                return Err(StoreError::InvalidRecord {
                    path: path.clone(),
                    line: line_no,
                    reason: format!(
                        "record belongs to ({}, {}), not ({}, {})",
                        record.condition, record.replicate, condition, replicate
                    ),
                });
            }
            if record.round_index != records.len() {
                return Err(StoreError::OutOfOrder {
                    path: path.clone(),
                    expected: records.len(),
                    found: record.round_index,
                });
            }
            records.push(record);
        }

        Ok(records)
    }

    // ------------------------------------------------------------------------
    // Unit outcomes
    // ------------------------------------------------------------------------

    /// Record how a unit ended
    pub fn write_unit_report(&self, report: &UnitReport) -> Result<(), StoreError> {
        let path = self
            .run_dir
            .join(unit_relpath(&report.condition, report.replicate));
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(io_error(parent))?;
        }
        write_json_atomic(&path, report)
    }

    /// The recorded outcome of a unit, or `None` if it never ended
    pub fn read_unit_report(&self, condition: &str, replicate: usize) -> Result<Option<UnitReport>, StoreError> {
        let path = self.run_dir.join(unit_relpath(condition, replicate));
        let text = match fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(io_error(&path)(e)),
        };
        parse_checked(&path, None, &text, REQUIRED_UNIT_FIELDS).map(Some)
    }

    // ------------------------------------------------------------------------
    // Manifest and aggregates
    // ------------------------------------------------------------------------

    /// Write the manifest; a run directory gets exactly one
    pub fn write_manifest(&self, manifest: &RunManifest) -> Result<(), StoreError> {
        let path = self.run_dir.join(MANIFEST_FILE);
        if path.exists() {
            return Err(StoreError::ManifestExists(path));
        }
        write_json_atomic(&path, manifest)
    }

    pub fn read_manifest(&self) -> Result<RunManifest, StoreError> {
        let path = self.run_dir.join(MANIFEST_FILE);
        let text = fs::read_to_string(&path).map_err(io_error(&path))?;
        parse_checked(&path, None, &text, REQUIRED_MANIFEST_FIELDS)
    }

    /// Replace the aggregate table
    pub fn write_aggregates(&self, table: &AggregateTable) -> Result<(), StoreError> {
        write_json_atomic(&self.run_dir.join(AGGREGATES_FILE), table)
    }

    pub fn read_aggregates(&self) -> Result<AggregateTable, StoreError> {
        let path = self.run_dir.join(AGGREGATES_FILE);
        let text = fs::read_to_string(&path).map_err(io_error(&path))?;
        serde_json::from_str(&text).map_err(|source| StoreError::Json {
            path,
            line: None,
            source,
        })
    }
}

/// Append-only writer for one (condition, replicate) partition
#[derive(Debug)]
pub struct PartitionWriter {
    path: PathBuf,
    writer: BufWriter<File>,
    next_index: usize,
}

impl PartitionWriter {
    /// Append one record and flush it to disk
    pub fn append(&mut self, record: &RoundRecord) -> Result<(), StoreError> {
        if record.round_index != self.next_index {
            return Err(StoreError::OutOfOrder {
                path: self.path.clone(),
                expected: self.next_index,
                found: record.round_index,
            });
        }

        serde_json::to_writer(&mut self.writer, record).map_err(|source| StoreError::Json {
            path: self.path.clone(),
            line: Some(self.next_index + 1),
            source,
        })?;
        self.writer.write_all(b"\n").map_err(io_error(&self.path))?;
        self.writer.flush().map_err(io_error(&self.path))?;

        self.next_index += 1;
        Ok(())
    }

    /// Flush and close; returns the number of rounds written
    pub fn finish(mut self) -> Result<usize, StoreError> {
        self.writer.flush().map_err(io_error(&self.path))?;
        Ok(self.next_index)
    }
}

fn parse_checked<T: DeserializeOwned>(
    path: &Path,
    line: Option<usize>,
    text: &str,
    required: &[&str],
) -> Result<T, StoreError> {
    let json_error = |source| StoreError::Json {
        path: path.to_path_buf(),
        line,
        source,
    };
    let value: serde_json::Value = serde_json::from_str(text).map_err(json_error)?;
    if let Some(field) = missing_field(&value, required) {
        return Err(StoreError::MissingField {
            path: path.to_path_buf(),
            line,
            field: field.to_string(),
        });
    }
    serde_json::from_value(value).map_err(json_error)
}

/// Write pretty JSON to a temporary sibling, then rename into place
fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<(), StoreError> {
    let mut json = serde_json::to_string_pretty(value).map_err(|source| StoreError::Json {
        path: path.to_path_buf(),
        line: None,
        source,
    })?;
    json.push('\n');

    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, json).map_err(io_error(&tmp))?;
    fs::rename(&tmp, path).map_err(io_error(path))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_condition_slug() {
        assert_eq!(condition_slug("TFT_vs_ALLD"), "tft_vs_alld");
        assert_eq!(condition_slug("llm / persona:kind"), "llm___persona_kind");
        assert_eq!(condition_slug("a-b"), "a-b");
    }

    #[test]
    fn test_partition_relpath() {
        assert_eq!(
            partition_relpath("GRIM vs WSLS", 3),
            "rounds/grim_vs_wsls/replicate_3.jsonl"
        );
        assert_eq!(unit_relpath("GRIM vs WSLS", 3), "units/grim_vs_wsls/replicate_3.json");
    }
}
