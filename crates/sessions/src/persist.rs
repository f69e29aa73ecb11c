//! Durable storage for the session table.
//!
//! The whole table lives in one JSON file (an array of records).  Writes
//! go to a uniquely named temp file in the same directory, are fsynced,
//! then renamed over the target, so a reader sees either the previous file
//! or the new one and never a partial write.
//!
//! Loading tolerates damage at two levels: a record that fails validation
//! is dropped and logged while the rest load, and a file that is not a JSON
//! array/object at all is reported as [`PersistError::Corrupt`] for the
//! caller to move aside.

use std::collections::HashSet;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use tempfile::NamedTempFile;

use ideaflow_domain::trace::TraceEvent;

use crate::error::PersistError;
use crate::record::SessionRecord;
use crate::workflow::WorkflowState;

/// Result of a successful [`SessionFile::load`].
#[derive(Debug, Default)]
pub struct LoadedTable {
    pub records: Vec<SessionRecord>,
    /// Records skipped because they failed validation or repeated an id.
    pub dropped: usize,
}

/// Handle on the persisted session table.
#[derive(Debug, Clone)]
pub struct SessionFile {
    path: PathBuf,
}

impl SessionFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn dir(&self) -> &Path {
        match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        }
    }

    // ── Read ────────────────────────────────────────────────────────

    /// Load and validate the table.  A missing or blank file is a cold
    /// start and yields an empty table.
    pub fn load(&self) -> Result<LoadedTable, PersistError> {
        let raw = match std::fs::read(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(LoadedTable::default());
            }
            Err(source) => {
                return Err(PersistError::Io {
                    path: self.path.clone(),
                    source,
                });
            }
        };

        if raw.iter().all(u8::is_ascii_whitespace) {
            return Ok(LoadedTable::default());
        }

        let value: Value = serde_json::from_slice(&raw).map_err(|e| PersistError::Corrupt {
            path: self.path.clone(),
            reason: e.to_string(),
        })?;

        // Older tables were written as an id -> record mapping.
        let entries: Vec<(Option<String>, Value)> = match value {
            Value::Array(items) => items.into_iter().map(|v| (None, v)).collect(),
            Value::Object(map) => map.into_iter().map(|(k, v)| (Some(k), v)).collect(),
            other => {
                return Err(PersistError::Corrupt {
                    path: self.path.clone(),
                    reason: format!("expected an array of sessions, found {}", json_kind(&other)),
                });
            }
        };

        let mut table = LoadedTable::default();
        let mut seen = HashSet::new();
        for (index, (key, value)) in entries.into_iter().enumerate() {
            let reason = match validate_record(key, value) {
                Ok(record) if seen.insert(record.id.clone()) => {
                    table.records.push(record);
                    continue;
                }
                Ok(record) => format!("duplicate session id {}", record.id),
                Err(reason) => reason,
            };
            tracing::warn!(
                path = %self.path.display(),
                index,
                reason = %reason,
                "dropping invalid session record"
            );
            TraceEvent::RecordDropped { index, reason }.emit();
            table.dropped += 1;
        }

        Ok(table)
    }

    // ── Write ───────────────────────────────────────────────────────

    /// Atomically replace the file with `records`.
    pub fn save(&self, records: &[SessionRecord]) -> Result<(), PersistError> {
        self.stage(records)?.commit()
    }

    /// Write `records` to a synced temp file next to the target without
    /// touching the target yet.
    pub fn stage(&self, records: &[SessionRecord]) -> Result<StagedWrite, PersistError> {
        let dir = self.dir();
        std::fs::create_dir_all(dir).map_err(PersistError::io(dir))?;

        let json = serde_json::to_vec_pretty(records)?;

        let file_name = self.file_name();
        let mut tmp = tempfile::Builder::new()
            .prefix(&format!(".{file_name}."))
            .suffix(".tmp")
            .tempfile_in(dir)
            .map_err(PersistError::io(dir))?;
        tmp.write_all(&json)
            .and_then(|()| tmp.as_file().sync_all())
            .map_err(PersistError::io(tmp.path()))?;

        Ok(StagedWrite {
            tmp,
            target: self.path.clone(),
        })
    }

    /// Move a file that failed to parse out of the way so the next save
    /// does not destroy it.  Returns the backup path.
    ///
    /// The backup name is reserved by creating it first, so two corrupt
    /// loads within the same second keep both files.
    pub fn quarantine(&self, now: DateTime<Utc>) -> Result<PathBuf, PersistError> {
        let dir = self.dir();
        let prefix = format!("{}.corrupt-{}-", self.file_name(), now.format("%Y%m%dT%H%M%SZ"));
        let (_, backup) = tempfile::Builder::new()
            .prefix(&prefix)
            .rand_bytes(6)
            .tempfile_in(dir)
            .map_err(PersistError::io(dir))?
            .keep()
            .map_err(|e| PersistError::Io {
                path: dir.to_path_buf(),
                source: e.error,
            })?;

        if let Err(source) = std::fs::rename(&self.path, &backup) {
            let _ = std::fs::remove_file(&backup);
            return Err(PersistError::Io {
                path: self.path.clone(),
                source,
            });
        }
        Ok(backup)
    }

    fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "sessions.json".into())
    }
}

/// A fully written temp file waiting to be renamed over the target.
///
/// Dropping it without [`commit`](Self::commit) deletes the temp file and
/// leaves the target exactly as it was.
#[derive(Debug)]
pub struct StagedWrite {
    tmp: NamedTempFile,
    target: PathBuf,
}

impl StagedWrite {
    pub fn temp_path(&self) -> &Path {
        self.tmp.path()
    }

    pub fn commit(self) -> Result<(), PersistError> {
        let target = self.target;
        self.tmp
            .persist(&target)
            .map_err(|e| PersistError::Io {
                path: target.clone(),
                source: e.error,
            })?;
        sync_parent_dir(&target);
        Ok(())
    }
}

/// Make the rename itself durable.  Best effort: not every platform lets
/// a directory be opened for syncing.
#[cfg(unix)]
fn sync_parent_dir(target: &Path) {
    let Some(dir) = target.parent().filter(|p| !p.as_os_str().is_empty()) else {
        return;
    };
    if let Err(e) = std::fs::File::open(dir).and_then(|d| d.sync_all()) {
        tracing::debug!(dir = %dir.display(), error = %e, "directory fsync failed");
    }
}

#[cfg(not(unix))]
fn sync_parent_dir(_target: &Path) {}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Record validation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Check the generic record shape before deserializing, so the drop
/// reason in the log names the actual problem.
fn validate_record(key: Option<String>, value: Value) -> Result<SessionRecord, String> {
    let mut obj = match value {
        Value::Object(obj) => obj,
        other => return Err(format!("record is {}, not an object", json_kind(&other))),
    };
    if let Some(key) = key {
        obj.entry("id").or_insert(Value::String(key));
    }

    match obj.get("id") {
        Some(Value::String(id)) if !id.trim().is_empty() => {}
        Some(Value::String(_)) => return Err("empty id".into()),
        _ => return Err("missing id".into()),
    }

    let state = str_field(&obj, "state")?;
    state
        .parse::<WorkflowState>()
        .map_err(|e| e.to_string())?;

    for field in ["createdAt", "lastActivity"] {
        let raw = str_field(&obj, field)?;
        DateTime::parse_from_rfc3339(raw).map_err(|e| format!("{field}: {e}"))?;
    }

    serde_json::from_value(Value::Object(obj)).map_err(|e| e.to_string())
}

fn str_field<'a>(obj: &'a Map<String, Value>, field: &str) -> Result<&'a str, String> {
    match obj.get(field) {
        Some(Value::String(s)) => Ok(s),
        Some(other) => Err(format!("{field} is {}, expected a string", json_kind(other))),
        None => Err(format!("missing {field}")),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
