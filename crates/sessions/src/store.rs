//! Workflow session store.
//!
//! Owns the session table behind a single lock, enforces the transition
//! table, the capacity bound and the inactivity timeout, and writes the
//! table through [`SessionFile`] after every mutation.
//!
//! Writes happen after the table lock is released.  Every mutation bumps a
//! generation counter; the writer remembers the last generation it put on
//! disk and never writes an older snapshot over a newer one.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use rand::rngs::OsRng;
use rand::RngCore;
use serde::Serialize;

use ideaflow_domain::config::SessionsConfig;
use ideaflow_domain::trace::TraceEvent;

use crate::clock::{Clock, SystemClock};
use crate::error::{PersistError, SessionError};
use crate::persist::SessionFile;
use crate::record::{SessionRecord, SessionSummary, SessionUpdate};
use crate::workflow::TransitionTable;

/// Random bytes behind every session id.
const SESSION_ID_BYTES: usize = 32;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Reports
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// What happened when the store loaded its file at startup.
#[derive(Debug, Clone, Default, Serialize)]
pub struct LoadReport {
    pub loaded: usize,
    pub dropped: usize,
    /// Oldest sessions discarded because the file held more than
    /// `max_sessions`.
    pub trimmed: usize,
    pub corrupt: bool,
    pub corrupt_backup: Option<PathBuf>,
}

/// Health of the write path.  Degraded while the latest write failed.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PersistHealth {
    pub consecutive_failures: u32,
    pub total_failures: u64,
    pub last_error: Option<String>,
    pub last_success_at: Option<DateTime<Utc>>,
}

impl PersistHealth {
    pub fn is_degraded(&self) -> bool {
        self.consecutive_failures > 0
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StoreStatus {
    pub sessions: usize,
    pub max_sessions: usize,
    pub path: PathBuf,
    pub persistence: PersistHealth,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Session store
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy)]
struct Limits {
    timeout: Duration,
    max_sessions: usize,
    max_evictions_per_call: usize,
}

impl Limits {
    fn from_config(config: &SessionsConfig) -> Self {
        Self {
            timeout: Duration::minutes(i64::from(config.timeout_minutes)),
            max_sessions: config.max_sessions,
            max_evictions_per_call: config.max_evictions_per_call,
        }
    }
}

struct SessionTable {
    sessions: HashMap<String, SessionRecord>,
    /// Bumped on every change, including activity-only touches.
    generation: u64,
}

impl SessionTable {
    fn snapshot(&self) -> Vec<SessionRecord> {
        let mut records: Vec<SessionRecord> = self.sessions.values().cloned().collect();
        records.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        records
    }
}

struct WriterState {
    written_generation: u64,
    health: PersistHealth,
}

/// In-process store of workflow sessions backed by a JSON file.
///
/// The file is loaded inside [`open`](Self::open), so a store value only
/// exists once its persisted sessions are in memory.  Dropping the store
/// writes any changes still pending.
pub struct SessionStore {
    table: Mutex<SessionTable>,
    writer: Mutex<WriterState>,
    file: SessionFile,
    transitions: TransitionTable,
    clock: Arc<dyn Clock>,
    limits: Limits,
    load_report: LoadReport,
}

impl SessionStore {
    /// Load the store from `config.sessions_file()` with the standard
    /// workflow and the system clock.
    pub fn open(config: &SessionsConfig) -> Result<Self, SessionError> {
        Self::open_with(config, TransitionTable::standard(), Arc::new(SystemClock))
    }

    /// Load the store with an explicit transition table and clock.
    ///
    /// A file that cannot be parsed at all is moved aside and the store
    /// starts empty.  Any other read failure is returned: starting empty
    /// would overwrite the real table on the next save.
    pub fn open_with(
        config: &SessionsConfig,
        transitions: TransitionTable,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, SessionError> {
        let file = SessionFile::new(config.sessions_file());
        let limits = Limits::from_config(config);
        let mut report = LoadReport::default();

        let mut records = match file.load() {
            Ok(table) => {
                report.dropped = table.dropped;
                table.records
            }
            Err(PersistError::Corrupt { path, reason }) => {
                report.corrupt = true;
                let backup = match file.quarantine(clock.now()) {
                    Ok(backup) => Some(backup),
                    Err(e) => {
                        tracing::warn!(error = %e, "could not move corrupt session file aside");
                        None
                    }
                };
                TraceEvent::StoreCorrupt {
                    path: path.display().to_string(),
                    reason,
                    backup: backup.as_ref().map(|b| b.display().to_string()),
                }
                .emit();
                report.corrupt_backup = backup;
                Vec::new()
            }
            Err(e) => return Err(e.into()),
        };

        if records.len() > limits.max_sessions {
            records.sort_by(|a, b| b.last_activity.cmp(&a.last_activity));
            report.trimmed = records.split_off(limits.max_sessions).len();
            tracing::warn!(
                trimmed = report.trimmed,
                max_sessions = limits.max_sessions,
                "persisted sessions exceed capacity, dropping the least recently active"
            );
        }

        let sessions: HashMap<String, SessionRecord> =
            records.into_iter().map(|r| (r.id.clone(), r)).collect();
        report.loaded = sessions.len();

        TraceEvent::StoreLoaded {
            path: file.path().display().to_string(),
            loaded: report.loaded,
            dropped: report.dropped,
            trimmed: report.trimmed,
        }
        .emit();

        // Anything dropped or trimmed makes memory differ from disk.
        let generation = u64::from(report.dropped > 0 || report.trimmed > 0);

        Ok(Self {
            table: Mutex::new(SessionTable {
                sessions,
                generation,
            }),
            writer: Mutex::new(WriterState {
                written_generation: 0,
                health: PersistHealth::default(),
            }),
            file,
            transitions,
            clock,
            limits,
            load_report: report,
        })
    }

    // ── Workflow operations ─────────────────────────────────────────

    /// Start a new workflow in the `questioning` state.
    ///
    /// A full table first evicts its least recently active expired sessions.
    /// Fails with [`SessionError::AtCapacity`] when that frees nothing.
    pub fn create_session(&self, user_idea: impl Into<String>) -> Result<SessionRecord, SessionError> {
        let user_idea = user_idea.into();

        let outcome = {
            let mut table = self.table.lock();
            let now = self.clock.now();

            let evicted = if table.sessions.len() >= self.limits.max_sessions {
                self.evict_for_room(&mut table, now)
            } else {
                Vec::new()
            };

            let created = if table.sessions.len() >= self.limits.max_sessions {
                None
            } else {
                let id = loop {
                    let candidate = generate_session_id();
                    if !table.sessions.contains_key(&candidate) {
                        break candidate;
                    }
                };
                let record = SessionRecord::new(id, user_idea, now);
                table.sessions.insert(record.id.clone(), record.clone());
                table.generation += 1;
                Some(record)
            };
            (evicted, created)
        };

        let (evicted, created) = outcome;
        if !evicted.is_empty() {
            tracing::info!(count = evicted.len(), "evicted idle sessions to make room");
            TraceEvent::SessionsEvicted {
                session_ids: evicted.clone(),
            }
            .emit();
        }

        let Some(record) = created else {
            if !evicted.is_empty() {
                self.persist_logged(false);
            }
            tracing::warn!(max_sessions = self.limits.max_sessions, "session store at capacity");
            return Err(SessionError::AtCapacity {
                max: self.limits.max_sessions,
            });
        };

        TraceEvent::SessionCreated {
            session_id: record.id.clone(),
        }
        .emit();
        self.persist_logged(false);
        Ok(record)
    }

    /// Look up a session.  A successful read counts as activity; the new
    /// `lastActivity` is written with the next flush rather than
    /// immediately.
    pub fn get_session(&self, session_id: &str) -> Result<SessionRecord, SessionError> {
        let mut table = self.table.lock();
        let now = self.clock.now();
        let record = self.live_record(&mut table, session_id, now)?;
        record.last_activity = now;
        let snapshot = record.clone();
        table.generation += 1;
        Ok(snapshot)
    }

    /// Merge `update` into a session.
    ///
    /// A requested state change must be an edge of the transition table;
    /// otherwise nothing about the record changes, not even its activity
    /// timestamp.
    pub fn update_session(
        &self,
        session_id: &str,
        update: SessionUpdate,
    ) -> Result<SessionRecord, SessionError> {
        let (record, from) = {
            let mut table = self.table.lock();
            let now = self.clock.now();
            let record = self.live_record(&mut table, session_id, now)?;
            let from = record.state;

            if let Some(to) = update.state {
                if !self.transitions.allows(from, to) {
                    tracing::warn!(
                        session_id = %session_id,
                        from = %from,
                        to = %to,
                        "rejected illegal workflow transition"
                    );
                    return Err(SessionError::IllegalTransition {
                        session_id: session_id.to_owned(),
                        from,
                        to,
                    });
                }
            }

            update.apply(record);
            record.last_activity = now;
            let snapshot = record.clone();
            table.generation += 1;
            (snapshot, from)
        };

        if record.state != from {
            TraceEvent::SessionTransitioned {
                session_id: record.id.clone(),
                from: from.to_string(),
                to: record.state.to_string(),
            }
            .emit();
        }
        self.persist_logged(false);
        Ok(record)
    }

    /// Remove every session idle for longer than the timeout, then flush
    /// the table whether or not anything was removed.  Returns the number
    /// of sessions removed.
    pub fn sweep_expired(&self) -> usize {
        let expired = {
            let mut table = self.table.lock();
            let now = self.clock.now();
            let expired: Vec<String> = table
                .sessions
                .values()
                .filter(|r| self.is_expired(r, now))
                .map(|r| r.id.clone())
                .collect();
            for id in &expired {
                table.sessions.remove(id);
            }
            if !expired.is_empty() {
                table.generation += 1;
            }
            expired
        };

        let removed = expired.len();
        if removed > 0 {
            TraceEvent::SessionsExpired {
                session_ids: expired,
            }
            .emit();
        }
        self.persist_logged(true);
        removed
    }

    /// Drop every session.  Returns how many were removed.
    pub fn reset(&self) -> usize {
        let removed = {
            let mut table = self.table.lock();
            let removed = table.sessions.len();
            table.sessions.clear();
            table.generation += 1;
            removed
        };
        TraceEvent::StoreReset { removed }.emit();
        self.persist_logged(true);
        removed
    }

    // ── Read-only views ─────────────────────────────────────────────

    /// All sessions, oldest first.  Does not count as activity.
    pub fn list(&self) -> Vec<SessionSummary> {
        self.table
            .lock()
            .snapshot()
            .iter()
            .map(SessionRecord::summary)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.table.lock().sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn status(&self) -> StoreStatus {
        let sessions = self.len();
        StoreStatus {
            sessions,
            max_sessions: self.limits.max_sessions,
            path: self.file.path().to_path_buf(),
            persistence: self.writer.lock().health.clone(),
        }
    }

    pub fn load_report(&self) -> &LoadReport {
        &self.load_report
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }

    pub fn transitions(&self) -> &TransitionTable {
        &self.transitions
    }

    // ── Persistence ─────────────────────────────────────────────────

    /// Write the current table to disk now, including activity-only
    /// touches.
    pub fn flush(&self) -> Result<(), PersistError> {
        self.persist(true).map(|_| ())
    }

    /// Returns `Ok(false)` when the snapshot was already on disk.
    fn persist(&self, force: bool) -> Result<bool, PersistError> {
        let (generation, snapshot) = {
            let table = self.table.lock();
            (table.generation, table.snapshot())
        };

        let mut writer = self.writer.lock();
        if writer.written_generation > generation
            || (writer.written_generation == generation && !force)
        {
            return Ok(false);
        }

        match self.file.save(&snapshot) {
            Ok(()) => {
                writer.written_generation = generation;
                writer.health.consecutive_failures = 0;
                writer.health.last_success_at = Some(self.clock.now());
                tracing::debug!(
                    sessions = snapshot.len(),
                    generation,
                    path = %self.file.path().display(),
                    "session table persisted"
                );
                Ok(true)
            }
            Err(e) => {
                writer.health.consecutive_failures += 1;
                writer.health.total_failures += 1;
                writer.health.last_error = Some(e.to_string());
                Err(e)
            }
        }
    }

    /// Persist behind an ordinary operation.  Failures are logged and
    /// tracked in [`PersistHealth`]; the in-memory change stands.
    fn persist_logged(&self, force: bool) {
        if let Err(e) = self.persist(force) {
            let consecutive_failures = self.writer.lock().health.consecutive_failures;
            tracing::warn!(error = %e, consecutive_failures, "session table write failed");
            TraceEvent::PersistFailed {
                path: self.file.path().display().to_string(),
                error: e.to_string(),
                consecutive_failures,
            }
            .emit();
        }
    }

    // ── Internals ───────────────────────────────────────────────────

    fn is_expired(&self, record: &SessionRecord, now: DateTime<Utc>) -> bool {
        record.last_activity < now - self.limits.timeout
    }

    /// Fetch a record for an operation.  A record past its timeout that the
    /// sweep has not reached yet is removed here and reported as missing.
    fn live_record<'t>(
        &self,
        table: &'t mut SessionTable,
        session_id: &str,
        now: DateTime<Utc>,
    ) -> Result<&'t mut SessionRecord, SessionError> {
        let not_found = || SessionError::NotFound {
            session_id: session_id.to_owned(),
        };

        let expired = match table.sessions.get(session_id) {
            Some(record) => self.is_expired(record, now),
            None => return Err(not_found()),
        };
        if expired {
            table.sessions.remove(session_id);
            table.generation += 1;
            tracing::debug!(session_id = %session_id, "session expired on access");
            return Err(not_found());
        }
        table.sessions.get_mut(session_id).ok_or_else(not_found)
    }

    /// Evict expired sessions, least recently active first, until one slot
    /// is free or the per-call cap is reached.  A session that has not
    /// expired is never evicted to make room.
    fn evict_for_room(&self, table: &mut SessionTable, now: DateTime<Utc>) -> Vec<String> {
        let mut candidates: Vec<(DateTime<Utc>, String)> = table
            .sessions
            .values()
            .filter(|r| self.is_expired(r, now))
            .map(|r| (r.last_activity, r.id.clone()))
            .collect();
        candidates.sort();

        let mut evicted = Vec::new();
        for (_, id) in candidates {
            if table.sessions.len() < self.limits.max_sessions
                || evicted.len() >= self.limits.max_evictions_per_call
            {
                break;
            }
            table.sessions.remove(&id);
            evicted.push(id);
        }
        if !evicted.is_empty() {
            table.generation += 1;
        }
        evicted
    }
}

impl Drop for SessionStore {
    /// Write whatever the last implicit save did not cover, such as read
    /// touches.  Failures are only logged; call [`flush`](Self::flush)
    /// first to observe them.
    fn drop(&mut self) {
        self.persist_logged(false);
    }
}

/// `sess_` followed by 64 hex characters from the OS CSPRNG.
fn generate_session_id() -> String {
    let mut bytes = [0u8; SESSION_ID_BYTES];
    OsRng.fill_bytes(&mut bytes);
    format!("sess_{}", hex::encode(bytes))
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
