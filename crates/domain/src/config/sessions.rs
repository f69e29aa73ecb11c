use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Session store
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Limits and storage location for the workflow session store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionsConfig {
    /// Directory holding the persisted session table.
    #[serde(default = "d_state_path")]
    pub state_path: PathBuf,

    /// File name of the session table inside `state_path`.
    #[serde(default = "d_file_name")]
    pub file_name: String,

    /// A session idle for longer than this many minutes is expired.
    #[serde(default = "d_timeout_minutes")]
    pub timeout_minutes: u32,

    /// How often the background sweep removes expired sessions.
    #[serde(default = "d_cleanup_interval_secs")]
    pub cleanup_interval_secs: u32,

    /// Hard cap on live sessions.
    #[serde(default = "d_max_sessions")]
    pub max_sessions: usize,

    /// Upper bound on sessions evicted by a single `create`, so a full
    /// table never turns one call into a long pause.
    #[serde(default = "d_max_evictions_per_call")]
    pub max_evictions_per_call: usize,
}

impl Default for SessionsConfig {
    fn default() -> Self {
        Self {
            state_path: d_state_path(),
            file_name: d_file_name(),
            timeout_minutes: d_timeout_minutes(),
            cleanup_interval_secs: d_cleanup_interval_secs(),
            max_sessions: d_max_sessions(),
            max_evictions_per_call: d_max_evictions_per_call(),
        }
    }
}

impl SessionsConfig {
    /// Full path of the persisted session table.
    pub fn sessions_file(&self) -> PathBuf {
        self.state_path.join(&self.file_name)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(u64::from(self.timeout_minutes) * 60)
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(u64::from(self.cleanup_interval_secs))
    }
}

// ── serde default helpers ───────────────────────────────────────────

fn d_state_path() -> PathBuf {
    PathBuf::from("./data")
}
fn d_file_name() -> String {
    "sessions.json".into()
}
fn d_timeout_minutes() -> u32 {
    30
}
fn d_cleanup_interval_secs() -> u32 {
    300
}
fn d_max_sessions() -> usize {
    100
}
fn d_max_evictions_per_call() -> usize {
    10
}
