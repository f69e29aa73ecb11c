//! Typed failures for the session store and its persistence adapter.

use std::path::PathBuf;

use crate::workflow::WorkflowState;

/// Errors returned to callers of the session store.
///
/// `AtCapacity`, `NotFound` and `IllegalTransition` are the caller's to
/// branch on.  `Persist` only surfaces from [`SessionStore::open`] and an
/// explicit [`SessionStore::flush`]; write failures behind ordinary
/// operations are logged and tracked in the store's persistence health.
///
/// [`SessionStore::open`]: crate::SessionStore::open
/// [`SessionStore::flush`]: crate::SessionStore::flush
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// No room left after the eviction pass.  Retry later.
    #[error("session store is at capacity ({max} live sessions)")]
    AtCapacity { max: usize },

    /// Never existed, expired, or evicted.  The workflow must restart.
    #[error("session not found: {session_id}")]
    NotFound { session_id: String },

    /// The requested state change is not an edge of the workflow graph.
    /// The record is unchanged.
    #[error("illegal transition for session {session_id}: {from} -> {to}")]
    IllegalTransition {
        session_id: String,
        from: WorkflowState,
        to: WorkflowState,
    },

    #[error(transparent)]
    Persist(#[from] PersistError),
}

/// Errors from reading or writing the persisted session table.
#[derive(Debug, thiserror::Error)]
pub enum PersistError {
    #[error("I/O on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("serializing session table: {0}")]
    Serialize(#[from] serde_json::Error),

    /// The file exists but is not a structured session table at all.
    #[error("corrupt session file {}: {reason}", .path.display())]
    Corrupt { path: PathBuf, reason: String },
}

impl PersistError {
    pub(crate) fn io(path: impl Into<PathBuf>) -> impl FnOnce(std::io::Error) -> Self {
        let path = path.into();
        move |source| Self::Io { path, source }
    }
}
