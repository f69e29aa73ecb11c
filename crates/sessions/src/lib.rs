//! Workflow session lifecycle for ideaflow.
//!
//! Tracks each idea-to-development workflow as a session record, moves it
//! through a fixed state graph, bounds the table by capacity and inactivity,
//! and keeps it on disk across restarts with atomic whole-file rewrites.

pub mod clock;
pub mod error;
pub mod persist;
pub mod record;
pub mod runtime;
pub mod store;
pub mod workflow;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{PersistError, SessionError};
pub use persist::{LoadedTable, SessionFile, StagedWrite};
pub use record::{SessionRecord, SessionSummary, SessionUpdate};
pub use runtime::{spawn_cleanup, CleanupHandle, SessionRuntime};
pub use store::{LoadReport, PersistHealth, SessionStore, StoreStatus};
pub use workflow::{TransitionTable, UnknownState, WorkflowState};
