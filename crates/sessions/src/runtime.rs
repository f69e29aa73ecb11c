//! Background expiry sweep and orderly shutdown.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::{JoinError, JoinHandle};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use ideaflow_domain::config::SessionsConfig;

use crate::error::{PersistError, SessionError};
use crate::store::SessionStore;

/// Handle to a running cleanup task.
pub struct CleanupHandle {
    shutdown: CancellationToken,
    task: JoinHandle<()>,
}

impl CleanupHandle {
    /// Cancel the task and wait for an in-flight sweep to finish.
    pub async fn stop(self) {
        self.shutdown.cancel();
        if let Err(e) = self.task.await {
            tracing::warn!(error = %e, "session cleanup task ended abnormally");
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

/// Sweep expired sessions every `every` until `shutdown` is cancelled.
///
/// The sweep does file I/O, so it runs on the blocking pool.  Ticks missed
/// while a sweep is running are not made up.
pub fn spawn_cleanup(
    store: Arc<SessionStore>,
    every: Duration,
    shutdown: CancellationToken,
) -> CleanupHandle {
    let token = shutdown.clone();
    let task = tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = token.cancelled() => {
                    tracing::debug!("session cleanup stopping");
                    break;
                }
                _ = interval.tick() => {}
            }

            let store = store.clone();
            match tokio::task::spawn_blocking(move || store.sweep_expired()).await {
                Ok(0) => {}
                Ok(removed) => tracing::info!(removed, "expired sessions swept"),
                Err(e) => tracing::warn!(error = %e, "session sweep panicked"),
            }
        }
    });
    CleanupHandle { shutdown, task }
}

/// A session store together with its cleanup task.
pub struct SessionRuntime {
    store: Arc<SessionStore>,
    cleanup: CleanupHandle,
}

impl SessionRuntime {
    /// Load the store and start sweeping at `config.cleanup_interval()`.
    /// Must be called from within a tokio runtime.
    pub fn start(config: &SessionsConfig) -> Result<Self, SessionError> {
        let store = Arc::new(SessionStore::open(config)?);
        Ok(Self::new(store, config.cleanup_interval()))
    }

    pub fn new(store: Arc<SessionStore>, cleanup_interval: Duration) -> Self {
        let cleanup = spawn_cleanup(store.clone(), cleanup_interval, CancellationToken::new());
        tracing::info!(
            path = %store.path().display(),
            sessions = store.len(),
            interval_secs = cleanup_interval.as_secs(),
            "session runtime started"
        );
        Self { store, cleanup }
    }

    pub fn store(&self) -> &Arc<SessionStore> {
        &self.store
    }

    /// Stop the sweeper, then write the table one last time so activity
    /// touches since the last write are not lost.
    pub async fn shutdown(self) -> Result<(), PersistError> {
        self.cleanup.stop().await;
        let path = self.store.path().to_path_buf();
        let store = self.store;
        let flushed = tokio::task::spawn_blocking(move || store.flush()).await;
        final_flush_result(flushed, path)
    }
}

/// A flush task that never finished is a failed flush.
fn final_flush_result(
    flushed: Result<Result<(), PersistError>, JoinError>,
    path: PathBuf,
) -> Result<(), PersistError> {
    flushed.unwrap_or_else(|e| {
        tracing::error!(error = %e, "final session flush did not complete");
        Err(PersistError::Io {
            path,
            source: std::io::Error::new(std::io::ErrorKind::Other, e.to_string()),
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::persist::SessionFile;
    use crate::workflow::TransitionTable;

    fn store_in(dir: &std::path::Path) -> (Arc<SessionStore>, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::default());
        let config = SessionsConfig {
            state_path: dir.to_path_buf(),
            ..Default::default()
        };
        let store =
            SessionStore::open_with(&config, TransitionTable::standard(), clock.clone()).unwrap();
        (Arc::new(store), clock)
    }

    #[tokio::test]
    async fn cleanup_task_removes_expired_sessions() {
        let dir = tempfile::tempdir().unwrap();
        let (store, clock) = store_in(dir.path());
        store.create_session("a").unwrap();
        store.create_session("b").unwrap();
        clock.advance(chrono::Duration::minutes(31));

        let handle = spawn_cleanup(
            store.clone(),
            Duration::from_millis(10),
            CancellationToken::new(),
        );

        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        while !store.is_empty() && tokio::time::Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        handle.stop().await;

        assert!(store.is_empty());
        let on_disk = SessionFile::new(store.path()).load().unwrap();
        assert!(on_disk.records.is_empty());
    }

    #[tokio::test]
    async fn cancelled_token_stops_cleanup() {
        let dir = tempfile::tempdir().unwrap();
        let (store, _) = store_in(dir.path());
        let token = CancellationToken::new();
        let handle = spawn_cleanup(store, Duration::from_secs(3600), token.clone());

        token.cancel();
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        while !handle.is_finished() && tokio::time::Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert!(handle.is_finished());
    }

    #[tokio::test]
    async fn shutdown_flushes_activity_touches() {
        let dir = tempfile::tempdir().unwrap();
        let (store, clock) = store_in(dir.path());
        let s = store.create_session("idea").unwrap();

        let runtime = SessionRuntime::new(store.clone(), Duration::from_secs(3600));
        clock.advance(chrono::Duration::minutes(5));
        let touched = runtime.store().get_session(&s.id).unwrap();

        runtime.shutdown().await.unwrap();

        let on_disk = SessionFile::new(store.path()).load().unwrap();
        assert_eq!(on_disk.records[0].last_activity, touched.last_activity);
    }

    #[tokio::test]
    async fn panicked_final_flush_is_an_error() {
        let joined = tokio::task::spawn_blocking(|| -> Result<(), PersistError> {
            panic!("flush blew up")
        })
        .await;
        assert!(joined.is_err());

        let err = final_flush_result(joined, PathBuf::from("data/sessions.json")).unwrap_err();
        assert!(matches!(err, PersistError::Io { ref path, .. } if path.ends_with("sessions.json")));
    }

    #[tokio::test]
    async fn completed_final_flush_passes_through() {
        let ok = tokio::task::spawn_blocking(|| Ok(())).await;
        assert!(final_flush_result(ok, PathBuf::from("x")).is_ok());
    }
}
