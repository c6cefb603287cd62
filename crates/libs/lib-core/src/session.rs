//! Session registry with the worker-lease / GC-grace lease model.
//!
//! A session is a 64-bit opaque id a client carries between compile
//! requests so it keeps landing on the same workspace directory. Two
//! deadlines govern every record:
//!
//! - **worker lease**: a request may reuse a session only while
//!   `now - last_used < worker_lease`;
//! - **GC grace**: the sweeper may delete a session (and its workspace)
//!   only once `now - last_used > gc_grace`.
//!
//! `gc_grace` is strictly greater than `worker_lease`, so there is a window
//! in which a session is neither reusable nor collectible. That gap is what
//! makes a worker/GC collision impossible: a workspace a worker just chose
//! to reuse cannot simultaneously be eligible for deletion.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tracing::{info, warn};

/// Lease parameters. The constructor rejects configurations where the grace
/// period does not exceed the worker lease.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub worker_lease: Duration,
    pub gc_grace: Duration,
    pub sweep_interval: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            worker_lease: Duration::from_secs(20 * 60),
            gc_grace: Duration::from_secs(40 * 60),
            sweep_interval: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct SessionRecord {
    created: Instant,
    last_used: Instant,
}

/// Introspection result for a session hint.
#[derive(Debug, Clone)]
pub struct SessionInfo {
    pub exists: bool,
    pub session_id: Option<u64>,
    pub message: String,
}

/// Aggregate counts for `Stats()`-style introspection.
#[derive(Debug, Clone, Copy)]
pub struct SessionStats {
    pub active: usize,
}

/// Thread-safe session registry. Critical sections are short; filesystem
/// deletion during GC happens outside the registry mutex.
pub struct SessionManager {
    sessions: Mutex<HashMap<u64, SessionRecord>>,
    config: SessionConfig,
    workspace_root: PathBuf,
}

impl SessionManager {
    /// # Panics
    /// Panics if `gc_grace <= worker_lease`; that configuration reintroduces
    /// the worker/GC collision and is a programmer error.
    pub fn new(workspace_root: &Path, config: SessionConfig) -> Self {
        assert!(
            config.gc_grace > config.worker_lease,
            "gc_grace must exceed worker_lease"
        );
        Self {
            sessions: Mutex::new(HashMap::new()),
            config,
            workspace_root: workspace_root.to_path_buf(),
        }
    }

    /// Mint a fresh 64-bit id not currently registered.
    #[allow(clippy::expect_used)] // Mutex poisoning means a panicked holder; propagating is pointless
    pub fn generate(&self) -> u64 {
        let mut sessions = self.sessions.lock().expect("session registry poisoned");
        loop {
            let id: u64 = rand::random();
            if !sessions.contains_key(&id) {
                let now = Instant::now();
                sessions.insert(
                    id,
                    SessionRecord {
                        created: now,
                        last_used: now,
                    },
                );
                return id;
            }
        }
    }

    /// Reuse `hint` if it is registered and inside the worker lease,
    /// otherwise mint a fresh session. Returns `(id, reused)`.
    #[allow(clippy::expect_used)]
    pub fn get_or_create(&self, hint: Option<u64>) -> (u64, bool) {
        if let Some(id) = hint {
            let mut sessions = self.sessions.lock().expect("session registry poisoned");
            if let Some(record) = sessions.get_mut(&id) {
                if record.last_used.elapsed() < self.config.worker_lease {
                    record.last_used = Instant::now();
                    return (id, true);
                }
            }
        }
        (self.generate(), false)
    }

    /// Describe a session hint without minting anything.
    #[allow(clippy::expect_used)]
    pub fn info(&self, hint: Option<u64>) -> SessionInfo {
        let Some(id) = hint else {
            return SessionInfo {
                exists: false,
                session_id: None,
                message: "No session ID provided".to_string(),
            };
        };
        let sessions = self.sessions.lock().expect("session registry poisoned");
        match sessions.get(&id) {
            Some(record) if record.last_used.elapsed() < self.config.worker_lease => SessionInfo {
                exists: true,
                session_id: Some(id),
                message: format!("Using existing session {id}"),
            },
            _ => SessionInfo {
                exists: false,
                session_id: Some(id),
                message: format!("Session {id} not found"),
            },
        }
    }

    #[allow(clippy::expect_used)]
    pub fn stats(&self) -> SessionStats {
        let sessions = self.sessions.lock().expect("session registry poisoned");
        SessionStats {
            active: sessions.len(),
        }
    }

    /// Workspace directory owned by `id`.
    pub fn workspace_dir(&self, id: u64) -> PathBuf {
        self.workspace_root.join(format!("session-{id}"))
    }

    /// One GC pass: drop every record past the grace period, then delete the
    /// corresponding workspaces outside the registry lock. Returns the number
    /// of sessions collected. Deletion failures are logged, never fatal.
    #[allow(clippy::expect_used)]
    pub fn sweep(&self) -> usize {
        let expired: Vec<u64> = {
            let mut sessions = self.sessions.lock().expect("session registry poisoned");
            let expired: Vec<u64> = sessions
                .iter()
                .filter(|(_, r)| r.last_used.elapsed() > self.config.gc_grace)
                .map(|(id, _)| *id)
                .collect();
            for id in &expired {
                sessions.remove(id);
            }
            expired
        };

        for id in &expired {
            let dir = self.workspace_dir(*id);
            if dir.exists() {
                if let Err(err) = std::fs::remove_dir_all(&dir) {
                    warn!(session = id, dir = %dir.display(), error = %err, "failed to delete session workspace");
                }
            }
        }
        if !expired.is_empty() {
            info!(count = expired.len(), "cleaned up expired sessions");
        }
        expired.len()
    }

    /// Spawn the periodic GC loop.
    pub fn spawn_gc(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        let interval = self.config.sweep_interval;
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(interval).await;
                self.sweep();
            }
        })
    }

    /// Age of a record since creation, for introspection.
    #[allow(clippy::expect_used)]
    pub fn session_age(&self, id: u64) -> Option<Duration> {
        let sessions = self.sessions.lock().expect("session registry poisoned");
        sessions.get(&id).map(|r| r.created.elapsed())
    }

    #[cfg(test)]
    #[allow(clippy::expect_used)]
    fn rewind_last_used(&self, id: u64, by: Duration) {
        let mut sessions = self.sessions.lock().expect("session registry poisoned");
        if let Some(record) = sessions.get_mut(&id) {
            if let Some(t) = record.last_used.checked_sub(by) {
                record.last_used = t;
            }
        }
    }
}
