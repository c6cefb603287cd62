//! Process-wide build state: the global build lock and compile counters.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use tokio::sync::{Mutex, MutexGuard};

/// Snapshot of the monotonic compile counters.
#[derive(Debug, Clone, Copy, Default)]
pub struct BuildCounts {
    pub attempted: u64,
    pub succeeded: u64,
    pub failed: u64,
}

/// The single source of truth for "is a toolchain run in flight".
///
/// The lock serializes toolchain invocations only; extraction, hashing and
/// archive packing run concurrently across requests. Holding the guard is
/// the only way to run the toolchain, so release-on-every-path falls out of
/// RAII.
pub struct BuildState {
    lock: Mutex<()>,
    attempted: AtomicU64,
    succeeded: AtomicU64,
    failed: AtomicU64,
    started: Instant,
}

impl BuildState {
    pub fn new() -> Self {
        Self {
            lock: Mutex::new(()),
            attempted: AtomicU64::new(0),
            succeeded: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            started: Instant::now(),
        }
    }

    /// Acquire the global build lock.
    pub async fn acquire(&self) -> MutexGuard<'_, ()> {
        self.lock.lock().await
    }

    /// Non-blocking probe for the `/compile/wasm/inuse` endpoint.
    pub fn is_locked(&self) -> bool {
        match self.lock.try_lock() {
            Ok(_guard) => false,
            Err(_) => true,
        }
    }

    pub fn record_attempt(&self) {
        self.attempted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_success(&self) {
        self.succeeded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failure(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn counts(&self) -> BuildCounts {
        BuildCounts {
            attempted: self.attempted.load(Ordering::Relaxed),
            succeeded: self.succeeded.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }

    pub fn uptime(&self) -> Duration {
        self.started.elapsed()
    }

    /// Uptime formatted as `HH:MM:SS` for the `/info` object.
    pub fn uptime_hhmmss(&self) -> String {
        let secs = self.uptime().as_secs();
        format!("{:02}:{:02}:{:02}", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}

impl Default for BuildState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_lock_probe_tracks_holder() {
        let state = BuildState::new();
        assert!(!state.is_locked());
        {
            let _guard = state.acquire().await;
            assert!(state.is_locked());
        }
        assert!(!state.is_locked());
    }

    #[tokio::test]
    async fn test_lock_serializes_holders() {
        use std::sync::Arc;
        use std::sync::atomic::{AtomicU32, Ordering};

        let state = Arc::new(BuildState::new());
        let in_flight = Arc::new(AtomicU32::new(0));
        let mut handles = Vec::new();

        for _ in 0..8 {
            let state = Arc::clone(&state);
            let in_flight = Arc::clone(&in_flight);
            handles.push(tokio::spawn(async move {
                let _guard = state.acquire().await;
                let now = in_flight.fetch_add(1, Ordering::SeqCst);
                assert_eq!(now, 0, "two holders inside the build lock");
                tokio::time::sleep(Duration::from_millis(2)).await;
                in_flight.fetch_sub(1, Ordering::SeqCst);
            }));
        }
        for h in handles {
            h.await.unwrap();
        }
    }

    #[test]
    fn test_counters_are_monotonic() {
        let state = BuildState::new();
        state.record_attempt();
        state.record_attempt();
        state.record_success();
        state.record_failure();

        let counts = state.counts();
        assert_eq!(counts.attempted, 2);
        assert_eq!(counts.succeeded, 1);
        assert_eq!(counts.failed, 1);
    }

    #[test]
    fn test_uptime_format() {
        let state = BuildState::new();
        let formatted = state.uptime_hhmmss();
        assert_eq!(formatted.len(), 8);
        assert!(formatted.starts_with("00:00:"));
    }
}
