//! Last-resort memory watchdog.
//!
//! A runaway toolchain can exhaust the container; the watchdog samples the
//! process RSS every 100 ms and terminates with the conventional OOM exit
//! code when the configured limit is exceeded. It is deliberately a plain
//! OS thread so it keeps running even if the async runtime is starved.

use std::thread;
use std::time::Duration;

use lib_common::MEMORY_EXCEEDED_EXIT_CODE;
use sysinfo::{ProcessesToUpdate, System};
use tracing::{error, warn};

const CHECK_INTERVAL: Duration = Duration::from_millis(100);

/// Start the watchdog. A limit of 0 disables it.
pub fn start_memory_watchdog(memory_limit_mb: u64) -> Option<thread::JoinHandle<()>> {
    if memory_limit_mb == 0 {
        warn!("memory limit is 0, watchdog will not be started");
        return None;
    }

    let handle = thread::spawn(move || {
        let pid = match sysinfo::get_current_pid() {
            Ok(pid) => pid,
            Err(err) => {
                error!(error = %err, "cannot resolve own pid, watchdog disabled");
                return;
            }
        };
        let mut system = System::new();
        loop {
            system.refresh_processes(ProcessesToUpdate::Some(&[pid]), true);
            if let Some(process) = system.process(pid) {
                let rss_mb = process.memory() / (1024 * 1024);
                if rss_mb > memory_limit_mb {
                    error!(
                        rss_mb,
                        limit_mb = memory_limit_mb,
                        "memory limit exceeded, terminating process"
                    );
                    std::process::exit(MEMORY_EXCEEDED_EXIT_CODE);
                }
            }
            thread::sleep(CHECK_INTERVAL);
        }
    });
    Some(handle)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_limit_disables_watchdog() {
        assert!(start_memory_watchdog(0).is_none());
    }

    #[test]
    fn test_generous_limit_keeps_running() {
        // 1 TiB limit: the watchdog thread starts and never fires.
        let handle = start_memory_watchdog(1024 * 1024);
        assert!(handle.is_some());
    }
}
