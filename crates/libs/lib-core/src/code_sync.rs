//! Mirror synchronization for the shared FastLED source tree.
//!
//! When the host maps its FastLED checkout into the container, library
//! rebuilds start by rsyncing that mirror over the build tree. The sync
//! reports which source files changed so callers can decide whether the
//! sketch cache is stale.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};

use tokio::process::Command;
use tracing::info;

use crate::error::{Error, Result};

/// File suffixes that count as "source changed" for cache-invalidation.
const SOURCE_SUFFIXES: &[&str] = &["cpp", "h", "hpp", "ino", "py", "js", "html", "css"];

/// Result of one mirror sync.
#[derive(Debug, Default)]
pub struct SyncOutcome {
    pub changed_files: Vec<String>,
    pub duration: Duration,
}

impl SyncOutcome {
    pub fn changed(&self) -> bool {
        !self.changed_files.is_empty()
    }
}

/// Extract the source-file changes from rsync's `--info=NAME` output.
pub fn source_file_changes(stdout: &str) -> Vec<String> {
    stdout
        .lines()
        .filter(|line| {
            let suffix = line.trim().rsplit('.').next().unwrap_or("");
            SOURCE_SUFFIXES.contains(&suffix)
        })
        .map(|line| line.trim().to_string())
        .collect()
}

/// rsync-based updater from the volume-mapped source to the build tree.
pub struct CodeSync {
    volume_mapped_src: PathBuf,
    rsync_dest: PathBuf,
}

impl CodeSync {
    pub fn new(volume_mapped_src: &Path, rsync_dest: &Path) -> Self {
        Self {
            volume_mapped_src: volume_mapped_src.to_path_buf(),
            rsync_dest: rsync_dest.to_path_buf(),
        }
    }

    /// Whether the host actually mapped a source volume in.
    pub fn is_mapped(&self) -> bool {
        self.volume_mapped_src.exists()
    }

    /// Mirror the mapped source over the build tree, reporting each changed
    /// file through `progress`. No-op when the volume is not mapped.
    pub async fn sync(&self, mut progress: impl FnMut(String)) -> Result<SyncOutcome> {
        if !self.is_mapped() {
            info!(src = %self.volume_mapped_src.display(), "skipping sync, source volume not mapped");
            return Ok(SyncOutcome::default());
        }

        let started = Instant::now();
        let output = Command::new("rsync")
            .arg("-av")
            .arg("--info=NAME")
            .arg("--delete")
            .arg(format!("{}/", self.volume_mapped_src.display()))
            .arg(format!("{}/", self.rsync_dest.display()))
            // Suppresses hidden trees like .mypy_cache/.
            .arg("--exclude=.*/")
            .stdin(Stdio::null())
            .output()
            .await?;

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

        if !output.status.success() {
            return Err(Error::SyncFailed {
                exit_code: output.status.code(),
                stdout,
                stderr,
            });
        }

        let changed_files = source_file_changes(&stdout);
        for file in &changed_files {
            progress(format!("Changed file: {file}"));
        }
        if changed_files.is_empty() {
            progress("Source directory synced successfully with no changes".to_string());
        }

        Ok(SyncOutcome {
            changed_files,
            duration: started.elapsed(),
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_source_suffixes_detected() {
        let stdout = "sending incremental file list\n\
                      src/FastLED.h\n\
                      src/platforms/wasm/ui.js\n\
                      docs/README.md\n\
                      src/noise.cpp\n";
        let changed = source_file_changes(stdout);
        assert_eq!(
            changed,
            vec!["src/FastLED.h", "src/platforms/wasm/ui.js", "src/noise.cpp"]
        );
    }

    #[test]
    fn test_no_source_changes() {
        let stdout = "sending incremental file list\nREADME.md\nLICENSE\n";
        assert!(source_file_changes(stdout).is_empty());
    }

    #[tokio::test]
    async fn test_unmapped_volume_is_noop() {
        let dest = tempfile::TempDir::new().unwrap();
        let sync = CodeSync::new(Path::new("/nonexistent/mapped/src"), dest.path());
        assert!(!sync.is_mapped());

        let outcome = sync.sync(|_| {}).await.unwrap();
        assert!(!outcome.changed());
    }
}
