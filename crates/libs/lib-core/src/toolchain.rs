//! Driver for the external wasm toolchain.
//!
//! The driver composes the argument vector, spawns the toolchain binary,
//! streams its merged stdout+stderr line by line to an observer, and
//! reports `(exit_code, log, duration)`. It never interprets the output —
//! deciding what a failure means is the pipeline's job.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, Instant};

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;

use crate::build_mode::BuildMode;
use crate::error::Result;

/// Default toolchain binary, resolved via `PATH`.
pub const DEFAULT_TOOLCHAIN_BIN: &str = "fastled-wasm-compiler";

/// Host filesystem prefixes rewritten before a line leaves the server.
const HOST_PATH_REWRITES: &[(&str, &str)] = &[("/git/fastled/src", "src"), ("/git/src", "src")];

/// One fully-specified toolchain run.
#[derive(Debug, Clone)]
pub struct ToolchainInvocation {
    pub program: PathBuf,
    pub compiler_root: PathBuf,
    pub mapped_dir: PathBuf,
    pub mode: BuildMode,
    pub profile: bool,
    pub strict: bool,
    pub no_platformio: bool,
    pub keep_intermediates: bool,
    pub disable_auto_clean: bool,
}

/// What the toolchain produced, regardless of success.
#[derive(Debug)]
pub struct ToolchainOutput {
    pub exit_code: i32,
    pub log: String,
    pub duration: Duration,
}

impl ToolchainOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Strip absolute host paths that would leak the container layout.
pub fn rewrite_host_paths(line: &str) -> String {
    let mut out = line.to_string();
    for (from, to) in HOST_PATH_REWRITES {
        out = out.replace(from, to);
    }
    out
}

/// Compose the argument vector for an invocation.
pub fn command_args(inv: &ToolchainInvocation) -> Vec<String> {
    let mut args = vec![
        "--mapped-dir".to_string(),
        inv.mapped_dir.display().to_string(),
        format!("--{}", inv.mode.as_str()),
    ];
    if inv.profile {
        args.push("--profile".to_string());
    }
    if inv.strict {
        args.push("--strict".to_string());
    }
    if inv.no_platformio {
        args.push("--no-platformio".to_string());
    }
    if inv.keep_intermediates {
        args.push("--keep-files".to_string());
    }
    if inv.disable_auto_clean {
        args.push("--disable-auto-clean".to_string());
    }
    args
}

/// Spawn the toolchain and stream its merged output.
///
/// Each line is host-path-rewritten, handed to `observer`, and appended to
/// the returned log. The call blocks until the child exits; this is the
/// only place in the engine that waits on an external process.
pub async fn run(
    inv: &ToolchainInvocation,
    mut observer: impl FnMut(&str),
) -> Result<ToolchainOutput> {
    let started = Instant::now();

    let mut child = Command::new(&inv.program)
        .args(command_args(inv))
        .current_dir(&inv.compiler_root)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()?;

    let (tx, mut rx) = mpsc::unbounded_channel::<String>();

    if let Some(stdout) = child.stdout.take() {
        let tx = tx.clone();
        let _reader = tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                if tx.send(line).is_err() {
                    break;
                }
            }
        });
    }
    if let Some(stderr) = child.stderr.take() {
        let tx = tx.clone();
        let _reader = tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                if tx.send(line).is_err() {
                    break;
                }
            }
        });
    }
    drop(tx);

    let mut log = String::new();
    while let Some(line) = rx.recv().await {
        let line = rewrite_host_paths(&line);
        observer(&line);
        log.push_str(&line);
        log.push('\n');
    }

    let status = child.wait().await?;
    Ok(ToolchainOutput {
        exit_code: status.code().unwrap_or(-1),
        log,
        duration: started.elapsed(),
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn invocation() -> ToolchainInvocation {
        ToolchainInvocation {
            program: PathBuf::from(DEFAULT_TOOLCHAIN_BIN),
            compiler_root: PathBuf::from("/js"),
            mapped_dir: PathBuf::from("/tmp/src"),
            mode: BuildMode::Quick,
            profile: false,
            strict: false,
            no_platformio: false,
            keep_intermediates: false,
            disable_auto_clean: false,
        }
    }

    #[test]
    fn test_minimal_args() {
        let args = command_args(&invocation());
        assert_eq!(args, vec!["--mapped-dir", "/tmp/src", "--quick"]);
    }

    #[test]
    fn test_full_args() {
        let inv = ToolchainInvocation {
            mode: BuildMode::Debug,
            profile: true,
            strict: true,
            no_platformio: true,
            keep_intermediates: true,
            disable_auto_clean: true,
            ..invocation()
        };
        let args = command_args(&inv);
        assert!(args.contains(&"--debug".to_string()));
        assert!(args.contains(&"--profile".to_string()));
        assert!(args.contains(&"--strict".to_string()));
        assert!(args.contains(&"--no-platformio".to_string()));
        assert!(args.contains(&"--keep-files".to_string()));
        assert!(args.contains(&"--disable-auto-clean".to_string()));
    }

    #[test]
    fn test_host_path_rewrite() {
        assert_eq!(
            rewrite_host_paths("/git/fastled/src/FastLED.h:10 error"),
            "src/FastLED.h:10 error"
        );
        assert_eq!(rewrite_host_paths("/git/src/main.cpp"), "src/main.cpp");
        assert_eq!(rewrite_host_paths("no paths here"), "no paths here");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_run_streams_merged_output() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::TempDir::new().unwrap();
        let script = dir.path().join("fake-toolchain");
        std::fs::write(
            &script,
            "#!/bin/sh\necho out-line\necho err-line >&2\nexit 3\n",
        )
        .unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let inv = ToolchainInvocation {
            program: script,
            compiler_root: dir.path().to_path_buf(),
            ..invocation()
        };

        let mut seen = Vec::new();
        let out = run(&inv, |line| seen.push(line.to_string())).await.unwrap();

        assert_eq!(out.exit_code, 3);
        assert!(!out.success());
        assert!(out.log.contains("out-line"));
        assert!(out.log.contains("err-line"));
        assert_eq!(seen.len(), 2);
    }
}
