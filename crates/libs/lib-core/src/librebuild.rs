//! Streaming library-rebuild pipeline.
//!
//! A rebuild is reported as an ordered sequence of text events. The HTTP
//! adapter frames each event as a `data: <payload>` line; this module only
//! produces payloads. Every stream, successful or not, ends with the same
//! four trailer events so clients can parse the outcome without relying on
//! the HTTP status (which is already 200 once streaming begins).

use std::sync::Arc;

use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

use crate::build_mode::BuildMode;
use crate::code_sync::CodeSync;
use crate::error::Error;

/// First trailer event.
pub const EVENT_COMPLETE: &str = "COMPILATION_COMPLETE";

/// The receiver was dropped: the client went away and the stream is dead.
struct Disconnected;

type EmitResult = Result<(), Disconnected>;

fn emit(tx: &UnboundedSender<String>, event: impl Into<String>) -> EmitResult {
    tx.send(event.into()).map_err(|_| Disconnected)
}

fn emit_trailer(tx: &UnboundedSender<String>, exit_code: i32, http_status: u16) -> EmitResult {
    emit(tx, EVENT_COMPLETE)?;
    emit(tx, format!("EXIT_CODE: {exit_code}"))?;
    let status = if exit_code == 0 { "SUCCESS" } else { "FAIL" };
    emit(tx, format!("STATUS: {status}"))?;
    emit(tx, format!("HTTP_STATUS: {http_status}"))
}

/// Start a rebuild and return its event stream.
///
/// Dropping the receiver cancels the rebuild at its next yield point; any
/// subprocess already running completes on its own.
pub fn stream_rebuild(
    code_sync: Arc<CodeSync>,
    mode: BuildMode,
    dry_run: bool,
) -> UnboundedReceiver<String> {
    let (tx, rx) = mpsc::unbounded_channel();
    let _worker = tokio::spawn(async move {
        // A Disconnected error only means nobody is listening anymore.
        let _ = drive(&code_sync, mode, dry_run, &tx).await;
    });
    rx
}

async fn drive(
    code_sync: &CodeSync,
    mode: BuildMode,
    dry_run: bool,
    tx: &UnboundedSender<String>,
) -> EmitResult {
    emit(tx, format!("Using BUILD_MODE: {}", mode.name()))?;

    if dry_run {
        emit(tx, "DRY RUN MODE: Will skip actual compilation")?;
        emit(
            tx,
            format!("Would compile libfastled with BUILD_MODE={}", mode.name()),
        )?;
        return emit_trailer(tx, 0, 200);
    }

    emit(tx, "Checking for source file changes...")?;

    let progress_tx = tx.clone();
    let result = code_sync
        .sync(move |msg| {
            let _ = progress_tx.send(msg);
        })
        .await;

    match result {
        Ok(outcome) => {
            emit(
                tx,
                format!(
                    "Source update completed in {:.2} seconds",
                    outcome.duration.as_secs_f64()
                ),
            )?;
            emit_trailer(tx, 0, 200)
        }
        Err(Error::SyncFailed {
            exit_code,
            stdout,
            stderr,
        }) => {
            emit(tx, "ERROR: source update failed")?;
            if !stdout.trim().is_empty() {
                emit(tx, format!("stdout: {}", stdout.trim()))?;
            }
            if !stderr.trim().is_empty() {
                emit(tx, format!("stderr: {}", stderr.trim()))?;
            }
            emit(tx, format!("returncode: {}", exit_code.unwrap_or(-1)))?;
            emit_trailer(tx, 1, 500)
        }
        Err(err) => {
            emit(tx, format!("ERROR: {err}"))?;
            emit_trailer(tx, -1, 500)
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::path::Path;

    async fn collect(mut rx: UnboundedReceiver<String>) -> Vec<String> {
        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        events
    }

    fn unmapped_sync() -> Arc<CodeSync> {
        Arc::new(CodeSync::new(
            Path::new("/nonexistent/mapped/src"),
            Path::new("/nonexistent/dest"),
        ))
    }

    #[tokio::test]
    async fn test_dry_run_event_sequence() {
        let rx = stream_rebuild(unmapped_sync(), BuildMode::Quick, true);
        let events = collect(rx).await;

        assert_eq!(
            events,
            vec![
                "Using BUILD_MODE: QUICK",
                "DRY RUN MODE: Will skip actual compilation",
                "Would compile libfastled with BUILD_MODE=QUICK",
                "COMPILATION_COMPLETE",
                "EXIT_CODE: 0",
                "STATUS: SUCCESS",
                "HTTP_STATUS: 200",
            ]
        );
    }

    #[tokio::test]
    async fn test_real_run_ends_with_trailer() {
        let rx = stream_rebuild(unmapped_sync(), BuildMode::Debug, false);
        let events = collect(rx).await;

        assert_eq!(events[0], "Using BUILD_MODE: DEBUG");
        assert_eq!(events[1], "Checking for source file changes...");

        let tail: Vec<&str> = events.iter().rev().take(4).rev().map(String::as_str).collect();
        assert_eq!(
            tail,
            vec![
                "COMPILATION_COMPLETE",
                "EXIT_CODE: 0",
                "STATUS: SUCCESS",
                "HTTP_STATUS: 200",
            ]
        );
    }

    #[tokio::test]
    async fn test_dropped_receiver_stops_stream() {
        let rx = stream_rebuild(unmapped_sync(), BuildMode::Quick, true);
        drop(rx);
        // Nothing to assert beyond "the task does not panic"; give it a tick.
        tokio::task::yield_now().await;
    }
}
