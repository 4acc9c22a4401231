//! External tool execution with a hard time ceiling.
//!
//! Every conversion tool (ffmpeg, heif-convert, pdftoppm) goes through
//! [`run_tool`]. The child is spawned with `kill_on_drop(true)`, so when the
//! timeout fires the child handle is dropped and the process is killed.

use std::ffi::OsStr;
use std::process::Stdio;
use std::time::{Duration, Instant};

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;

/// Maximum stderr captured per invocation (64 KiB).
const MAX_STDERR_BYTES: u64 = 64 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("{program} could not be started: {source}")]
    Spawn {
        program: String,
        source: std::io::Error,
    },

    #[error("{program} failed (exit code {exit_code:?}): {stderr}")]
    Failed {
        program: String,
        exit_code: Option<i32>,
        stderr: String,
    },

    #[error("{program} killed after {elapsed_ms} ms")]
    Timeout { program: String, elapsed_ms: u64 },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Outcome of a successful run.
#[derive(Debug, Clone)]
pub struct ToolOutput {
    pub stderr: String,
    pub duration_ms: u64,
}

/// Run `program` with `args`, killing it if it is still running after `timeout`.
///
/// A non-zero exit status is an error. Stdout is discarded; stderr is kept
/// (truncated) for diagnostics.
pub async fn run_tool<I, S>(
    program: &str,
    args: I,
    timeout: Duration,
) -> Result<ToolOutput, ToolError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let mut cmd = Command::new(program);
    cmd.args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let start = Instant::now();
    let mut child = cmd.spawn().map_err(|source| ToolError::Spawn {
        program: program.to_string(),
        source,
    })?;

    let stderr_handle = child.stderr.take();
    let stderr_task = tokio::spawn(async move { read_capped(stderr_handle).await });

    match tokio::time::timeout(timeout, child.wait()).await {
        Ok(Ok(status)) => {
            let stderr_bytes = stderr_task.await.unwrap_or_default();
            let stderr = String::from_utf8_lossy(&stderr_bytes).into_owned();
            if !status.success() {
                return Err(ToolError::Failed {
                    program: program.to_string(),
                    exit_code: status.code(),
                    stderr,
                });
            }
            Ok(ToolOutput {
                stderr,
                duration_ms: start.elapsed().as_millis() as u64,
            })
        }
        Ok(Err(e)) => Err(ToolError::Io(e)),
        Err(_elapsed) => {
            stderr_task.abort();
            tracing::warn!(program, timeout_ms = timeout.as_millis() as u64, "Tool timed out, killing");
            Err(ToolError::Timeout {
                program: program.to_string(),
                elapsed_ms: start.elapsed().as_millis() as u64,
            })
        }
    }
}

async fn read_capped<R: AsyncRead + Unpin>(handle: Option<R>) -> Vec<u8> {
    let mut buf = Vec::new();
    if let Some(h) = handle {
        let _ = h.take(MAX_STDERR_BYTES).read_to_end(&mut buf).await;
    }
    buf
}

#[cfg(all(test, unix))]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[tokio::test]
    async fn successful_command_returns_output() {
        let out = run_tool("sh", ["-c", "echo warn >&2"], Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(out.stderr.trim(), "warn");
    }

    #[tokio::test]
    async fn non_zero_exit_is_failure() {
        let result = run_tool("sh", ["-c", "exit 3"], Duration::from_secs(5)).await;
        assert_matches!(result, Err(ToolError::Failed { exit_code: Some(3), .. }));
    }

    #[tokio::test]
    async fn hanging_command_is_killed() {
        let start = Instant::now();
        let result = run_tool("sleep", ["10"], Duration::from_millis(100)).await;
        assert_matches!(result, Err(ToolError::Timeout { .. }));
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn missing_binary_is_spawn_error() {
        let result = run_tool(
            "definitely-not-a-real-binary-4821",
            Vec::<String>::new(),
            Duration::from_secs(1),
        )
        .await;
        assert_matches!(result, Err(ToolError::Spawn { .. }));
    }
}
