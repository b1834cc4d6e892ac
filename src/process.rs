//! Export subprocess handling.
//!
//! The command line built by [`ExportCommandFactory`](crate::command) runs
//! through `sh -c`. Only the start is retried; once the process is up its
//! stdout is consumed as a plain awaited read loop and a mid-stream failure
//! surfaces exactly once, after the stream ends, through the exit status and
//! captured stderr.

use std::process::Stdio;

use anyhow::Context;
use tokio::io::AsyncReadExt;
use tokio::process::{Child, ChildStdout, Command};
use tokio::task::JoinHandle;

use crate::retry::{retry_async, RetryConfig};

/// A running export process with its stdout exposed for streaming.
pub struct ExportProcess {
    child: Child,
    stdout: ChildStdout,
    stderr_reader: JoinHandle<String>,
}

/// Terminal state of a finished export process.
#[derive(Debug)]
pub struct ExportOutcome {
    pub success: bool,
    pub stderr: String,
}

/// Output of a run-to-completion invocation (the watermark probe).
#[derive(Debug)]
pub struct CompletedExport {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
}

impl ExportProcess {
    /// Spawn the command, retrying the start with bounded backoff.
    pub async fn start(command: &str, retry: &RetryConfig) -> anyhow::Result<Self> {
        let mut child = retry_async(retry, "export process start", || async {
            Command::new("sh")
                .arg("-c")
                .arg(command)
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .spawn()
                .context("failed to start export process")
        })
        .await?;

        let stdout = child
            .stdout
            .take()
            .context("export process has no stdout handle")?;
        let mut stderr = child
            .stderr
            .take()
            .context("export process has no stderr handle")?;

        // Drain stderr concurrently so a chatty process can't block on a
        // full pipe while we read stdout.
        let stderr_reader = tokio::spawn(async move {
            let mut buffer = String::new();
            let _ = stderr.read_to_string(&mut buffer).await;
            buffer
        });

        Ok(Self {
            child,
            stdout,
            stderr_reader,
        })
    }

    /// Pull the next chunk of stdout. Returns 0 at end of stream.
    pub async fn read_chunk(&mut self, buffer: &mut [u8]) -> anyhow::Result<usize> {
        self.stdout
            .read(buffer)
            .await
            .context("failed to read export output")
    }

    /// Wait for the process to exit and collect its stderr.
    pub async fn finish(mut self) -> anyhow::Result<ExportOutcome> {
        let status = self
            .child
            .wait()
            .await
            .context("failed to wait for export process")?;
        let stderr = self.stderr_reader.await.unwrap_or_default();
        Ok(ExportOutcome {
            success: status.success(),
            stderr,
        })
    }

    /// Run a command to completion and collect both streams; used for the
    /// single-document watermark probe.
    pub async fn run_to_completion(
        command: &str,
        retry: &RetryConfig,
    ) -> anyhow::Result<CompletedExport> {
        let mut process = Self::start(command, retry).await?;
        let mut stdout = Vec::new();
        process
            .stdout
            .read_to_end(&mut stdout)
            .await
            .context("failed to read export output")?;
        let outcome = process.finish().await?;
        Ok(CompletedExport {
            success: outcome.success,
            stdout: String::from_utf8_lossy(&stdout).into_owned(),
            stderr: outcome.stderr,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_streams_stdout_in_chunks() {
        let mut process = ExportProcess::start(
            r#"printf '{"a":1}\n{"a":2}\n'"#,
            &RetryConfig::default(),
        )
        .await
        .unwrap();

        let mut output = Vec::new();
        let mut buffer = [0u8; 16];
        loop {
            let n = process.read_chunk(&mut buffer).await.unwrap();
            if n == 0 {
                break;
            }
            output.extend_from_slice(&buffer[..n]);
        }

        let outcome = process.finish().await.unwrap();
        assert!(outcome.success);
        assert_eq!(String::from_utf8(output).unwrap(), "{\"a\":1}\n{\"a\":2}\n");
    }

    #[tokio::test]
    async fn test_failure_exposes_stderr() {
        let result = ExportProcess::run_to_completion(
            "echo 'Failed: something' >&2; exit 1",
            &RetryConfig::default(),
        )
        .await
        .unwrap();
        assert!(!result.success);
        assert!(result.stderr.contains("Failed: something"));
    }

    #[tokio::test]
    async fn test_run_to_completion_collects_stdout() {
        let result = ExportProcess::run_to_completion(
            r#"printf '{"x":{"$date":"2024-01-02T00:00:00Z"}}\n'"#,
            &RetryConfig::default(),
        )
        .await
        .unwrap();
        assert!(result.success);
        assert_eq!(
            result.stdout.trim(),
            r#"{"x":{"$date":"2024-01-02T00:00:00Z"}}"#
        );
    }
}
