//! Supervision of a per-file anonymiser executable.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::time::timeout;
use tracing::debug;

use super::{AnonymiserBackend, BackendOutcome};

// Not exposed through configuration
const DEFAULT_TOOL_TIMEOUT: Duration = Duration::from_secs(60);

/// Launches a configured executable as `<tool> <src> <dst>` and classifies
/// the outcome
///
/// Only the exit code and the existence of `dst` are authoritative;
/// stdout/stderr are drained line by line and logged at debug.
#[derive(Debug)]
pub struct ExternalToolRunner {
    tool_path: PathBuf,
    timeout: Duration,
}

#[derive(thiserror::Error, Debug)]
pub enum ExternalToolConfigError {
    #[error("Anonymiser tool does not exist: '{}'", .0.display())]
    MissingTool(PathBuf),
}

impl ExternalToolRunner {
    pub fn new(tool_path: impl Into<PathBuf>) -> Result<Self, ExternalToolConfigError> {
        Self::with_timeout(tool_path, DEFAULT_TOOL_TIMEOUT)
    }

    pub fn with_timeout(
        tool_path: impl Into<PathBuf>,
        timeout: Duration,
    ) -> Result<Self, ExternalToolConfigError> {
        let tool_path = tool_path.into();

        if !tool_path.is_file() {
            return Err(ExternalToolConfigError::MissingTool(tool_path));
        }

        Ok(Self { tool_path, timeout })
    }

    fn tool_name(&self) -> String {
        self.tool_path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.tool_path.display().to_string())
    }

    /// Runs the tool on one file
    ///
    /// Spawn and I/O errors are folded into an `ErrorWontRetry` outcome so
    /// that a broken tool surfaces as a reported status, not a dead worker.
    #[tracing::instrument(name = "Running external anonymiser tool", skip(self))]
    pub async fn run(&self, src: &Path, dst: &Path) -> BackendOutcome {
        match self.try_run(src, dst).await {
            Ok(outcome) => outcome,
            Err(error) => BackendOutcome::wont_retry(format!(
                "{} tool failed to run: {}",
                self.tool_name(),
                error
            )),
        }
    }

    async fn try_run(&self, src: &Path, dst: &Path) -> std::io::Result<BackendOutcome> {
        let tool_name = self.tool_name();

        let mut child = Command::new(&self.tool_path)
            .arg(src)
            .arg(dst)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        // Both pipes are drained concurrently with the wait so a chatty tool
        // cannot block on a full pipe buffer
        let stdout_task = child
            .stdout
            .take()
            .map(|stream| tokio::spawn(drain_lines(stream, tool_name.clone(), "stdout")));
        let stderr_task = child
            .stderr
            .take()
            .map(|stream| tokio::spawn(drain_lines(stream, tool_name.clone(), "stderr")));

        let exit_status = match timeout(self.timeout, child.wait()).await {
            Ok(wait_result) => wait_result?,
            Err(_elapsed) => {
                child.kill().await?;
                if let Some(task) = stdout_task {
                    task.abort();
                }
                if let Some(task) = stderr_task {
                    task.abort();
                }
                return Ok(BackendOutcome::wont_retry(format!(
                    "{} tool timed out after {}s",
                    tool_name,
                    self.timeout.as_secs()
                )));
            }
        };

        if let Some(task) = stdout_task {
            let _ = task.await;
        }
        let stderr_lines = match stderr_task {
            Some(task) => task.await.unwrap_or_default(),
            None => Vec::new(),
        };

        if !exit_status.success() {
            // A signal-terminated child has no exit code
            let code = exit_status.code().unwrap_or(-1);
            return Ok(BackendOutcome::wont_retry(format!(
                "{} tool exited with code {}. Error: {}",
                tool_name,
                code,
                stderr_lines.join("\n")
            )));
        }

        if tokio::fs::metadata(dst).await.is_err() {
            return Ok(BackendOutcome::wont_retry(format!(
                "{} tool completed but output file was not created: {}",
                tool_name,
                dst.display()
            )));
        }

        Ok(BackendOutcome::anonymised())
    }
}

async fn drain_lines(
    stream: impl AsyncRead + Unpin,
    tool_name: String,
    stream_name: &'static str,
) -> Vec<String> {
    let mut lines = BufReader::new(stream).lines();
    let mut collected = Vec::new();

    while let Ok(Some(line)) = lines.next_line().await {
        debug!(tool = %tool_name, "{}: {}", stream_name, line);
        collected.push(line);
    }

    collected
}

/// Backend for the modalities handled by a dedicated external tool
pub struct ExternalToolBackend {
    runner: ExternalToolRunner,
}

impl ExternalToolBackend {
    pub fn new(tool_path: impl Into<PathBuf>) -> Result<Self, ExternalToolConfigError> {
        Ok(Self {
            runner: ExternalToolRunner::new(tool_path)?,
        })
    }

    pub fn from_runner(runner: ExternalToolRunner) -> Self {
        Self { runner }
    }
}

#[async_trait]
impl AnonymiserBackend for ExternalToolBackend {
    async fn anonymise(&self, src: &Path, dst: &Path, _modality: &str) -> BackendOutcome {
        self.runner.run(src, dst).await
    }
}
