//! Execution of external command-line tools.
//!
//! Every interaction with the Solana and Anchor toolchains goes through the
//! [`ToolRunner`] trait so the pipeline can be driven by a scripted fake in tests.

use std::process::{Output, Stdio};
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::io::AsyncReadExt;
use tokio::process::{Child, Command};

/// Runs external tools, either to completion or as long-lived children.
#[allow(async_fn_in_trait)]
pub trait ToolRunner {
    /// Run a tool to completion, capturing stdout, stderr and exit status.
    async fn run(&self, program: &str, args: &[&str]) -> Result<Output>;

    /// Same as [`ToolRunner::run`], but the child is killed if it outlives `timeout`.
    async fn run_with_timeout(
        &self,
        program: &str,
        args: &[&str],
        timeout: Duration,
    ) -> Result<Output>;

    /// Spawn a long-running process with piped stdout and stderr.
    ///
    /// The child is not killed when its handle is dropped.
    fn spawn(&self, program: &str, args: &[&str]) -> Result<Child>;
}

/// Production [`ToolRunner`] backed by `tokio::process`.
#[derive(Debug, Clone, Default)]
pub struct TokioToolRunner;

impl TokioToolRunner {
    pub fn new() -> Self {
        Self
    }

    async fn collect(program: &str, mut child: Child) -> Result<Output> {
        let mut stdout_handle = child.stdout.take();
        let mut stderr_handle = child.stderr.take();

        let (status, stdout, stderr) = tokio::join!(
            child.wait(),
            async {
                let mut buf = Vec::new();
                if let Some(ref mut h) = stdout_handle {
                    let _ = h.read_to_end(&mut buf).await;
                }
                buf
            },
            async {
                let mut buf = Vec::new();
                if let Some(ref mut h) = stderr_handle {
                    let _ = h.read_to_end(&mut buf).await;
                }
                buf
            },
        );

        Ok(Output {
            status: status.with_context(|| format!("waiting for {program}"))?,
            stdout,
            stderr,
        })
    }

    fn command(program: &str, args: &[&str]) -> Command {
        let mut cmd = Command::new(program);
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        cmd
    }
}

impl ToolRunner for TokioToolRunner {
    async fn run(&self, program: &str, args: &[&str]) -> Result<Output> {
        tracing::trace!(program, ?args, "Running tool");

        let child = Self::command(program, args)
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("failed to spawn {program}"))?;

        Self::collect(program, child).await
    }

    async fn run_with_timeout(
        &self,
        program: &str,
        args: &[&str],
        timeout: Duration,
    ) -> Result<Output> {
        tracing::trace!(program, ?args, ?timeout, "Running tool with timeout");

        // kill_on_drop reaps the child when the timeout drops the collecting future.
        let child = Self::command(program, args)
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("failed to spawn {program}"))?;

        match tokio::time::timeout(timeout, Self::collect(program, child)).await {
            Ok(result) => result,
            Err(_) => anyhow::bail!("{program} timed out after {}ms", timeout.as_millis()),
        }
    }

    fn spawn(&self, program: &str, args: &[&str]) -> Result<Child> {
        tracing::trace!(program, ?args, "Spawning long-running tool");

        Self::command(program, args)
            .kill_on_drop(false)
            .spawn()
            .with_context(|| format!("failed to spawn {program}"))
    }
}

/// Lossy UTF-8 view of a tool's stdout.
pub fn stdout_text(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

/// Lossy UTF-8 view of a tool's stderr.
pub fn stderr_text(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

/// The most useful error text of a failed tool call: stderr, or stdout when stderr is empty.
pub fn failure_text(output: &Output) -> String {
    let stderr = stderr_text(output);
    if stderr.trim().is_empty() {
        stdout_text(output)
    } else {
        stderr
    }
}
