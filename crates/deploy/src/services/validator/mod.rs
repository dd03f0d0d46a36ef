//! Local solana-test-validator supervision.

mod cmd;

use std::path::PathBuf;
use std::process::ExitStatus;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Lines};
use tokio::process::{Child, ChildStderr, ChildStdout};
use tokio::task::JoinHandle;

pub use cmd::ValidatorCmdBuilder;

use crate::error::{OrchestratorError, Result};
use crate::runner::ToolRunner;

/// Default validator binary.
pub const DEFAULT_PROGRAM: &str = "solana-test-validator";
/// Default ledger directory, shared with `anchor test`.
pub const DEFAULT_LEDGER_PATH: &str = ".anchor/test-ledger";
/// Stdout token printed once the RPC service accepts connections.
pub const DEFAULT_READY_TOKEN: &str = "Listening";
/// Window after which a silent validator is assumed to be up.
pub const DEFAULT_STARTUP_TIMEOUT: Duration = Duration::from_secs(8);
/// Window between the graceful and the forced termination signal.
pub const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Configuration for the local validator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidatorConfig {
    /// Binary to spawn.
    pub program: String,
    /// Pattern matched against full command lines to detect a running validator.
    pub process_pattern: String,
    /// Ledger directory, reset on every start.
    pub ledger_path: PathBuf,
    /// JSON RPC port (validator default when unset).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rpc_port: Option<u16>,
    /// Stdout token that marks the validator as ready.
    pub ready_token: String,
    /// Stderr tokens that mark the startup as failed.
    pub error_tokens: Vec<String>,
    pub startup_timeout_ms: u64,
    pub shutdown_grace_ms: u64,
    /// Extra arguments to pass to the validator.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extra_args: Vec<String>,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            program: DEFAULT_PROGRAM.to_string(),
            process_pattern: DEFAULT_PROGRAM.to_string(),
            ledger_path: PathBuf::from(DEFAULT_LEDGER_PATH),
            rpc_port: None,
            ready_token: DEFAULT_READY_TOKEN.to_string(),
            error_tokens: vec!["Error".to_string(), "failed".to_string()],
            startup_timeout_ms: DEFAULT_STARTUP_TIMEOUT.as_millis() as u64,
            shutdown_grace_ms: DEFAULT_SHUTDOWN_GRACE.as_millis() as u64,
            extra_args: Vec::new(),
        }
    }
}

/// The event that settled the startup race.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartupSignal {
    /// The ready token appeared on stdout.
    Listening,
    /// Nothing went wrong within the startup window.
    TimedOut,
}

/// How a validator teardown ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CleanupOutcome {
    /// There was no validator owned by this run.
    NotOwned,
    /// The validator exited after the graceful signal.
    Exited,
    /// The validator outlived the grace window and was killed.
    Killed,
}

/// Handle to a validator process started by this run.
///
/// Dropping the handle leaves the process running.
pub struct ValidatorHandle {
    child: Child,
    pid: Option<u32>,
    startup: StartupSignal,
    log_task: Option<JoinHandle<()>>,
}

impl ValidatorHandle {
    /// OS process id at spawn time.
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// What settled the startup race.
    pub fn startup(&self) -> StartupSignal {
        self.startup
    }

    /// Stop the validator: graceful signal first, forced kill once `grace` elapses.
    ///
    /// Never fails; problems are logged as warnings.
    pub async fn stop(&mut self, grace: Duration) -> CleanupOutcome {
        tracing::info!(pid = ?self.pid, "Stopping local validator...");

        if let Err(e) = self.terminate().await {
            tracing::warn!(error = %e, pid = ?self.pid, "Failed to send termination signal to validator");
        }

        let outcome = match tokio::time::timeout(grace, self.child.wait()).await {
            Ok(Ok(status)) => {
                tracing::info!(%status, "Local validator stopped");
                CleanupOutcome::Exited
            }
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "Failed to wait for validator exit, killing it");
                self.force_kill().await;
                CleanupOutcome::Killed
            }
            Err(_) => {
                tracing::warn!(
                    grace_ms = grace.as_millis() as u64,
                    "Validator did not exit in time, killing it"
                );
                self.force_kill().await;
                CleanupOutcome::Killed
            }
        };

        if let Some(task) = self.log_task.take() {
            task.abort();
        }

        outcome
    }

    #[cfg(unix)]
    async fn terminate(&mut self) -> anyhow::Result<()> {
        use nix::sys::signal::{Signal, kill};
        use nix::unistd::Pid;

        // A reaped child has no id; there is nothing left to signal.
        let Some(pid) = self.child.id() else {
            return Ok(());
        };

        let pid = i32::try_from(pid)?;
        kill(Pid::from_raw(pid), Signal::SIGTERM)?;
        Ok(())
    }

    #[cfg(not(unix))]
    async fn terminate(&mut self) -> anyhow::Result<()> {
        self.child.start_kill()?;
        Ok(())
    }

    async fn force_kill(&mut self) {
        if let Err(e) = self.child.kill().await {
            tracing::warn!(error = %e, pid = ?self.pid, "Failed to kill validator");
        }
    }
}

impl std::fmt::Debug for ValidatorHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ValidatorHandle")
            .field("pid", &self.pid)
            .field("startup", &self.startup)
            .finish()
    }
}

/// Stop the validator held in `slot`, if any, and clear the slot.
///
/// The slot is only cleared once the stop has finished, so an interrupted
/// teardown can be repeated.
pub async fn cleanup(slot: &mut Option<ValidatorHandle>, grace: Duration) -> CleanupOutcome {
    let Some(handle) = slot.as_mut() else {
        tracing::debug!("No validator owned by this run, nothing to clean up");
        return CleanupOutcome::NotOwned;
    };

    let outcome = handle.stop(grace).await;
    *slot = None;
    outcome
}

impl ValidatorConfig {
    pub fn startup_timeout(&self) -> Duration {
        Duration::from_millis(self.startup_timeout_ms)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }

    /// Arguments the validator is spawned with.
    pub fn args(&self) -> Vec<String> {
        ValidatorCmdBuilder::new(&self.ledger_path)
            .quiet(true)
            .reset(true)
            .rpc_port(self.rpc_port)
            .extra_args(self.extra_args.clone())
            .build()
    }

    /// Whether a validator process is already running on this machine.
    ///
    /// A failed process query counts as "not running".
    pub async fn is_running<R: ToolRunner>(&self, runner: &R, pgrep_bin: &str) -> bool {
        match runner.run(pgrep_bin, &["-f", &self.process_pattern]).await {
            Ok(output) => {
                output.status.success() && !String::from_utf8_lossy(&output.stdout).trim().is_empty()
            }
            Err(e) => {
                tracing::debug!(error = %e, "Process query failed, assuming no validator is running");
                false
            }
        }
    }

    /// Spawn a fresh validator and wait until it is considered started.
    pub async fn start<R: ToolRunner>(&self, runner: &R) -> Result<ValidatorHandle> {
        let args = self.args();
        let args: Vec<&str> = args.iter().map(String::as_str).collect();

        tracing::info!(
            program = %self.program,
            ledger = %self.ledger_path.display(),
            "Starting local validator..."
        );

        let child = runner
            .spawn(&self.program, &args)
            .map_err(|e| OrchestratorError::ValidatorStart(format!("{e:#}")))?;

        self.await_startup(child).await
    }

    /// Race the startup window against the child's output and exit events.
    ///
    /// The first event settles the outcome: the ready token or an elapsed window
    /// mean success; an error token on stderr or a non-zero exit mean failure.
    /// Later events are not observed.
    pub async fn await_startup(&self, mut child: Child) -> Result<ValidatorHandle> {
        let pid = child.id();
        let mut stdout = child.stdout.take().map(|s| BufReader::new(s).lines());
        let mut stderr = child.stderr.take().map(|s| BufReader::new(s).lines());

        // Kills the child if this future is dropped before startup settles.
        let mut guard = StartupGuard {
            child: &mut child,
            armed: true,
        };

        let deadline = tokio::time::sleep(self.startup_timeout());
        tokio::pin!(deadline);
        let mut exited = false;

        let settled: std::result::Result<StartupSignal, String> = loop {
            tokio::select! {
                () = &mut deadline => break Ok(StartupSignal::TimedOut),
                line = next_line(&mut stdout), if stdout.is_some() => match line {
                    Some(line) => {
                        tracing::trace!(%line, "validator stdout");
                        if line.contains(&self.ready_token) {
                            break Ok(StartupSignal::Listening);
                        }
                    }
                    None => stdout = None,
                },
                line = next_line(&mut stderr), if stderr.is_some() => match line {
                    Some(line) => {
                        if self.error_tokens.iter().any(|token| line.contains(token.as_str())) {
                            break Err(format!("validator reported an error: {}", line.trim()));
                        }
                        tracing::debug!(%line, "validator stderr");
                    }
                    None => stderr = None,
                },
                status = guard.child.wait(), if !exited => match status {
                    Ok(status) if status.success() => {
                        tracing::debug!("Validator exited cleanly during startup");
                        exited = true;
                    }
                    Ok(status) => break Err(exit_message(status)),
                    Err(e) => break Err(format!("failed to wait for the validator: {e}")),
                },
            }
        };

        guard.armed = false;
        drop(guard);

        match settled {
            Ok(startup) => {
                match startup {
                    StartupSignal::Listening => {
                        tracing::info!(?pid, "Local validator is listening")
                    }
                    StartupSignal::TimedOut => tracing::info!(
                        ?pid,
                        timeout_ms = self.startup_timeout_ms,
                        "Local validator started (no error within the startup window)"
                    ),
                }

                let log_task = tokio::spawn(drain_output(stdout, stderr));

                Ok(ValidatorHandle {
                    child,
                    pid,
                    startup,
                    log_task: Some(log_task),
                })
            }
            Err(message) => {
                // The failed child is ours; do not leave it half-started.
                let _ = child.start_kill();
                let _ = child.wait().await;
                Err(OrchestratorError::ValidatorStart(message))
            }
        }
    }
}

struct StartupGuard<'a> {
    child: &'a mut Child,
    armed: bool,
}

impl Drop for StartupGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            tracing::warn!(pid = ?self.child.id(), "Validator startup abandoned, killing it");
            let _ = self.child.start_kill();
        }
    }
}

fn exit_message(status: ExitStatus) -> String {
    format!("validator exited unexpectedly ({status})")
}

async fn next_line<R: AsyncBufRead + Unpin>(lines: &mut Option<Lines<R>>) -> Option<String> {
    match lines {
        Some(lines) => lines.next_line().await.ok().flatten(),
        None => None,
    }
}

/// Forward whatever the validator prints after startup into debug logs.
async fn drain_output(
    mut stdout: Option<Lines<BufReader<ChildStdout>>>,
    mut stderr: Option<Lines<BufReader<ChildStderr>>>,
) {
    while stdout.is_some() || stderr.is_some() {
        tokio::select! {
            line = next_line(&mut stdout), if stdout.is_some() => match line {
                Some(line) => tracing::debug!(%line, "validator stdout"),
                None => stdout = None,
            },
            line = next_line(&mut stderr), if stderr.is_some() => match line {
                Some(line) => tracing::debug!(%line, "validator stderr"),
                None => stderr = None,
            },
        }
    }

    tracing::trace!("Validator output streams closed");
}
