//! Build, deploy and on-chain verification of the Anchor program.

use std::sync::LazyLock;

use derive_more::{Deref, Display, From};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::config::ToolchainConfig;
use crate::error::{DeployFailureKind, OrchestratorError, Result};
use crate::runner::{ToolRunner, failure_text, stderr_text, stdout_text};

/// Marker on the deploy tool's stderr that fails the deployment whatever its exit status.
pub const DEPLOY_ERROR_MARKER: &str = "Error";

/// Marker in the account report of a deployed, executable program.
pub const EXECUTABLE_MARKER: &str = "executable: true";

static PROGRAM_ID_RE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"Program Id: ([A-Za-z0-9]{32,})").ok());

/// Address assigned to a deployed program.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deref, Display, From, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProgramId(String);

impl ProgramId {
    /// Find the program id announced in the deploy tool's output.
    pub fn parse_from_output(output: &str) -> Option<Self> {
        PROGRAM_ID_RE
            .as_ref()?
            .captures(output)
            .and_then(|caps| caps.get(1))
            .map(|id| Self(id.as_str().to_string()))
    }
}

/// Result of the advisory post-deploy check.
#[derive(Debug, Clone, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "kebab-case")]
pub enum VerificationOutcome {
    /// No program id was captured, so there was nothing to check.
    Skipped,
    Executable,
    NotExecutable,
    QueryFailed(String),
}

/// Drives the Anchor and Solana CLIs through the build, deploy and verify stages.
pub struct ProgramPipeline<'a, R> {
    runner: &'a R,
    toolchain: &'a ToolchainConfig,
}

impl<'a, R: ToolRunner> ProgramPipeline<'a, R> {
    pub fn new(runner: &'a R, toolchain: &'a ToolchainConfig) -> Self {
        Self { runner, toolchain }
    }

    /// Run `anchor build` to completion.
    pub async fn build(&self) -> Result<()> {
        tracing::info!("Building program...");

        let output = self
            .runner
            .run(&self.toolchain.anchor_bin, &["build"])
            .await
            .map_err(|e| OrchestratorError::Build(format!("{e:#}")))?;

        if !output.status.success() {
            return Err(OrchestratorError::Build(failure_text(&output)));
        }

        tracing::info!("Program built");
        Ok(())
    }

    /// Run `anchor deploy` and capture the program id it announces.
    ///
    /// An error marker on stderr fails the call even when the tool exits 0. A
    /// successful deployment without a recognisable program id is not an error.
    pub async fn deploy(&self, is_local: bool) -> Result<Option<ProgramId>> {
        tracing::info!("Deploying program...");

        let output = match self.runner.run(&self.toolchain.anchor_bin, &["deploy"]).await {
            Ok(output) => output,
            Err(e) => return Err(deploy_error(format!("{e:#}"), is_local)),
        };

        let stderr = stderr_text(&output);
        if !output.status.success() || stderr.contains(DEPLOY_ERROR_MARKER) {
            return Err(deploy_error(failure_text(&output), is_local));
        }

        let program_id = ProgramId::parse_from_output(&stdout_text(&output));
        match &program_id {
            Some(id) => tracing::info!(program_id = %id, "Program deployed"),
            None => tracing::info!("Program deployed (no program id in the deploy output)"),
        }

        Ok(program_id)
    }

    /// Check that the deployed program account is executable.
    ///
    /// Advisory only: every problem is logged as a warning and reported in the outcome.
    pub async fn verify(&self, program_id: Option<&ProgramId>) -> VerificationOutcome {
        let Some(program_id) = program_id else {
            tracing::debug!("No program id captured, skipping verification");
            return VerificationOutcome::Skipped;
        };

        tracing::info!(%program_id, "Verifying deployment...");

        let output = match self
            .runner
            .run(&self.toolchain.solana_bin, &["account", program_id.as_str()])
            .await
        {
            Ok(output) if output.status.success() => output,
            Ok(output) => {
                let message = failure_text(&output).trim().to_string();
                tracing::warn!(%program_id, error = %message, "Could not query the program account");
                return VerificationOutcome::QueryFailed(message);
            }
            Err(e) => {
                tracing::warn!(%program_id, error = %e, "Could not query the program account");
                return VerificationOutcome::QueryFailed(format!("{e:#}"));
            }
        };

        if stdout_text(&output).contains(EXECUTABLE_MARKER) {
            tracing::info!(%program_id, "Program account is executable");
            VerificationOutcome::Executable
        } else {
            tracing::warn!(%program_id, "Program account is not marked executable");
            VerificationOutcome::NotExecutable
        }
    }
}

fn deploy_error(message: String, is_local: bool) -> OrchestratorError {
    let kind = DeployFailureKind::classify(&message);
    OrchestratorError::Deploy {
        kind,
        message,
        hint: kind.hint(is_local),
    }
}
