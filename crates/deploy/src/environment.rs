//! Resolution and switching of the Solana CLI's active cluster.

use crate::cluster::{ClusterInfo, TargetEnvironment, parse_rpc_url};
use crate::config::{EnvironmentConfig, ProcessEnv, TARGET_ENV_VAR, ToolchainConfig};
use crate::error::{OrchestratorError, Result};
use crate::runner::{ToolRunner, failure_text, stdout_text};

/// The target environment requested through the process environment, if any.
pub fn resolve_target(env: &ProcessEnv) -> Option<TargetEnvironment> {
    let value = env.target_override.as_deref()?;
    tracing::info!(var = TARGET_ENV_VAR, value, "Target environment override detected");
    Some(TargetEnvironment::parse(value))
}

/// Reads and changes the cluster the Solana CLI points at.
pub struct EnvironmentResolver<'a, R> {
    runner: &'a R,
    toolchain: &'a ToolchainConfig,
    config: &'a EnvironmentConfig,
}

impl<'a, R: ToolRunner> EnvironmentResolver<'a, R> {
    pub fn new(runner: &'a R, toolchain: &'a ToolchainConfig, config: &'a EnvironmentConfig) -> Self {
        Self {
            runner,
            toolchain,
            config,
        }
    }

    /// Read the active endpoint from `solana config get` and classify it.
    pub async fn current_cluster(&self) -> Result<ClusterInfo> {
        tracing::debug!("Reading Solana CLI configuration...");

        let output = self
            .runner
            .run(&self.toolchain.solana_bin, &["config", "get"])
            .await
            .map_err(|e| OrchestratorError::ConfigRead(format!("{e:#}")))?;

        if !output.status.success() {
            return Err(OrchestratorError::ConfigRead(failure_text(&output)));
        }

        let url = parse_rpc_url(&stdout_text(&output)).ok_or_else(|| {
            OrchestratorError::ConfigRead("no `RPC URL:` line in `solana config get` output".to_string())
        })?;

        let cluster = ClusterInfo::from_url(url);
        tracing::info!(cluster = %cluster.name, url = %cluster.url, "Current cluster");
        Ok(cluster)
    }

    /// Point the Solana CLI at `target`, then give the new setting time to settle.
    pub async fn switch_to(&self, target: &TargetEnvironment) -> Result<()> {
        let url = target.url();
        tracing::info!(target = %target, %url, "Switching environment...");

        let switch_error = |message: String| OrchestratorError::EnvironmentSwitch {
            target: target.to_string(),
            url: url.clone(),
            message,
        };

        let output = self
            .runner
            .run(&self.toolchain.solana_bin, &["config", "set", "--url", &url])
            .await
            .map_err(|e| switch_error(format!("{e:#}")))?;

        if !output.status.success() {
            return Err(switch_error(failure_text(&output)));
        }

        tracing::info!(target = %target, %url, "Switched environment");
        tokio::time::sleep(self.config.settle_delay()).await;

        Ok(())
    }

    /// Make sure the CLI points at `target`, switching if needed.
    ///
    /// Without a target the current cluster is returned untouched. Switching to the
    /// production network only logs an advisory; it is never gated on confirmation.
    pub async fn ensure_correct_environment(
        &self,
        target: Option<&TargetEnvironment>,
    ) -> Result<ClusterInfo> {
        let current = self.current_cluster().await?;

        let Some(target) = target else {
            return Ok(current);
        };

        if target.matches(&current) {
            tracing::info!(target = %target, "Environment already matches target");
            return Ok(current);
        }

        tracing::warn!(
            current = %current.name,
            target = %target,
            "Current environment does not match the target"
        );

        if target.requires_funds() {
            tracing::warn!("About to switch to mainnet: deployments there spend real SOL!");
        }

        self.switch_to(target).await?;
        self.current_cluster().await
    }
}
