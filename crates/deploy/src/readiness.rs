//! Network readiness probing with a fixed backoff.

use std::sync::atomic::{AtomicU32, Ordering};

use anyhow::Context;
use backon::{ConstantBuilder, Retryable};

use crate::config::{ReadinessConfig, ToolchainConfig};
use crate::error::{OrchestratorError, Result};
use crate::runner::{ToolRunner, failure_text, stdout_text};

/// Probes the active cluster until it answers a version query.
pub struct NetworkProbe<'a, R> {
    runner: &'a R,
    toolchain: &'a ToolchainConfig,
    config: &'a ReadinessConfig,
}

impl<'a, R: ToolRunner> NetworkProbe<'a, R> {
    pub fn new(runner: &'a R, toolchain: &'a ToolchainConfig, config: &'a ReadinessConfig) -> Self {
        Self {
            runner,
            toolchain,
            config,
        }
    }

    /// A single bounded `solana cluster-version` call.
    async fn probe_once(&self) -> anyhow::Result<String> {
        let output = self
            .runner
            .run_with_timeout(
                &self.toolchain.solana_bin,
                &["cluster-version"],
                self.config.probe_timeout(),
            )
            .await
            .context("cluster-version query failed")?;

        if !output.status.success() {
            anyhow::bail!("cluster-version exited with {}: {}", output.status, failure_text(&output).trim());
        }

        Ok(stdout_text(&output).trim().to_string())
    }

    /// Wait until the network answers, making at most `max_retries` attempts.
    ///
    /// Attempts are spaced by the configured backoff; there is no wait after the
    /// last one. Returns the number of attempts that were made.
    pub async fn wait_for_network(&self, max_retries: u32) -> Result<u32> {
        let max_retries = max_retries.max(1);
        let attempts = AtomicU32::new(0);

        tracing::info!(max_retries, "Waiting for the network to be ready...");

        let backoff = ConstantBuilder::default()
            .with_delay(self.config.backoff())
            .with_max_times((max_retries - 1) as usize);

        let counter = &attempts;
        let result = (|| async move {
            counter.fetch_add(1, Ordering::SeqCst);
            self.probe_once().await
        })
        .retry(backoff)
        .sleep(tokio::time::sleep)
        .notify(|err: &anyhow::Error, delay| {
            tracing::debug!(
                attempt = attempts.load(Ordering::SeqCst),
                max_retries,
                error = %err,
                retry_in_ms = delay.as_millis() as u64,
                "Network not ready yet"
            );
        })
        .await;

        let attempts = attempts.load(Ordering::SeqCst);

        match result {
            Ok(version) => {
                tracing::info!(attempts, %version, "Network is ready");
                Ok(attempts)
            }
            Err(e) => {
                tracing::error!(attempts, error = %e, "Network never became ready");
                Err(OrchestratorError::NetworkTimeout { attempts })
            }
        }
    }
}
