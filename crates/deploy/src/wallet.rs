//! Deployer wallet queries: balance and faucet airdrops.

use anyhow::{Context, Result};

use crate::cluster::ClusterInfo;
use crate::config::ToolchainConfig;
use crate::runner::{ToolRunner, failure_text, stdout_text};

/// Default airdrop amount, in SOL.
pub const DEFAULT_AIRDROP_SOL: f64 = 2.0;

const RATE_LIMIT_MARKER: &str = "airdrop request limit";

/// The wallet configured in the Solana CLI.
pub struct Wallet<'a, R> {
    runner: &'a R,
    toolchain: &'a ToolchainConfig,
}

impl<'a, R: ToolRunner> Wallet<'a, R> {
    pub fn new(runner: &'a R, toolchain: &'a ToolchainConfig) -> Self {
        Self { runner, toolchain }
    }

    /// Current balance as reported by `solana balance`, e.g. `4.5 SOL`.
    pub async fn balance(&self) -> Result<String> {
        let output = self
            .runner
            .run(&self.toolchain.solana_bin, &["balance"])
            .await
            .context("Failed to query wallet balance")?;

        if !output.status.success() {
            anyhow::bail!("Failed to query wallet balance: {}", failure_text(&output).trim());
        }

        Ok(stdout_text(&output).trim().to_string())
    }

    /// Request `amount` SOL from the cluster's faucet.
    ///
    /// Refused on networks where funds are real.
    pub async fn airdrop(&self, cluster: &ClusterInfo, amount: f64) -> Result<String> {
        let funded = cluster
            .name
            .descriptor()
            .is_some_and(|env| env.requires_funds);
        if funded {
            anyhow::bail!("Airdrops are not available on {}", cluster.name);
        }

        let amount = amount.to_string();
        tracing::info!(cluster = %cluster.name, %amount, "Requesting airdrop...");

        let output = self
            .runner
            .run(&self.toolchain.solana_bin, &["airdrop", &amount])
            .await
            .context("Failed to request airdrop")?;

        if !output.status.success() {
            let message = failure_text(&output);
            if message.contains(RATE_LIMIT_MARKER) {
                anyhow::bail!(
                    "Airdrop rate limit reached: {}\nhint: wait a few minutes or use https://faucet.solana.com",
                    message.trim()
                );
            }
            anyhow::bail!("Airdrop failed: {}", message.trim());
        }

        let balance = self.balance().await?;
        tracing::info!(%balance, "Airdrop complete");
        Ok(balance)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::testing::{FakeToolchain, ok_output, output};

    #[tokio::test]
    async fn test_airdrop_reports_new_balance() {
        let fake = FakeToolchain::new("https://api.devnet.solana.com")
            .script("solana airdrop 2", ok_output("Signature: 5VERv8NMvzbJMEkV8xnrLkEaWRt\n\n2 SOL\n"))
            .script("solana balance", ok_output("2 SOL\n"));
        let toolchain = ToolchainConfig::default();
        let cluster = ClusterInfo::from_url("https://api.devnet.solana.com");

        let balance = Wallet::new(&fake, &toolchain)
            .airdrop(&cluster, DEFAULT_AIRDROP_SOL)
            .await
            .unwrap();

        assert_eq!(balance, "2 SOL");
    }

    #[tokio::test]
    async fn test_airdrop_refused_on_mainnet() {
        let fake = FakeToolchain::new("https://api.mainnet-beta.solana.com");
        let toolchain = ToolchainConfig::default();
        let cluster = ClusterInfo::from_url("https://api.mainnet-beta.solana.com");

        let err = Wallet::new(&fake, &toolchain).airdrop(&cluster, 1.0).await.unwrap_err();

        assert!(err.to_string().contains("not available"));
        assert_eq!(fake.count("solana airdrop"), 0);
    }

    #[tokio::test]
    async fn test_airdrop_rate_limit_hint() {
        let fake = FakeToolchain::new("https://api.devnet.solana.com").script(
            "solana airdrop 1.5",
            output(1, "", "Error: airdrop request limit reached for today\n"),
        );
        let toolchain = ToolchainConfig::default();
        let cluster = ClusterInfo::from_url("https://api.devnet.solana.com");

        let err = Wallet::new(&fake, &toolchain).airdrop(&cluster, 1.5).await.unwrap_err();

        assert!(err.to_string().contains("faucet.solana.com"));
    }
}
