//! Deployment configuration.
//!
//! Settings come from three layers, last one wins: built-in defaults, an optional
//! `Solship.toml` file and `SOLSHIP_`-prefixed environment variables. The handful of
//! process-wide variables the pipeline reacts to (`SOLANA_ENV`, `CI`, `AUTO_CLEANUP`)
//! are captured once into a [`ProcessEnv`] and handed to the orchestrator.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

use crate::ValidatorConfig;

/// The default name for the configuration file.
pub const CONFIG_FILENAME: &str = "Solship.toml";

/// Prefix of environment variables that override configuration keys.
pub const ENV_PREFIX: &str = "SOLSHIP_";

/// Variable naming the target environment (a well-known tag or an RPC URL).
pub const TARGET_ENV_VAR: &str = "SOLANA_ENV";
/// Variable set by CI systems.
pub const CI_ENV_VAR: &str = "CI";
/// Variable requesting validator teardown at the end of every run.
pub const AUTO_CLEANUP_ENV_VAR: &str = "AUTO_CLEANUP";

/// Names of the external binaries the pipeline drives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolchainConfig {
    pub solana_bin: String,
    pub anchor_bin: String,
    pub pgrep_bin: String,
}

impl Default for ToolchainConfig {
    fn default() -> Self {
        Self {
            solana_bin: "solana".to_string(),
            anchor_bin: "anchor".to_string(),
            pgrep_bin: "pgrep".to_string(),
        }
    }
}

/// Retry policy of the network readiness probe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReadinessConfig {
    /// Attempts against a local validator, which may still be booting.
    pub local_retries: u32,
    /// Attempts against a remote cluster.
    pub remote_retries: u32,
    /// Fixed delay between attempts.
    pub backoff_ms: u64,
    /// Timeout of a single probe call.
    pub probe_timeout_ms: u64,
}

impl ReadinessConfig {
    pub fn backoff(&self) -> Duration {
        Duration::from_millis(self.backoff_ms)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    /// The attempt budget for a local or remote cluster.
    pub fn retries_for(&self, is_local: bool) -> u32 {
        if is_local {
            self.local_retries
        } else {
            self.remote_retries
        }
    }
}

impl Default for ReadinessConfig {
    fn default() -> Self {
        Self {
            local_retries: 10,
            remote_retries: 5,
            backoff_ms: 2_000,
            probe_timeout_ms: 5_000,
        }
    }
}

/// Settings for environment switching.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnvironmentConfig {
    /// Pause after `solana config set`, whose effect is not immediately visible.
    pub settle_delay_ms: u64,
}

impl EnvironmentConfig {
    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }
}

impl Default for EnvironmentConfig {
    fn default() -> Self {
        Self {
            settle_delay_ms: 1_000,
        }
    }
}

/// Complete configuration of a deployment run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeployConfig {
    pub toolchain: ToolchainConfig,
    pub validator: ValidatorConfig,
    pub readiness: ReadinessConfig,
    pub environment: EnvironmentConfig,
    /// Where to write the JSON deployment receipt, if anywhere.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub receipt: Option<PathBuf>,
}

impl DeployConfig {
    /// Load the configuration.
    ///
    /// An explicit `path` must exist. Without one, `Solship.toml` in the working
    /// directory is used when present.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let file = match path {
            Some(path) => {
                if !path.exists() {
                    anyhow::bail!("Configuration file not found: {}", path.display());
                }
                if path.is_dir() {
                    path.join(CONFIG_FILENAME)
                } else {
                    path.to_path_buf()
                }
            }
            None => PathBuf::from(CONFIG_FILENAME),
        };

        let config: Self = Figment::from(Serialized::defaults(Self::default()))
            .merge(Toml::file(&file))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
            .context(format!("Failed to load configuration from {}", file.display()))?;

        tracing::debug!(path = %file.display(), "Configuration loaded");
        Ok(config)
    }

    /// Save the configuration to a TOML file.
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        let content =
            toml::to_string_pretty(self).context("Failed to serialize configuration to TOML")?;
        std::fs::write(path, content)
            .context(format!("Failed to write config to {}", path.display()))?;
        tracing::info!(path = %path.display(), "Configuration saved");
        Ok(())
    }
}

/// Snapshot of the process-wide variables the pipeline depends on.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessEnv {
    /// Desired target environment, passed through verbatim.
    pub target_override: Option<String>,
    /// Running under continuous integration.
    pub ci: bool,
    /// Operator opted in to tearing the validator down at the end of every run.
    pub auto_cleanup: bool,
}

impl ProcessEnv {
    /// Capture the variables from the real process environment.
    pub fn capture() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build a snapshot from an arbitrary variable lookup.
    ///
    /// Flags count as set when present and non-empty.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let flag = |name: &str| lookup(name).is_some_and(|value| !value.is_empty());

        Self {
            target_override: lookup(TARGET_ENV_VAR).filter(|value| !value.is_empty()),
            ci: flag(CI_ENV_VAR),
            auto_cleanup: flag(AUTO_CLEANUP_ENV_VAR),
        }
    }

    /// Whether a successful run should still tear down the validator it started.
    pub fn cleanup_on_exit(&self) -> bool {
        self.ci || self.auto_cleanup
    }
}
