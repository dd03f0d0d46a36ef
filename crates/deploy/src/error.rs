//! Error types for the deployment pipeline.

use thiserror::Error;

/// Known causes of a failed program deployment, recognised from the deploy tool's output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "kebab-case")]
pub enum DeployFailureKind {
    /// The deployer wallet cannot pay for the deployment.
    InsufficientFunds,
    /// The target RPC endpoint refused the connection.
    ConnectionRefused,
    /// Anything the classifier does not recognise.
    Unclassified,
}

impl DeployFailureKind {
    /// Classify raw tool output into a failure kind.
    pub fn classify(message: &str) -> Self {
        if message.contains("insufficient funds") {
            Self::InsufficientFunds
        } else if message.contains("Connection refused") {
            Self::ConnectionRefused
        } else {
            Self::Unclassified
        }
    }

    /// Remediation hint for this failure kind, which depends on whether the target is local.
    pub fn hint(&self, is_local: bool) -> Option<&'static str> {
        match (self, is_local) {
            (Self::InsufficientFunds, true) => {
                Some("the wallet has insufficient funds; on a local validator run `solana airdrop 10`")
            }
            (Self::InsufficientFunds, false) => Some(
                "the wallet has insufficient funds; fund the deployer wallet on the target cluster before retrying",
            ),
            (Self::ConnectionRefused, true) => {
                Some("cannot reach the network; make sure solana-test-validator is running")
            }
            (Self::ConnectionRefused, false) => Some(
                "cannot reach the network; check that the configured RPC endpoint is reachable",
            ),
            (Self::Unclassified, _) => None,
        }
    }
}

/// Fatal errors that abort a deployment run.
#[derive(Error, Debug)]
pub enum OrchestratorError {
    #[error("Failed to read the active RPC endpoint: {0}")]
    ConfigRead(String),

    #[error("Failed to switch to {target} ({url}): {message}")]
    EnvironmentSwitch {
        target: String,
        url: String,
        message: String,
    },

    #[error("Failed to start the local validator: {0}")]
    ValidatorStart(String),

    #[error("Network did not become ready after {attempts} attempts")]
    NetworkTimeout { attempts: u32 },

    #[error("Program build failed: {0}")]
    Build(String),

    #[error("Program deployment failed ({kind}): {message}{}", .hint.map(|h| format!("\nhint: {h}")).unwrap_or_default())]
    Deploy {
        kind: DeployFailureKind,
        message: String,
        hint: Option<&'static str>,
    },
}

pub type Result<T> = std::result::Result<T, OrchestratorError>;
