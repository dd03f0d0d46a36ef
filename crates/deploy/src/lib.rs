//! solship-deploy - Deployment orchestration for Anchor programs.
//!
//! This crate drives the Solana and Anchor CLIs through a complete deployment:
//! resolving the target cluster, supervising a local validator, waiting for the
//! network, then building, deploying and verifying the program.

pub mod cluster;
pub mod config;
pub mod environment;
pub mod error;
pub mod orchestrator;
pub mod program;
pub mod readiness;
pub mod receipt;
pub mod runner;
pub mod services;
pub mod signals;
pub mod wallet;

#[cfg(all(test, unix))]
mod testing;

pub use cluster::{
    ClusterInfo, ENVIRONMENTS, EnvironmentDescriptor, EnvironmentTag, TargetEnvironment,
    url_for_environment,
};
pub use config::{DeployConfig, ProcessEnv};
pub use environment::EnvironmentResolver;
pub use error::{DeployFailureKind, OrchestratorError};
pub use orchestrator::{DeploymentOrchestrator, DeploymentReport, DeploymentStage, Termination};
pub use program::{ProgramId, VerificationOutcome};
pub use runner::{TokioToolRunner, ToolRunner};
pub use services::{CleanupOutcome, StartupSignal, ValidatorConfig, ValidatorHandle};
pub use signals::{ShutdownSignal, shutdown_signal};
pub use wallet::Wallet;
