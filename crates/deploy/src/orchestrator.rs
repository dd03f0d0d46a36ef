//! The deployment pipeline: environment, validator, readiness, build, deploy, verify.
//!
//! A run walks a fixed, linear sequence of stages:
//!
//! ```text
//! Start -> EnvironmentResolved -> [ValidatorReady] -> NetworkReady -> Built -> Deployed -> Verified -> Done
//! ```
//!
//! `ValidatorReady` is only visited for local clusters. Any fatal error moves the
//! run to `Aborted`. Whatever the outcome, the cleanup policy runs before the
//! result is handed back.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;

use crate::cluster::ClusterInfo;
use crate::config::{DeployConfig, ProcessEnv};
use crate::environment::{EnvironmentResolver, resolve_target};
use crate::error::Result;
use crate::program::{ProgramId, ProgramPipeline, VerificationOutcome};
use crate::readiness::NetworkProbe;
use crate::receipt::DeploymentReceipt;
use crate::runner::ToolRunner;
use crate::services::validator::{self, CleanupOutcome, ValidatorHandle};
use crate::signals::ShutdownSignal;

/// Hints printed whenever a run aborts.
pub const TROUBLESHOOTING: [&str; 4] = [
    "Check the network and RPC configuration (`solana config get`)",
    "Make sure the deployer wallet is funded (`solana balance`)",
    "Check that the Solana and Anchor CLI versions are compatible",
    "Re-run with `-v debug` for detailed logs",
];

/// Stages of a deployment run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum DeploymentStage {
    Start,
    EnvironmentResolved,
    ValidatorReady,
    NetworkReady,
    Built,
    Deployed,
    Verified,
    Done,
    Aborted,
}

/// Summary of a successful run.
#[derive(Debug, Clone, PartialEq)]
pub struct DeploymentReport {
    pub cluster: ClusterInfo,
    pub program_id: Option<ProgramId>,
    pub elapsed: Duration,
    pub verification: VerificationOutcome,
    /// Every stage the run went through, in order.
    pub stages: Vec<DeploymentStage>,
    /// Pid of the validator this run started and left running, if any.
    pub validator_pid: Option<u32>,
}

/// How a signal-aware run ended.
#[derive(Debug)]
pub enum Termination {
    Completed(DeploymentReport),
    Interrupted(ShutdownSignal),
}

#[derive(Debug, Default)]
struct DeploymentRun {
    cluster: Option<ClusterInfo>,
    program_id: Option<ProgramId>,
    verification: Option<VerificationOutcome>,
    /// The validator started by this run. Written once, read by cleanup and the summary.
    validator: Option<ValidatorHandle>,
    stages: Vec<DeploymentStage>,
}

impl DeploymentRun {
    fn advance(&mut self, stage: DeploymentStage) {
        tracing::debug!(from = ?self.stages.last(), to = %stage, "Deployment stage");
        self.stages.push(stage);
    }
}

/// Drives a deployment from environment resolution to verification.
pub struct DeploymentOrchestrator<R> {
    runner: R,
    config: DeployConfig,
    env: ProcessEnv,
    run: DeploymentRun,
}

impl<R: ToolRunner> DeploymentOrchestrator<R> {
    pub fn new(runner: R, config: DeployConfig, env: ProcessEnv) -> Self {
        Self {
            runner,
            config,
            env,
            run: DeploymentRun::default(),
        }
    }

    pub fn runner(&self) -> &R {
        &self.runner
    }

    /// Stages visited by the current or last run.
    pub fn stages(&self) -> &[DeploymentStage] {
        &self.run.stages
    }

    /// Pid of the validator owned by this run, if it still holds one.
    pub fn validator_pid(&self) -> Option<u32> {
        self.run.validator.as_ref().and_then(ValidatorHandle::pid)
    }

    /// Run the whole pipeline once.
    ///
    /// The first fatal error aborts the remaining stages and is returned after
    /// the cleanup policy has run.
    pub async fn deploy(&mut self) -> Result<DeploymentReport> {
        let started = Instant::now();
        let previous = std::mem::take(&mut self.run.validator);
        self.run = DeploymentRun {
            validator: previous,
            ..DeploymentRun::default()
        };
        self.run.advance(DeploymentStage::Start);

        tracing::info!("Starting deployment...");

        let result = self.run_stages().await;
        let elapsed = started.elapsed();

        let result = match result {
            Ok(()) => {
                self.run.advance(DeploymentStage::Done);
                Ok(self.complete(elapsed))
            }
            Err(e) => {
                self.run.advance(DeploymentStage::Aborted);
                tracing::error!(
                    elapsed_secs = elapsed.as_secs_f64(),
                    error = %e,
                    "Deployment failed"
                );
                tracing::error!("Troubleshooting:");
                for hint in TROUBLESHOOTING {
                    tracing::error!("  - {hint}");
                }
                Err(e)
            }
        };

        self.finalize().await;

        let mut report = result?;
        report.validator_pid = self.validator_pid();
        self.write_receipt(&report);
        Ok(report)
    }

    async fn run_stages(&mut self) -> Result<()> {
        let target = resolve_target(&self.env);

        let cluster = EnvironmentResolver::new(
            &self.runner,
            &self.config.toolchain,
            &self.config.environment,
        )
        .ensure_correct_environment(target.as_ref())
        .await?;
        self.run.cluster = Some(cluster.clone());
        self.run.advance(DeploymentStage::EnvironmentResolved);

        if cluster.is_local {
            self.ensure_validator().await?;
            self.run.advance(DeploymentStage::ValidatorReady);
        }

        NetworkProbe::new(&self.runner, &self.config.toolchain, &self.config.readiness)
            .wait_for_network(self.config.readiness.retries_for(cluster.is_local))
            .await?;
        self.run.advance(DeploymentStage::NetworkReady);

        let pipeline = ProgramPipeline::new(&self.runner, &self.config.toolchain);

        pipeline.build().await?;
        self.run.advance(DeploymentStage::Built);

        self.run.program_id = pipeline.deploy(cluster.is_local).await?;
        self.run.advance(DeploymentStage::Deployed);

        let verification = pipeline.verify(self.run.program_id.as_ref()).await;
        self.run.verification = Some(verification);
        self.run.advance(DeploymentStage::Verified);

        Ok(())
    }

    /// Reuse a running validator or start one owned by this run.
    async fn ensure_validator(&mut self) -> Result<()> {
        if self.run.validator.is_some() {
            tracing::info!(pid = ?self.validator_pid(), "Reusing the validator started earlier");
            return Ok(());
        }

        let validator = &self.config.validator;
        if validator
            .is_running(&self.runner, &self.config.toolchain.pgrep_bin)
            .await
        {
            tracing::info!("Local validator already running");
            return Ok(());
        }

        tracing::info!("No local validator detected");
        let handle = validator.start(&self.runner).await?;
        self.run.validator = Some(handle);
        Ok(())
    }

    fn complete(&self, elapsed: Duration) -> DeploymentReport {
        let run = &self.run;
        tracing::info!(
            elapsed_secs = elapsed.as_secs_f64(),
            "Deployment complete!"
        );

        let cluster = run
            .cluster
            .clone()
            .unwrap_or_else(|| ClusterInfo::from_url(String::new()));

        if let Some(program_id) = &run.program_id {
            tracing::info!("");
            tracing::info!("=== Deployment summary ===");
            tracing::info!("Cluster:     {}", cluster.name);
            tracing::info!("Program Id:  {}", program_id);
            tracing::info!("RPC URL:     {}", cluster.url);
        }

        DeploymentReport {
            cluster,
            program_id: run.program_id.clone(),
            elapsed,
            verification: run
                .verification
                .clone()
                .unwrap_or(VerificationOutcome::Skipped),
            stages: run.stages.clone(),
            validator_pid: None,
        }
    }

    /// Persist the receipt of a successful run, once the cleanup policy has run.
    fn write_receipt(&self, report: &DeploymentReport) {
        let Some(path) = &self.config.receipt else {
            return;
        };

        let receipt = DeploymentReceipt::new(
            &report.cluster,
            report.program_id.as_ref(),
            report.elapsed,
            report.validator_pid,
        );
        if let Err(e) = receipt.write_to(path) {
            tracing::warn!(error = %e, "Failed to write the deployment receipt");
        }
    }

    /// Apply the cleanup policy at the end of a run.
    async fn finalize(&mut self) {
        if self.env.cleanup_on_exit() {
            self.shutdown().await;
        } else if let Some(pid) = self.validator_pid() {
            tracing::info!(pid, "Local validator left running; stop it with `kill {pid}` when done");
        }
    }

    /// Stop the validator owned by this run, if any.
    ///
    /// Safe to call any number of times, from the normal exit path or a signal handler.
    pub async fn shutdown(&mut self) -> CleanupOutcome {
        validator::cleanup(&mut self.run.validator, self.config.validator.shutdown_grace()).await
    }

    /// Run [`Self::deploy`] until it finishes or `signal` fires.
    ///
    /// An interrupted run is cut short at its current stage and the validator it
    /// owns is stopped, whatever the cleanup policy says.
    pub async fn run_until<F>(&mut self, signal: F) -> Result<Termination>
    where
        F: Future<Output = ShutdownSignal>,
    {
        let received = tokio::select! {
            result = self.deploy() => return result.map(Termination::Completed),
            received = signal => received,
        };

        tracing::warn!(signal = %received, stage = ?self.run.stages.last(), "Deployment interrupted");
        self.shutdown().await;
        Ok(Termination::Interrupted(received))
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::error::OrchestratorError;
    use crate::services::ValidatorConfig;
    use crate::testing::{FakeToolchain, ok_output, output};

    use DeploymentStage::*;

    const PROGRAM_ID: &str = "Fg6PaFpoGXkYsidMpWTK6W2BeZ7FEfcYkg476zPFsLnS";

    fn config() -> DeployConfig {
        DeployConfig {
            validator: ValidatorConfig {
                startup_timeout_ms: 1_000,
                shutdown_grace_ms: 500,
                ..ValidatorConfig::default()
            },
            ..DeployConfig::default()
        }
    }

    fn env(target: Option<&str>, ci: bool) -> ProcessEnv {
        ProcessEnv {
            target_override: target.map(str::to_string),
            ci,
            auto_cleanup: false,
        }
    }

    fn healthy(fake: FakeToolchain) -> FakeToolchain {
        fake.script("solana cluster-version", ok_output("1.18.26\n"))
            .script("anchor deploy", ok_output(&format!("Program Id: {PROGRAM_ID}\n\nDeploy success\n")))
            .script(&format!("solana account {PROGRAM_ID}"), ok_output("executable: true\n"))
    }

    #[tokio::test]
    async fn test_local_run_starts_validator_and_leaves_it_running() {
        let fake = healthy(FakeToolchain::new("http://127.0.0.1:8899"))
            .script("pgrep -f solana-test-validator", output(1, "", ""))
            .spawns("echo 'Listening on 8899'; sleep 30");
        let mut orchestrator = DeploymentOrchestrator::new(fake, config(), env(Some("localnet"), false));

        let report = orchestrator.deploy().await.unwrap();

        assert_eq!(
            report.stages,
            vec![Start, EnvironmentResolved, ValidatorReady, NetworkReady, Built, Deployed, Verified, Done]
        );
        assert_eq!(report.program_id.as_deref().map(String::as_str), Some(PROGRAM_ID));
        assert_eq!(report.verification, VerificationOutcome::Executable);
        assert!(report.validator_pid.is_some());
        assert_eq!(orchestrator.runner().count("solana config set"), 0);
        assert_eq!(orchestrator.runner().count("spawn solana-test-validator"), 1);

        assert_eq!(orchestrator.shutdown().await, CleanupOutcome::Exited);
        assert_eq!(orchestrator.shutdown().await, CleanupOutcome::NotOwned);
    }

    #[tokio::test]
    async fn test_running_validator_is_not_owned() {
        let fake = healthy(FakeToolchain::new("http://localhost:8899"))
            .script("pgrep -f solana-test-validator", ok_output("4242\n"));
        let mut orchestrator = DeploymentOrchestrator::new(fake, config(), env(None, true));

        let report = orchestrator.deploy().await.unwrap();

        assert!(report.stages.contains(&ValidatorReady));
        assert_eq!(report.validator_pid, None);
        assert_eq!(orchestrator.runner().count("spawn"), 0);
    }

    #[tokio::test]
    async fn test_remote_run_skips_validator() {
        let fake = healthy(FakeToolchain::new("http://127.0.0.1:8899"));
        let mut orchestrator = DeploymentOrchestrator::new(fake, config(), env(Some("devnet"), false));

        let report = orchestrator.deploy().await.unwrap();

        assert_eq!(
            report.stages,
            vec![Start, EnvironmentResolved, NetworkReady, Built, Deployed, Verified, Done]
        );
        assert_eq!(report.cluster.url, "https://api.devnet.solana.com");
        assert_eq!(orchestrator.runner().count("solana config set"), 1);
        assert_eq!(orchestrator.runner().count("pgrep"), 0);
    }

    #[tokio::test]
    async fn test_build_failure_aborts_before_deploy() {
        let fake = healthy(FakeToolchain::new("https://api.devnet.solana.com"))
            .script("anchor build", output(1, "", "error: could not compile `counter`\n"));
        let mut orchestrator = DeploymentOrchestrator::new(fake, config(), env(None, false));

        let err = orchestrator.deploy().await.unwrap_err();

        assert!(matches!(err, OrchestratorError::Build(_)));
        assert_eq!(orchestrator.stages().last(), Some(&Aborted));
        assert!(!orchestrator.stages().contains(&Built));
        assert_eq!(orchestrator.runner().count("anchor deploy"), 0);
        assert_eq!(orchestrator.runner().count("solana account"), 0);
    }

    #[tokio::test]
    async fn test_config_read_failure_aborts_before_switch() {
        let fake = FakeToolchain::without_rpc_url();
        let mut orchestrator = DeploymentOrchestrator::new(fake, config(), env(Some("devnet"), false));

        let err = orchestrator.deploy().await.unwrap_err();

        assert!(matches!(err, OrchestratorError::ConfigRead(_)));
        assert_eq!(orchestrator.stages(), &[Start, Aborted]);
        assert_eq!(orchestrator.runner().count("solana config set"), 0);
    }

    #[tokio::test]
    async fn test_validator_spawn_failure_aborts_before_readiness() {
        let fake = healthy(FakeToolchain::new("http://127.0.0.1:8899"))
            .script("pgrep -f solana-test-validator", output(1, "", ""));
        let mut orchestrator = DeploymentOrchestrator::new(fake, config(), env(Some("localnet"), false));

        let err = orchestrator.deploy().await.unwrap_err();

        assert!(matches!(err, OrchestratorError::ValidatorStart(_)));
        assert_eq!(orchestrator.stages(), &[Start, EnvironmentResolved, Aborted]);
        assert_eq!(orchestrator.runner().count("solana cluster-version"), 0);
        assert_eq!(orchestrator.runner().count("anchor"), 0);
        assert_eq!(orchestrator.validator_pid(), None);
    }

    #[tokio::test]
    async fn test_unverified_deployment_still_succeeds() {
        let fake = FakeToolchain::new("https://api.devnet.solana.com")
            .script("solana cluster-version", ok_output("1.18.26\n"))
            .script("anchor deploy", ok_output(&format!("Program Id: {PROGRAM_ID}\n")))
            .script(&format!("solana account {PROGRAM_ID}"), output(1, "", "Error: AccountNotFound"));
        let mut orchestrator = DeploymentOrchestrator::new(fake, config(), env(None, false));

        let report = orchestrator.deploy().await.unwrap();

        assert!(matches!(report.verification, VerificationOutcome::QueryFailed(_)));
        assert_eq!(report.stages.last(), Some(&Done));
    }

    #[tokio::test]
    async fn test_ci_cleans_up_after_failure() {
        let fake = FakeToolchain::new("http://127.0.0.1:8899")
            .script("pgrep -f solana-test-validator", output(1, "", ""))
            .script("solana cluster-version", ok_output("1.18.26\n"))
            .script("anchor deploy", output(1, "", "Error: Account has insufficient funds for spend"))
            .spawns("echo Listening; sleep 30");
        let mut orchestrator = DeploymentOrchestrator::new(fake, config(), env(Some("localnet"), true));

        let err = orchestrator.deploy().await.unwrap_err();

        assert!(err.to_string().contains("solana airdrop"));
        assert_eq!(orchestrator.validator_pid(), None);
        assert_eq!(orchestrator.shutdown().await, CleanupOutcome::NotOwned);
    }

    #[tokio::test]
    async fn test_interrupt_stops_owned_validator() {
        // The validator comes up, then the readiness probe keeps failing until the signal fires.
        let fake = FakeToolchain::new("http://127.0.0.1:8899")
            .script("pgrep -f solana-test-validator", output(1, "", ""))
            .script("solana cluster-version", output(1, "", "Error: Connection refused"))
            .spawns("echo Listening; sleep 30");
        let mut orchestrator = DeploymentOrchestrator::new(fake, config(), env(None, false));

        let termination = orchestrator
            .run_until(async {
                tokio::time::sleep(Duration::from_millis(500)).await;
                ShutdownSignal::Interrupt
            })
            .await
            .unwrap();

        assert!(matches!(termination, Termination::Interrupted(ShutdownSignal::Interrupt)));
        assert_eq!(orchestrator.validator_pid(), None);
        assert!(!orchestrator.stages().contains(&NetworkReady));
        assert_eq!(orchestrator.runner().count("anchor build"), 0);
    }
}
