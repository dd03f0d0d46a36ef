//! solship deploys an Anchor program to a local or remote Solana cluster in one command.

mod cli;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;
use comfy_table::{Table, presets::UTF8_FULL};

use cli::{Cli, Command, DeployArgs, EnvCommand};
use solship_deploy::{
    DeployConfig, DeploymentOrchestrator, ENVIRONMENTS, EnvironmentResolver, ProcessEnv,
    TargetEnvironment, Termination, TokioToolRunner, Wallet, shutdown_signal,
};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize the logger.
    tracing_subscriber::fmt()
        .with_max_level(cli.verbosity)
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = DeployConfig::load(cli.config.as_deref().map(PathBuf::from).as_deref())?;

    match cli.command.unwrap_or(Command::Deploy(DeployArgs::default())) {
        Command::Deploy(args) => deploy(config, args).await,
        Command::Env(EnvCommand::List) => list_environments(&config).await,
        Command::Env(EnvCommand::Show) => show_environment(&config).await,
        Command::Env(EnvCommand::Switch { target }) => switch_environment(&config, &target).await,
        Command::Airdrop { amount } => airdrop(&config, amount).await,
    }
}

async fn deploy(config: DeployConfig, args: DeployArgs) -> Result<()> {
    let mut env = ProcessEnv::capture();
    if let Some(target) = args.env {
        env.target_override = Some(target);
    }
    env.auto_cleanup |= args.auto_cleanup;

    tracing::debug!(?env, "Process environment captured");

    let mut orchestrator = DeploymentOrchestrator::new(TokioToolRunner::new(), config, env);

    match orchestrator.run_until(shutdown_signal()).await? {
        Termination::Completed(report) => {
            tracing::debug!(stages = ?report.stages, verification = %report.verification, "Run finished");
        }
        Termination::Interrupted(signal) => {
            tracing::info!(%signal, "Shut down gracefully");
        }
    }

    Ok(())
}

async fn list_environments(config: &DeployConfig) -> Result<()> {
    let runner = TokioToolRunner::new();
    let current = match EnvironmentResolver::new(&runner, &config.toolchain, &config.environment)
        .current_cluster()
        .await
    {
        Ok(cluster) => Some(cluster),
        Err(e) => {
            tracing::warn!(error = %e, "Could not determine the current environment");
            None
        }
    };

    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(vec!["", "Environment", "Tag", "RPC URL", "Description"]);

    for env in ENVIRONMENTS {
        let marker = if current.as_ref().is_some_and(|c| c.name == env.tag) {
            "*"
        } else {
            ""
        };
        table.add_row(vec![
            marker.to_string(),
            env.display_name.to_string(),
            env.tag.to_string(),
            env.url.to_string(),
            env.description.to_string(),
        ]);
    }

    println!("{table}");

    if let Some(current) = current.filter(|c| c.name.descriptor().is_none()) {
        println!("Current endpoint is custom: {}", current.url);
    }

    Ok(())
}

async fn show_environment(config: &DeployConfig) -> Result<()> {
    let runner = TokioToolRunner::new();
    let cluster = EnvironmentResolver::new(&runner, &config.toolchain, &config.environment)
        .current_cluster()
        .await?;

    println!("Cluster:  {}", cluster.name);
    println!("RPC URL:  {}", cluster.url);
    println!("Local:    {}", cluster.is_local);

    match Wallet::new(&runner, &config.toolchain).balance().await {
        Ok(balance) => println!("Balance:  {balance}"),
        Err(e) => tracing::warn!(error = %e, "Could not read the wallet balance"),
    }

    Ok(())
}

async fn switch_environment(config: &DeployConfig, target: &str) -> Result<()> {
    let runner = TokioToolRunner::new();
    let target = TargetEnvironment::parse(target);

    if target.requires_funds() {
        tracing::warn!("Switching to mainnet: deployments there spend real SOL!");
    }

    let resolver = EnvironmentResolver::new(&runner, &config.toolchain, &config.environment);
    resolver.switch_to(&target).await?;
    let cluster = resolver.current_cluster().await?;

    println!("Now on {} ({})", cluster.name, cluster.url);
    Ok(())
}

async fn airdrop(config: &DeployConfig, amount: f64) -> Result<()> {
    let runner = TokioToolRunner::new();
    let cluster = EnvironmentResolver::new(&runner, &config.toolchain, &config.environment)
        .current_cluster()
        .await?;

    let balance = Wallet::new(&runner, &config.toolchain)
        .airdrop(&cluster, amount)
        .await?;

    println!("Balance: {balance}");
    Ok(())
}
