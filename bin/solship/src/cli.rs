use clap::{Parser, Subcommand};
use solship_deploy::wallet::DEFAULT_AIRDROP_SOL;
use tracing::level_filters::LevelFilter;

#[derive(Parser)]
#[command(name = "solship")]
#[command(
    author,
    version,
    about = "Build, deploy and verify an Anchor program in one command"
)]
pub struct Cli {
    /// The verbosity level.
    #[arg(short, long, env = "SOLSHIP_VERBOSITY", default_value_t = LevelFilter::INFO, global = true)]
    pub verbosity: LevelFilter,

    /// Path to a configuration file (or a directory containing `Solship.toml`).
    ///
    /// Without it, `Solship.toml` in the working directory is used when present.
    #[arg(short, long, env = "SOLSHIP_CONFIG", global = true)]
    pub config: Option<String>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Deploy the program (default).
    Deploy(DeployArgs),

    /// Inspect or change the active Solana environment.
    #[command(subcommand)]
    Env(EnvCommand),

    /// Request test SOL from the faucet of the active cluster.
    Airdrop {
        /// Amount of SOL to request.
        #[arg(default_value_t = DEFAULT_AIRDROP_SOL)]
        amount: f64,
    },
}

#[derive(clap::Args, Default)]
pub struct DeployArgs {
    /// Target environment: localnet, devnet, testnet, mainnet-beta or an RPC URL.
    ///
    /// Takes precedence over `SOLANA_ENV`.
    #[arg(short, long)]
    pub env: Option<String>,

    /// Stop the local validator started by this run once it finishes.
    #[arg(long)]
    pub auto_cleanup: bool,
}

#[derive(Subcommand)]
pub enum EnvCommand {
    /// List the well-known environments.
    List,

    /// Show the active endpoint and the wallet balance.
    Show,

    /// Point the Solana CLI at another environment.
    Switch {
        /// localnet, devnet, testnet, mainnet-beta or an RPC URL.
        target: String,
    },
}
