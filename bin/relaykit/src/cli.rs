use std::path::PathBuf;

use clap::{Parser, Subcommand};
use relaykit_deploy::{DeploymentMode, PlanKind, RELAYKIT_CONFIG_FILENAME, TargetId};
use tracing::level_filters::LevelFilter;

/// Chains the default configuration knows about.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::EnumString, strum::EnumIter,
)]
#[strum(serialize_all = "kebab-case")]
pub enum KnownChain {
    ArbitrumSepolia,
    OptimismSepolia,
    WatcherVm,
}

impl KnownChain {
    pub fn to_chain_id(&self) -> u64 {
        match self {
            KnownChain::ArbitrumSepolia => 421614,
            KnownChain::OptimismSepolia => 11155420,
            KnownChain::WatcherVm => 3605,
        }
    }

    pub fn plan(&self) -> PlanKind {
        match self {
            KnownChain::WatcherVm => PlanKind::Watcher,
            _ => PlanKind::Core,
        }
    }

    /// Environment variable consulted for the RPC endpoint by `init`.
    pub fn rpc_env(&self) -> &'static str {
        match self {
            KnownChain::ArbitrumSepolia => "ARBITRUM_SEPOLIA_RPC",
            KnownChain::OptimismSepolia => "OPTIMISM_SEPOLIA_RPC",
            KnownChain::WatcherVm => "WATCHER_VM_RPC_URL",
        }
    }

    pub fn default_rpc(&self) -> &'static str {
        match self {
            KnownChain::ArbitrumSepolia => "https://sepolia-rollup.arbitrum.io/rpc",
            KnownChain::OptimismSepolia => "https://sepolia.optimism.io",
            KnownChain::WatcherVm => "http://localhost:8545",
        }
    }

    /// Environment variable holding the deployer key on this chain.
    pub fn signer_key_env(&self) -> &'static str {
        match self {
            KnownChain::WatcherVm => "WATCHER_PRIVATE_KEY",
            _ => relaykit_deploy::DEFAULT_SIGNER_KEY_ENV,
        }
    }
}

/// Parse a target given either as a chain id or a known chain name.
pub fn parse_target(value: &str) -> Result<TargetId, String> {
    if let Ok(id) = value.parse::<u64>() {
        return Ok(TargetId(id));
    }

    value
        .parse::<KnownChain>()
        .map(|chain| TargetId(chain.to_chain_id()))
        .map_err(|_| format!("`{value}` is neither a chain id nor a known chain"))
}

#[derive(Parser)]
#[command(name = "relaykit")]
#[command(
    author,
    version,
    about = "Deploy and wire relay contracts across chains, idempotently"
)]
pub struct Cli {
    /// The verbosity level.
    #[arg(short, long, global = true, env = "RELAYKIT_VERBOSITY", default_value_t = LevelFilter::INFO)]
    pub verbosity: LevelFilter,

    /// Path to the configuration file, or to a directory containing Relaykit.toml.
    #[arg(
        short,
        long,
        global = true,
        alias = "conf",
        env = "RELAYKIT_CONFIG",
        default_value = RELAYKIT_CONFIG_FILENAME
    )]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Deploy every configured target, reusing what the ledger already records.
    Deploy {
        /// Only deploy these targets (chain id or name). May be repeated.
        #[arg(short, long = "target", value_parser = parse_target)]
        targets: Vec<TargetId>,

        /// Write the export documents after the run.
        #[arg(long)]
        export: bool,
    },

    /// Write config.json (and abis.json) from the current ledger.
    Export,

    /// Print the ledger of every target.
    Status,

    /// Write a default configuration file.
    Init {
        /// Where to write the configuration.
        #[arg(default_value = RELAYKIT_CONFIG_FILENAME)]
        path: PathBuf,

        /// Deployment mode of the generated configuration.
        #[arg(long, default_value_t = DeploymentMode::Dev)]
        mode: DeploymentMode,

        /// Overwrite an existing file.
        #[arg(long)]
        force: bool,
    },
}
