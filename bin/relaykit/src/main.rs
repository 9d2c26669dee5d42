//! relaykit deploys and wires the relay contract suite on every configured chain.

mod cli;
mod summary;

use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use alloy_signer_local::PrivateKeySigner;
use anyhow::{Context, Result};
use clap::Parser;
use strum::IntoEnumIterator;

use cli::{Cli, Command, KnownChain};
use relaykit_deploy::{
    ChainTransport, Deployer, DeployerBuilder, DeploymentMode, Orchestrator, RpcTransport,
    TargetConfig, TargetId, TargetSpec, create_client,
    export::{abi_bundle, build_export, write_exports},
};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize the logger.
    tracing_subscriber::fmt()
        .with_max_level(cli.verbosity)
        .init();

    match cli.command {
        Command::Init { path, mode, force } => init(&path, mode, force),
        Command::Deploy { targets, export } => {
            let deployer = Deployer::load_from_file(&cli.config)?;
            deploy(&deployer, &targets, export).await
        }
        Command::Export => export(&Deployer::load_from_file(&cli.config)?),
        Command::Status => {
            let deployer = Deployer::load_from_file(&cli.config)?;
            let ledger = deployer.ledger_store().load_all()?;
            println!("{}", summary::ledger_table(&ledger));
            Ok(())
        }
    }
}

fn init(path: &Path, mode: DeploymentMode, force: bool) -> Result<()> {
    if path.exists() && !force {
        anyhow::bail!(
            "{} already exists, pass --force to overwrite it",
            path.display()
        );
    }

    let mut builder = DeployerBuilder::new().mode(mode);
    for chain in KnownChain::iter() {
        let rpc_url = std::env::var(chain.rpc_env())
            .unwrap_or_else(|_| chain.default_rpc().to_string())
            .parse()
            .context(format!("Invalid RPC URL in {}", chain.rpc_env()))?;

        let mut target = TargetConfig::new(chain.to_chain_id(), rpc_url, chain.plan());
        target.signer_key_env = chain.signer_key_env().to_string();
        builder = builder.target_config(target);
    }

    let deployer = builder.build()?;
    deployer.save_to_file(path)
}

/// Read the deployer key of `target` from its environment variable.
fn load_signer(target: &TargetConfig) -> Result<PrivateKeySigner> {
    let key = std::env::var(&target.signer_key_env).context(format!(
        "Signer key for target {} not set in {}",
        target.chain_id, target.signer_key_env
    ))?;

    key.trim().parse().context(format!(
        "Invalid signer key in {} for target {}",
        target.signer_key_env, target.chain_id
    ))
}

/// Build one target spec per selected target, checking each endpoint serves
/// the chain it is configured for.
async fn target_specs(
    deployer: &Deployer,
    only: &[TargetId],
) -> Result<Vec<TargetSpec<RpcTransport>>> {
    let client = create_client()?;
    let mut specs = Vec::new();

    for target in deployer.select_targets(only)? {
        let signer = load_signer(target)?;
        let transport = RpcTransport::with_client(client.clone(), target.rpc_url.clone());

        let chain_id = transport
            .chain_id()
            .await
            .context(format!("Failed to reach RPC of target {}", target.chain_id))?;
        if TargetId(chain_id) != target.chain_id {
            anyhow::bail!(
                "RPC {} serves chain {chain_id}, expected {}",
                transport.url(),
                target.chain_id
            );
        }

        tracing::debug!(
            target = %target.chain_id,
            signer = %signer.address(),
            plan = %target.plan,
            "Target ready"
        );
        specs.push(TargetSpec::new(target.clone(), signer, Arc::new(transport)));
    }

    Ok(specs)
}

async fn deploy(deployer: &Deployer, only: &[TargetId], with_export: bool) -> Result<()> {
    let specs = target_specs(deployer, only).await?;
    let orchestrator = Orchestrator::from_config(deployer);

    // Dropping the run flushes every open ledger session.
    let report = tokio::select! {
        report = orchestrator.run(specs) => report,
        _ = tokio::signal::ctrl_c() => {
            anyhow::bail!("Interrupted, progress so far is saved in {}", orchestrator.store().path().display());
        }
    };

    println!("{}", summary::steps_table(&report));
    println!("{}", summary::run_table(&report));
    tracing::info!(
        elapsed_ms = report.elapsed().num_milliseconds(),
        transactions = report.transactions(),
        "Run finished"
    );

    if with_export {
        export(deployer)?;
    }

    let failed: Vec<String> = report
        .failed_targets()
        .map(|target| target.target.to_string())
        .collect();
    if !failed.is_empty() {
        anyhow::bail!("Deployment failed on targets: {}", failed.join(", "));
    }

    Ok(())
}

fn export(deployer: &Deployer) -> Result<()> {
    let ledger = deployer.ledger_store().load_all()?;
    let config = build_export(deployer, &ledger);

    let abis = if deployer.export_abis.is_empty() {
        None
    } else {
        Some(abi_bundle(&deployer.artifact_store(), &deployer.export_abis)?)
    };

    let written: Vec<PathBuf> = write_exports(&deployer.export_dir, &config, abis.as_ref())?;
    for path in written {
        println!("{}", path.display());
    }

    Ok(())
}
