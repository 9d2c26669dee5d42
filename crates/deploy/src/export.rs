//! Documents published for off-chain consumers of a deployment.
//!
//! `config.json` bundles every target's static parameters with its ledger
//! slice. `abis.json` bundles the ABIs of selected contracts.

use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};

use alloy_core::json_abi::JsonAbi;
use serde::Serialize;
use url::Url;

use crate::{
    ArtifactStore, DeployError, Deployer, LedgerDocument, LedgerSlice, TargetId,
    ledger::write_atomic,
};

pub const CONFIG_EXPORT_FILENAME: &str = "config.json";
pub const ABI_EXPORT_FILENAME: &str = "abis.json";

/// Per-target entry of the exported config.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainExport {
    pub event_block_range_per_cron: u64,
    pub rpc: Url,
    pub confirmations: u64,
    pub event_block_range: u64,
    /// Absent until something was deployed on the target.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub addresses: Option<LedgerSlice>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConfigExport {
    #[serde(flatten)]
    pub chains: BTreeMap<TargetId, ChainExport>,
    #[serde(rename = "supportedChainSlugs")]
    pub supported_chain_slugs: Vec<TargetId>,
}

/// ABIs keyed as `<contractName>ABI`, e.g. `socketABI`.
pub type AbiBundle = BTreeMap<String, JsonAbi>;

/// Build the config export of every configured target from `ledger`.
pub fn build_export(deployer: &Deployer, ledger: &LedgerDocument) -> ConfigExport {
    let chains = deployer
        .targets
        .iter()
        .map(|target| {
            let addresses = ledger
                .get(&target.chain_id)
                .filter(|slice| !slice.is_empty())
                .cloned();

            let entry = ChainExport {
                event_block_range_per_cron: target.event_block_range_per_cron,
                rpc: target.rpc_url.clone(),
                confirmations: target.confirmations,
                event_block_range: target.event_block_range,
                addresses,
            };
            (target.chain_id, entry)
        })
        .collect();

    ConfigExport {
        chains,
        supported_chain_slugs: deployer.targets.iter().map(|target| target.chain_id).collect(),
    }
}

fn abi_key(contract: &str) -> String {
    let mut chars = contract.chars();
    match chars.next() {
        Some(first) => format!("{}{}ABI", first.to_lowercase(), chars.as_str()),
        None => "ABI".to_string(),
    }
}

/// Bundle the ABIs of `contracts`.
pub fn abi_bundle(store: &ArtifactStore, contracts: &[String]) -> Result<AbiBundle, DeployError> {
    contracts
        .iter()
        .map(|contract| {
            let artifact = store.load(contract)?;
            Ok((abi_key(contract), artifact.abi.clone()))
        })
        .collect()
}

/// Write `config.json`, and `abis.json` if `abis` is given, into `dir`.
///
/// Returns the paths written.
pub fn write_exports(
    dir: &Path,
    config: &ConfigExport,
    abis: Option<&AbiBundle>,
) -> Result<Vec<PathBuf>, DeployError> {
    let mut written = Vec::new();

    let path = dir.join(CONFIG_EXPORT_FILENAME);
    write_json(&path, config)?;
    written.push(path);

    if let Some(abis) = abis {
        let path = dir.join(ABI_EXPORT_FILENAME);
        write_json(&path, abis)?;
        written.push(path);
    }

    tracing::info!(
        dir = %dir.display(),
        targets = config.supported_chain_slugs.len(),
        files = written.len(),
        "Exports written"
    );

    Ok(written)
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), DeployError> {
    let json = serde_json::to_vec_pretty(value)
        .map_err(|e| DeployError::artifact(path.display().to_string(), e))?;
    write_atomic(path, &json)?;
    Ok(())
}
