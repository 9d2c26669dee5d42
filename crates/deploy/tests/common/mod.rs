//! Shared fixtures: an in-memory chain and artifact helpers.

#![allow(dead_code)]

use std::{
    collections::HashMap,
    path::Path,
    sync::{Arc, Mutex},
};

use alloy_core::primitives::{Address, B256, Bytes, TxHash, U64, keccak256};
use alloy_signer_local::PrivateKeySigner;
use relaykit_deploy::{
    ArgDescriptor, ArtifactStore, CHAIN_SLUG_KEY, ChainTransport, Component, ConfirmationPolicy,
    DeployError, DeploymentMode, DeploymentPlan, LedgerStore, Orchestrator, PlanKind, SIGNER_KEY,
    TargetConfig, TargetSpec, TxReceipt, TxRequest, default_shared_config,
};
use serde_json::{Value, json};
use tempdir::TempDir;

/// Anvil's first two development keys.
pub const KEY_A: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";
pub const KEY_B: &str = "0x59c6995e998f97a5a0044966f0945389dc9e86dae88c7a8412f4603b6b78690d";

pub const FEES_TUPLE: &str = "(uint32,address,uint256)";

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}

pub fn signer(key: &str) -> PrivateKeySigner {
    key.parse().unwrap()
}

/// A transaction seen by [`MockChain`].
#[derive(Debug, Clone)]
pub struct Submission {
    pub from: Address,
    pub to: Option<Address>,
    pub data: Bytes,
    pub tx_hash: TxHash,
}

#[derive(Default)]
struct ChainState {
    block: u64,
    nonces: HashMap<Address, u64>,
    code: HashMap<Address, Bytes>,
    /// Single storage word per contract, written by any setter call.
    storage: HashMap<Address, B256>,
    receipts: HashMap<TxHash, TxReceipt>,
    submissions: Vec<Submission>,
    revert_at: Option<usize>,
    pending_from: Option<usize>,
}

/// An in-memory chain.
///
/// Contract creations get their CREATE address from the sender nonce. Calls
/// with arguments store their first argument word in the callee's single
/// storage slot; `eth_call` returns that word.
pub struct MockChain {
    chain_id: u64,
    state: Mutex<ChainState>,
}

impl MockChain {
    pub fn new(chain_id: u64) -> Arc<Self> {
        Arc::new(Self {
            chain_id,
            state: Mutex::new(ChainState {
                block: 100,
                ..Default::default()
            }),
        })
    }

    /// Make the `index`-th submission (0-based, counted over the chain's
    /// lifetime) revert.
    pub fn revert_at(&self, index: usize) {
        self.state.lock().unwrap().revert_at = Some(index);
    }

    /// Never produce receipts from the `index`-th submission on.
    pub fn pending_from(&self, index: usize) {
        self.state.lock().unwrap().pending_from = Some(index);
    }

    pub fn submissions(&self) -> Vec<Submission> {
        self.state.lock().unwrap().submissions.clone()
    }

    pub fn submission_count(&self) -> usize {
        self.state.lock().unwrap().submissions.len()
    }

    pub fn stored_address(&self, contract: Address) -> Address {
        let word = self
            .state
            .lock()
            .unwrap()
            .storage
            .get(&contract)
            .copied()
            .unwrap_or_default();
        Address::from_word(word)
    }

    pub fn clear_code(&self, contract: Address) {
        self.state.lock().unwrap().code.remove(&contract);
    }
}

impl ChainTransport for MockChain {
    async fn chain_id(&self) -> Result<u64, DeployError> {
        Ok(self.chain_id)
    }

    async fn block_number(&self) -> Result<u64, DeployError> {
        Ok(self.state.lock().unwrap().block)
    }

    async fn code_at(&self, address: Address) -> Result<Bytes, DeployError> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .code
            .get(&address)
            .cloned()
            .unwrap_or_default())
    }

    async fn call(&self, to: Address, _data: Bytes) -> Result<Bytes, DeployError> {
        let word = self
            .state
            .lock()
            .unwrap()
            .storage
            .get(&to)
            .copied()
            .unwrap_or_default();
        Ok(Bytes::copy_from_slice(word.as_slice()))
    }

    async fn send_transaction(
        &self,
        signer: &PrivateKeySigner,
        request: TxRequest,
    ) -> Result<TxHash, DeployError> {
        let mut state = self.state.lock().unwrap();
        let from = signer.address();
        let index = state.submissions.len();

        let nonce = {
            let nonce = state.nonces.entry(from).or_default();
            let current = *nonce;
            *nonce += 1;
            current
        };

        let mut preimage = self.chain_id.to_be_bytes().to_vec();
        preimage.extend_from_slice(from.as_slice());
        preimage.extend_from_slice(&nonce.to_be_bytes());
        let tx_hash = keccak256(&preimage);

        state.submissions.push(Submission {
            from,
            to: request.to,
            data: request.data.clone(),
            tx_hash,
        });

        if state.pending_from.is_some_and(|pending| index >= pending) {
            return Ok(tx_hash);
        }

        state.block += 1;
        let reverted = state.revert_at == Some(index);
        let mut receipt = TxReceipt {
            transaction_hash: tx_hash,
            block_number: Some(U64::from(state.block)),
            contract_address: None,
            status: Some(U64::from(u8::from(!reverted))),
        };

        if !reverted {
            match request.to {
                None => {
                    let address = from.create(nonce);
                    state.code.insert(address, request.data);
                    receipt.contract_address = Some(address);
                }
                Some(to) if request.data.len() >= 36 => {
                    let word = B256::from_slice(&request.data[4..36]);
                    state.storage.insert(to, word);
                }
                Some(_) => {}
            }
        }

        state.receipts.insert(tx_hash, receipt);
        Ok(tx_hash)
    }

    async fn transaction_receipt(&self, tx_hash: TxHash) -> Result<Option<TxReceipt>, DeployError> {
        Ok(self.state.lock().unwrap().receipts.get(&tx_hash).cloned())
    }
}

fn param(name: &str, ty: &str) -> Value {
    match ty.strip_prefix('(').and_then(|rest| rest.strip_suffix(')')) {
        Some(inner) => {
            let components: Vec<Value> = inner
                .split(',')
                .enumerate()
                .map(|(i, ty)| param(&format!("field{i}"), ty))
                .collect();
            json!({ "name": name, "type": "tuple", "components": components })
        }
        None => json!({ "name": name, "type": ty }),
    }
}

/// Write a Foundry-style artifact for `contract` under `root`.
///
/// `setting` adds an address getter and its `set<Getter>` setter.
pub fn write_artifact(root: &Path, contract: &str, constructor: &[&str], setting: Option<&str>) {
    let inputs: Vec<Value> = constructor
        .iter()
        .enumerate()
        .map(|(i, ty)| param(&format!("arg{i}"), ty))
        .collect();

    let mut abi = vec![json!({
        "type": "constructor",
        "inputs": inputs,
        "stateMutability": "nonpayable"
    })];

    if let Some(getter) = setting {
        let mut setter = String::from("set");
        let mut chars = getter.chars();
        if let Some(first) = chars.next() {
            setter.extend(first.to_uppercase());
            setter.push_str(chars.as_str());
        }

        abi.push(json!({
            "type": "function",
            "name": getter,
            "inputs": [],
            "outputs": [{ "name": "", "type": "address" }],
            "stateMutability": "view"
        }));
        abi.push(json!({
            "type": "function",
            "name": setter,
            "inputs": [{ "name": "value", "type": "address" }],
            "outputs": [],
            "stateMutability": "nonpayable"
        }));
    }

    let artifact = json!({
        "abi": abi,
        "bytecode": { "object": "0x6080604052" }
    });

    let path = ArtifactStore::new(root).artifact_path(contract);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, serde_json::to_vec_pretty(&artifact).unwrap()).unwrap();
}

/// `[Verifier, Hasher, Core, Manager]`, where `Manager` takes `Core` and `Hasher`.
pub fn scenario_plan() -> DeploymentPlan {
    DeploymentPlan::new()
        .deploy(
            Component::new("Verifier", "contracts/Verifier.sol")
                .arg(ArgDescriptor::config(SIGNER_KEY)),
        )
        .deploy(
            Component::new("Hasher", "contracts/Hasher.sol").arg(ArgDescriptor::config(SIGNER_KEY)),
        )
        .deploy(
            Component::new("Core", "contracts/Core.sol")
                .arg(ArgDescriptor::config(CHAIN_SLUG_KEY))
                .arg(ArgDescriptor::component("Hasher")),
        )
        .deploy(
            Component::new("Manager", "contracts/Manager.sol")
                .arg(ArgDescriptor::component("Core"))
                .arg(ArgDescriptor::component("Hasher")),
        )
}

pub fn write_scenario_artifacts(root: &Path) {
    write_artifact(root, "Verifier", &["address"], None);
    write_artifact(root, "Hasher", &["address"], None);
    write_artifact(root, "Core", &["uint32", "address"], None);
    write_artifact(root, "Manager", &["address", "address"], None);
}

pub fn write_watcher_artifacts(root: &Path) {
    write_artifact(root, "Watcher", &["address"], None);
    write_artifact(root, "AddressResolver", &["address", "address"], Some("auctionHouse"));
    write_artifact(root, "AuctionHouse", &["address"], None);
    write_artifact(
        root,
        "SuperTokenDeployer",
        &[
            "address", "address", "uint256", "uint256", "string", "string", "uint8", "address",
            "uint256", FEES_TUPLE,
        ],
        None,
    );
    write_artifact(root, "SuperTokenApp", &["address", FEES_TUPLE, "address"], None);
}

/// Confirmation policy polling fast enough for tests.
pub fn fast_confirmation() -> ConfirmationPolicy {
    ConfirmationPolicy {
        poll_interval_ms: 5,
        timeout_secs: 5,
        confirmations: 0,
    }
}

/// A temporary workspace with a ledger directory and an artifacts directory.
pub struct Harness {
    pub dir: TempDir,
}

impl Harness {
    pub fn new() -> Self {
        init_tracing();
        let harness = Self {
            dir: TempDir::new("relaykit").unwrap(),
        };
        write_scenario_artifacts(&harness.artifacts_dir());
        write_watcher_artifacts(&harness.artifacts_dir());
        harness
    }

    pub fn artifacts_dir(&self) -> std::path::PathBuf {
        self.dir.path().join("out")
    }

    pub fn deployments_dir(&self) -> std::path::PathBuf {
        self.dir.path().join("deployments")
    }

    pub fn store(&self) -> LedgerStore {
        LedgerStore::for_mode(&self.deployments_dir(), DeploymentMode::Dev)
    }

    pub fn orchestrator(&self) -> Orchestrator {
        Orchestrator::new(self.store(), ArtifactStore::new(self.artifacts_dir()))
            .with_shared(default_shared_config())
            .with_confirmation(fast_confirmation())
            .with_max_parallel_targets(4)
    }
}

pub fn target_config(chain_id: u64, plan: PlanKind) -> TargetConfig {
    TargetConfig::new(chain_id, "http://localhost:8545".parse().unwrap(), plan)
}

pub fn spec(
    chain_id: u64,
    plan: DeploymentPlan,
    key: &str,
    chain: &Arc<MockChain>,
) -> TargetSpec<MockChain> {
    TargetSpec {
        config: target_config(chain_id, PlanKind::Core),
        plan,
        signer: signer(key),
        transport: chain.clone(),
    }
}
