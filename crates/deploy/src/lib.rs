//! relaykit-deploy - Idempotent multi-chain contract deployment.
//!
//! This crate deploys fixed, hand-ordered plans of interdependent contracts to
//! several chains, records every deployed address in a per-mode ledger file and
//! wires deployed contracts together through getter/setter reconciliation.

mod artifact;
pub use artifact::{ArtifactStore, ContractArtifact};

mod builder;
pub use builder::DeployerBuilder;

mod component;
pub use component::{ArgDescriptor, Component, DeploymentPlan, Setting, Step};

mod context;
pub use context::{CHAIN_SLUG_KEY, ConfigValues, SIGNER_KEY, TargetContext, TargetId};

mod deployer;
pub use deployer::{
    DEFAULT_SIGNER_KEY_ENV, Deployer, DeploymentMode, RELAYKIT_CONFIG_FILENAME, TargetConfig,
};

mod error;
pub use error::{DeployError, LedgerError};

pub mod export;

mod ledger;
pub use ledger::{LedgerDocument, LedgerSlice, LedgerStore};

mod orchestrator;
pub use orchestrator::{Orchestrator, RunState, TargetSpec};

mod plans;
pub use plans::{
    FEES_DATA_KEY, PlanKind, WATCHER_KEY, core_plan, default_shared_config, watcher_plan,
};

pub mod reconcile;
pub use reconcile::ReconcileOutcome;

mod report;
pub use report::{RunReport, StepOutcome, StepRecord, TargetFailure, TargetReport};

pub mod resolver;
pub use resolver::Resolution;

mod rpc;
pub use rpc::{RpcTransport, create_client, json_rpc_call};

mod sequencer;
pub use sequencer::{DeploymentResult, Sequencer, SequencerOptions, deploy};

mod session;
pub use session::LedgerSession;

mod transport;
pub use transport::{
    ChainTransport, ConfirmationPolicy, TxOverrides, TxReceipt, TxRequest, submit_and_confirm,
};
