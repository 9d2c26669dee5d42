//! Error types for the deployment core.

use std::{path::PathBuf, time::Duration};

use alloy_core::primitives::TxHash;
use thiserror::Error;

use crate::TargetId;

/// Errors raised while reading or writing the address ledger.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("failed to {action} ledger file {path}: {source}")]
    Io {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse ledger file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to parse ledger slice of target {target} in {path}: {source}")]
    Slice {
        target: TargetId,
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to serialize ledger: {0}")]
    Serialize(#[source] serde_json::Error),

    #[error("invalid address `{value}` recorded for `{component}`")]
    InvalidAddress { component: String, value: String },
}

/// Errors that abort a target's deployment sequence.
///
/// Every variant is target-scoped: the orchestrator records it against the
/// failing step, flushes the ledger and moves on to the next target.
#[derive(Debug, Error)]
pub enum DeployError {
    /// A component references an address that has not been produced yet.
    #[error("`{component}` references `{dependency}`, which has no address on this target")]
    MissingDependency {
        component: String,
        dependency: String,
    },

    /// A component references a shared configuration value that is not defined.
    #[error("`{component}` references config key `{key}`, which is not defined")]
    MissingConfig { component: String, key: String },

    /// A resolved argument does not fit the parameter it is passed to.
    #[error("invalid argument for `{component}`: {reason}")]
    InvalidArgument { component: String, reason: String },

    /// Submission or confirmation of a transaction failed.
    #[error("transaction failed: {reason}")]
    TransactionFailure {
        tx_hash: Option<TxHash>,
        reason: String,
    },

    /// The confirmation wait exceeded the configured timeout.
    #[error("timed out after {waited:?} waiting for {tx_hash} to confirm")]
    Timeout { tx_hash: TxHash, waited: Duration },

    /// A setter call issued after a detected mismatch failed.
    #[error("failed to set `{setter}` on `{component}`: {source}")]
    Reconciliation {
        component: String,
        setter: String,
        #[source]
        source: Box<DeployError>,
    },

    /// The target's deadline elapsed before the sequence finished.
    #[error("deadline of {0:?} exceeded")]
    DeadlineExceeded(Duration),

    #[error("artifact `{contract}`: {reason}")]
    Artifact { contract: String, reason: String },

    #[error("rpc `{method}` failed: {reason}")]
    Rpc { method: String, reason: String },

    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

impl DeployError {
    pub(crate) fn artifact(contract: impl Into<String>, reason: impl ToString) -> Self {
        Self::Artifact {
            contract: contract.into(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn rpc(method: impl Into<String>, reason: impl ToString) -> Self {
        Self::Rpc {
            method: method.into(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn transaction(tx_hash: Option<TxHash>, reason: impl ToString) -> Self {
        Self::TransactionFailure {
            tx_hash,
            reason: reason.to_string(),
        }
    }
}
