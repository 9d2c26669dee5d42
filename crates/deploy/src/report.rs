//! Outcome of a deployment run, per target and per step.

use alloy_core::primitives::{Address, TxHash};
use chrono::{DateTime, Utc};
use derive_more::Display;

use crate::{DeployError, LedgerSlice, TargetId};

/// What a single plan step did.
#[derive(Debug, Clone, PartialEq, Eq, Display)]
pub enum StepOutcome {
    #[display("deployed at {address} ({tx_hash})")]
    Deployed { address: Address, tx_hash: TxHash },
    #[display("reused {address}")]
    Reused { address: Address },
    #[display("unchanged")]
    Unchanged,
    #[display("updated ({tx_hash})")]
    Updated { tx_hash: TxHash },
}

impl StepOutcome {
    /// Whether the step submitted a transaction.
    pub fn submitted(&self) -> bool {
        matches!(self, Self::Deployed { .. } | Self::Updated { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepRecord {
    /// Step label, see [`crate::Step::label`].
    pub step: String,
    pub outcome: StepOutcome,
}

/// The step a target's sequence stopped at, and why.
#[derive(Debug)]
pub struct TargetFailure {
    pub step: String,
    pub error: DeployError,
}

/// Everything that happened to one target.
#[derive(Debug)]
pub struct TargetReport {
    pub target: TargetId,
    /// Completed steps, in plan order.
    pub steps: Vec<StepRecord>,
    pub failure: Option<TargetFailure>,
    /// Set when the final ledger flush failed.
    pub persist_error: Option<String>,
    /// The slice as it was persisted (or as far as it got).
    pub ledger: LedgerSlice,
}

impl TargetReport {
    pub fn new(target: TargetId) -> Self {
        Self {
            target,
            steps: Vec::new(),
            failure: None,
            persist_error: None,
            ledger: LedgerSlice::default(),
        }
    }

    /// The sequence ran to completion and its ledger is on disk.
    pub fn is_success(&self) -> bool {
        self.failure.is_none() && self.persist_error.is_none()
    }

    pub fn persisted(&self) -> bool {
        self.persist_error.is_none()
    }

    /// Number of transactions this target submitted and confirmed.
    pub fn transactions(&self) -> usize {
        self.steps.iter().filter(|record| record.outcome.submitted()).count()
    }

    pub fn outcome(&self, step: &str) -> Option<&StepOutcome> {
        self.steps
            .iter()
            .find(|record| record.step == step)
            .map(|record| &record.outcome)
    }
}

/// Reports of every target attempted in a run, in configuration order.
#[derive(Debug, Default)]
pub struct RunReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub targets: Vec<TargetReport>,
}

impl RunReport {
    pub fn elapsed(&self) -> chrono::TimeDelta {
        self.finished_at - self.started_at
    }

    /// True only if every target completed and persisted its ledger.
    pub fn is_success(&self) -> bool {
        self.targets.iter().all(TargetReport::is_success)
    }

    pub fn failed_targets(&self) -> impl Iterator<Item = &TargetReport> {
        self.targets.iter().filter(|report| !report.is_success())
    }

    pub fn target(&self, target: TargetId) -> Option<&TargetReport> {
        self.targets.iter().find(|report| report.target == target)
    }

    pub fn transactions(&self) -> usize {
        self.targets.iter().map(TargetReport::transactions).sum()
    }
}
