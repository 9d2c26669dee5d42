//! Transaction transport used by the orchestrator.
//!
//! The core only depends on [`ChainTransport`]. [`crate::RpcTransport`] is the
//! JSON-RPC implementation; tests plug in an in-memory chain.

use std::{future::Future, time::Duration};

use alloy_core::primitives::{Address, B256, Bytes, TxHash, U64};
use alloy_signer_local::PrivateKeySigner;
use backon::{ConstantBuilder, Retryable};
use serde::{Deserialize, Serialize};

use crate::DeployError;

/// Gas and fee overrides, passed through opaquely to the transport.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxOverrides {
    /// Fixed gas limit instead of `eth_estimateGas`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gas_limit: Option<u64>,
    /// Legacy gas price in wei. When set, a type-0 transaction is sent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gas_price: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_fee_per_gas: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_priority_fee_per_gas: Option<u64>,
}

/// A transaction to sign and submit. `to == None` creates a contract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxRequest {
    pub to: Option<Address>,
    pub data: Bytes,
    pub overrides: TxOverrides,
}

impl TxRequest {
    pub fn create(data: Bytes, overrides: TxOverrides) -> Self {
        Self {
            to: None,
            data,
            overrides,
        }
    }

    pub fn call(to: Address, data: Bytes, overrides: TxOverrides) -> Self {
        Self {
            to: Some(to),
            data,
            overrides,
        }
    }
}

/// The subset of a transaction receipt the orchestrator looks at.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TxReceipt {
    pub transaction_hash: B256,
    #[serde(default)]
    pub block_number: Option<U64>,
    #[serde(default)]
    pub contract_address: Option<Address>,
    /// `0x1` on success, `0x0` on revert. Absent on pre-Byzantium chains.
    #[serde(default)]
    pub status: Option<U64>,
}

impl TxReceipt {
    pub fn succeeded(&self) -> bool {
        self.status.is_none_or(|status| status == U64::from(1))
    }
}

/// How long and how often to wait for a submitted transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfirmationPolicy {
    /// Interval between receipt polls, in milliseconds.
    pub poll_interval_ms: u64,
    /// Upper bound on the whole wait, in seconds.
    pub timeout_secs: u64,
    /// Blocks that must be built on top of the receipt's block.
    #[serde(default)]
    pub confirmations: u64,
}

impl Default for ConfirmationPolicy {
    fn default() -> Self {
        Self {
            poll_interval_ms: 1_000,
            timeout_secs: 300,
            confirmations: 0,
        }
    }
}

impl ConfirmationPolicy {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Access to one execution target.
///
/// Implementations own their retry policy, if any; the orchestrator never
/// resubmits a failed transaction.
pub trait ChainTransport: Send + Sync + 'static {
    fn chain_id(&self) -> impl Future<Output = Result<u64, DeployError>> + Send;

    fn block_number(&self) -> impl Future<Output = Result<u64, DeployError>> + Send;

    /// Deployed code at `address` (empty if none).
    fn code_at(&self, address: Address) -> impl Future<Output = Result<Bytes, DeployError>> + Send;

    /// Read-only call against the latest block.
    fn call(
        &self,
        to: Address,
        data: Bytes,
    ) -> impl Future<Output = Result<Bytes, DeployError>> + Send;

    /// Sign `request` with `signer` and submit it, returning its hash.
    fn send_transaction(
        &self,
        signer: &PrivateKeySigner,
        request: TxRequest,
    ) -> impl Future<Output = Result<TxHash, DeployError>> + Send;

    /// The receipt of `tx_hash`, or `None` while it is pending.
    fn transaction_receipt(
        &self,
        tx_hash: TxHash,
    ) -> impl Future<Output = Result<Option<TxReceipt>, DeployError>> + Send;
}

#[derive(Debug)]
enum Poll {
    Pending,
    Failed(DeployError),
}

/// Submit `request` and wait until it is confirmed under `policy`.
///
/// Only the "not mined yet" state is polled; an RPC error or a reverted
/// receipt ends the wait immediately.
pub async fn submit_and_confirm<T: ChainTransport>(
    transport: &T,
    signer: &PrivateKeySigner,
    request: TxRequest,
    policy: &ConfirmationPolicy,
) -> Result<TxReceipt, DeployError> {
    let tx_hash = transport
        .send_transaction(signer, request)
        .await
        .map_err(|e| match e {
            DeployError::Rpc { method, reason } => {
                DeployError::transaction(None, format!("{method}: {reason}"))
            }
            other => other,
        })?;

    tracing::debug!(tx_hash = %tx_hash, "Transaction submitted, waiting for receipt");

    let wait = async {
        let receipt = wait_for_receipt(transport, tx_hash, policy).await?;

        if !receipt.succeeded() {
            return Err(DeployError::transaction(Some(tx_hash), "transaction reverted"));
        }

        if policy.confirmations > 0 {
            wait_for_depth(transport, tx_hash, &receipt, policy).await?;
        }

        Ok(receipt)
    };

    tokio::time::timeout(policy.timeout(), wait)
        .await
        .map_err(|_| DeployError::Timeout {
            tx_hash,
            waited: policy.timeout(),
        })?
}

async fn wait_for_receipt<T: ChainTransport>(
    transport: &T,
    tx_hash: TxHash,
    policy: &ConfirmationPolicy,
) -> Result<TxReceipt, DeployError> {
    let fetch = || async {
        match transport.transaction_receipt(tx_hash).await {
            Ok(Some(receipt)) => Ok(receipt),
            Ok(None) => Err(Poll::Pending),
            Err(e) => Err(Poll::Failed(e)),
        }
    };

    // The outer timeout bounds the wait, so polling itself is unbounded.
    fetch
        .retry(
            ConstantBuilder::default()
                .with_delay(policy.poll_interval())
                .without_max_times(),
        )
        .when(|e| matches!(e, Poll::Pending))
        .notify(|_, _| tracing::trace!(tx_hash = %tx_hash, "Receipt not available yet"))
        .await
        .map_err(|e| match e {
            Poll::Failed(e) => e,
            Poll::Pending => DeployError::transaction(Some(tx_hash), "receipt never became available"),
        })
}

async fn wait_for_depth<T: ChainTransport>(
    transport: &T,
    tx_hash: TxHash,
    receipt: &TxReceipt,
    policy: &ConfirmationPolicy,
) -> Result<(), DeployError> {
    let Some(mined_at) = receipt.block_number.map(|n| n.to::<u64>()) else {
        return Ok(());
    };
    let target = mined_at.saturating_add(policy.confirmations);

    loop {
        let head = transport.block_number().await?;
        if head >= target {
            tracing::debug!(tx_hash = %tx_hash, head, target, "Transaction reached confirmation depth");
            return Ok(());
        }
        tokio::time::sleep(policy.poll_interval()).await;
    }
}
