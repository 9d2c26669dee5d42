//! JSON-RPC implementation of [`ChainTransport`].

use std::time::Duration;

use alloy_consensus::{SignableTransaction, TxEip1559, TxEnvelope, TxLegacy};
use alloy_core::primitives::{Address, Bytes, TxHash, TxKind, U64, U128, U256};
use alloy_eips::eip2718::Encodable2718;
use alloy_network::TxSignerSync;
use alloy_signer_local::PrivateKeySigner;
use serde::de::DeserializeOwned;
use serde_json::Value;
use url::Url;

use crate::{ChainTransport, DeployError, TxReceipt, TxRequest};

/// Default timeout for RPC requests.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Headroom applied to `eth_estimateGas`, in percent.
const GAS_ESTIMATE_MARGIN: u64 = 20;

/// Create an HTTP client configured for JSON-RPC requests.
pub fn create_client() -> Result<reqwest::Client, DeployError> {
    reqwest::Client::builder()
        .timeout(DEFAULT_TIMEOUT)
        .build()
        .map_err(|e| DeployError::rpc("client", e))
}

/// Make a JSON-RPC call and deserialize the result.
///
/// # Arguments
/// * `client` - The HTTP client to use
/// * `url` - The RPC endpoint URL
/// * `method` - The RPC method name
/// * `params` - The method parameters
pub async fn json_rpc_call<T: DeserializeOwned>(
    client: &reqwest::Client,
    url: &Url,
    method: &str,
    params: Vec<Value>,
) -> Result<T, DeployError> {
    let response = client
        .post(url.clone())
        .json(&serde_json::json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params,
            "id": 1
        }))
        .send()
        .await
        .map_err(|e| DeployError::rpc(method, format!("failed to send request: {e}")))?;

    let result: Value = response
        .json()
        .await
        .map_err(|e| DeployError::rpc(method, format!("failed to parse response: {e}")))?;

    if let Some(error) = result.get("error") {
        return Err(DeployError::rpc(
            method,
            error
                .get("message")
                .and_then(|m| m.as_str())
                .unwrap_or("unknown"),
        ));
    }

    let result_value = result
        .get("result")
        .cloned()
        .ok_or_else(|| DeployError::rpc(method, "no result in response"))?;

    serde_json::from_value(result_value)
        .map_err(|e| DeployError::rpc(method, format!("failed to deserialize result: {e}")))
}

/// A target reached over HTTP JSON-RPC.
///
/// Transactions are signed locally and submitted with
/// `eth_sendRawTransaction`. A legacy transaction is sent when a gas price
/// override is present, an EIP-1559 one otherwise.
#[derive(Debug, Clone)]
pub struct RpcTransport {
    client: reqwest::Client,
    url: Url,
}

impl RpcTransport {
    /// Reuse an existing HTTP client (connection pool shared across targets).
    pub fn with_client(client: reqwest::Client, url: Url) -> Self {
        Self { client, url }
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    async fn call_rpc<T: DeserializeOwned>(
        &self,
        method: &str,
        params: Vec<Value>,
    ) -> Result<T, DeployError> {
        json_rpc_call(&self.client, &self.url, method, params).await
    }

    async fn gas_limit(&self, from: Address, request: &TxRequest) -> Result<u64, DeployError> {
        if let Some(gas_limit) = request.overrides.gas_limit {
            return Ok(gas_limit);
        }

        let mut tx = serde_json::json!({ "from": from, "data": request.data });
        if let Some(to) = request.to {
            tx["to"] = serde_json::json!(to);
        }

        let estimate: U64 = self.call_rpc("eth_estimateGas", vec![tx]).await?;
        let estimate = estimate.to::<u64>();
        Ok(estimate + estimate * GAS_ESTIMATE_MARGIN / 100)
    }

    fn sign(
        signer: &PrivateKeySigner,
        tx: &mut dyn SignableTransaction<alloy_core::primitives::Signature>,
    ) -> Result<alloy_core::primitives::Signature, DeployError> {
        signer
            .sign_transaction_sync(tx)
            .map_err(|e| DeployError::transaction(None, format!("failed to sign: {e}")))
    }
}

impl ChainTransport for RpcTransport {
    async fn chain_id(&self) -> Result<u64, DeployError> {
        let id: U64 = self.call_rpc("eth_chainId", vec![]).await?;
        Ok(id.to())
    }

    async fn block_number(&self) -> Result<u64, DeployError> {
        let number: U64 = self.call_rpc("eth_blockNumber", vec![]).await?;
        Ok(number.to())
    }

    async fn code_at(&self, address: Address) -> Result<Bytes, DeployError> {
        self.call_rpc(
            "eth_getCode",
            vec![serde_json::json!(address), serde_json::json!("latest")],
        )
        .await
    }

    async fn call(&self, to: Address, data: Bytes) -> Result<Bytes, DeployError> {
        self.call_rpc(
            "eth_call",
            vec![
                serde_json::json!({ "to": to, "data": data }),
                serde_json::json!("latest"),
            ],
        )
        .await
    }

    async fn send_transaction(
        &self,
        signer: &PrivateKeySigner,
        request: TxRequest,
    ) -> Result<TxHash, DeployError> {
        let from = signer.address();
        let chain_id = self.chain_id().await?;
        let nonce: U64 = self
            .call_rpc(
                "eth_getTransactionCount",
                vec![serde_json::json!(from), serde_json::json!("pending")],
            )
            .await?;
        let gas_limit = self.gas_limit(from, &request).await?;
        let to = request.to.map_or(TxKind::Create, TxKind::Call);
        let overrides = request.overrides;

        let envelope: TxEnvelope = if let Some(gas_price) = overrides.gas_price {
            let mut tx = TxLegacy {
                chain_id: Some(chain_id),
                nonce: nonce.to(),
                gas_price: gas_price.into(),
                gas_limit,
                to,
                value: U256::ZERO,
                input: request.data,
            };
            let signature = Self::sign(signer, &mut tx)?;
            tx.into_signed(signature).into()
        } else {
            let gas_price: U128 = self.call_rpc("eth_gasPrice", vec![]).await?;
            let priority_fee = match overrides.max_priority_fee_per_gas {
                Some(fee) => u128::from(fee),
                None => self
                    .call_rpc::<U128>("eth_maxPriorityFeePerGas", vec![])
                    .await?
                    .to(),
            };
            let max_fee = match overrides.max_fee_per_gas {
                Some(fee) => u128::from(fee),
                None => gas_price.to::<u128>() * 2 + priority_fee,
            };

            let mut tx = TxEip1559 {
                chain_id,
                nonce: nonce.to(),
                gas_limit,
                max_fee_per_gas: max_fee,
                max_priority_fee_per_gas: priority_fee,
                to,
                value: U256::ZERO,
                access_list: Default::default(),
                input: request.data,
            };
            let signature = Self::sign(signer, &mut tx)?;
            tx.into_signed(signature).into()
        };

        let raw = Bytes::from(envelope.encoded_2718());
        let tx_hash: TxHash = self
            .call_rpc("eth_sendRawTransaction", vec![serde_json::json!(raw)])
            .await?;

        tracing::debug!(
            tx_hash = %tx_hash,
            from = %from,
            nonce = nonce.to::<u64>(),
            gas_limit,
            "Raw transaction submitted"
        );

        Ok(tx_hash)
    }

    async fn transaction_receipt(&self, tx_hash: TxHash) -> Result<Option<TxReceipt>, DeployError> {
        self.call_rpc("eth_getTransactionReceipt", vec![serde_json::json!(tx_hash)])
            .await
    }
}
