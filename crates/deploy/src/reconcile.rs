//! Post-deployment wiring through getter/setter pairs.

use alloy_core::{dyn_abi::DynSolValue, primitives::Address};

use crate::{
    ChainTransport, ContractArtifact, DeployError, TargetContext, TxReceipt, TxRequest,
    submit_and_confirm,
};

/// A deployed component together with its ABI.
#[derive(Debug, Clone, Copy)]
pub struct ContractInstance<'a> {
    pub name: &'a str,
    pub address: Address,
    pub artifact: &'a ContractArtifact,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// On-chain value already matched.
    Unchanged,
    /// A setter transaction was confirmed.
    Updated(TxReceipt),
}

/// Make `instance.getter()` return `desired`.
///
/// Reads the current value and only calls `setter(desired)` on mismatch, then
/// waits for confirmation. A failing setter is returned as
/// [`DeployError::Reconciliation`].
pub async fn reconcile<T: ChainTransport>(
    ctx: &TargetContext<'_, T>,
    instance: ContractInstance<'_>,
    getter: &str,
    setter: &str,
    desired: Address,
) -> Result<ReconcileOutcome, DeployError> {
    let calldata = instance.artifact.encode_call(getter, &[])?;
    let output = ctx.transport.call(instance.address, calldata).await?;
    let current = instance
        .artifact
        .decode_output(getter, &output)?
        .first()
        .and_then(DynSolValue::as_address)
        .ok_or_else(|| DeployError::InvalidArgument {
            component: instance.name.to_string(),
            reason: format!("`{getter}` does not return an address"),
        })?;

    tracing::debug!(
        component = instance.name,
        getter,
        current = %current,
        desired = %desired,
        "Read current setting"
    );

    if current == desired {
        tracing::info!(component = instance.name, getter, "Setting already up to date");
        return Ok(ReconcileOutcome::Unchanged);
    }

    let calldata = instance
        .artifact
        .encode_call(setter, &[DynSolValue::Address(desired)])?;
    let request = TxRequest::call(instance.address, calldata, ctx.overrides);

    let receipt = submit_and_confirm(ctx.transport.as_ref(), &ctx.signer, request, &ctx.confirmation)
        .await
        .map_err(|source| DeployError::Reconciliation {
            component: instance.name.to_string(),
            setter: setter.to_string(),
            source: Box::new(source),
        })?;

    tracing::info!(
        component = instance.name,
        setter,
        value = %desired,
        tx_hash = %receipt.transaction_hash,
        "Setting updated"
    );

    Ok(ReconcileOutcome::Updated(receipt))
}
