//! Runs a fixed plan against one target.

use alloy_core::primitives::{Address, Bytes};

use crate::{
    ArtifactStore, ChainTransport, Component, DeployError, DeploymentPlan, ReconcileOutcome,
    Resolution, RunState, Setting, Step, StepOutcome, StepRecord, TargetContext, TargetFailure,
    TxReceipt, TxRequest,
    reconcile::{ContractInstance, reconcile},
    resolver::warn_if_codeless,
    submit_and_confirm,
};

/// A fresh deployment, consumed right away to update the ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeploymentResult {
    pub component: String,
    pub address: Address,
    pub receipt: TxReceipt,
}

/// Knobs that change how steps are executed, not what they do.
#[derive(Debug, Clone, Copy, Default)]
pub struct SequencerOptions {
    /// Check that reused addresses still hold code (warning only).
    pub verify_reused_code: bool,
}

/// Walks a plan step by step against one target.
pub struct Sequencer<'a> {
    artifacts: &'a ArtifactStore,
    options: SequencerOptions,
}

impl<'a> Sequencer<'a> {
    pub fn new(artifacts: &'a ArtifactStore, options: SequencerOptions) -> Self {
        Self { artifacts, options }
    }

    /// Run every step of `plan` in order, stopping at the first failure.
    ///
    /// Completed steps are pushed to `records` as they finish, so the caller
    /// keeps them even if this future is dropped half-way. The ledger in `ctx`
    /// is updated after each deployment; persisting it is up to the caller.
    pub async fn run<T: ChainTransport>(
        &self,
        ctx: &mut TargetContext<'_, T>,
        plan: &DeploymentPlan,
        records: &mut Vec<StepRecord>,
    ) -> Result<(), TargetFailure> {
        for step in &plan.steps {
            let outcome = match step {
                Step::Deploy(component) => self.deploy_step(ctx, component).await,
                Step::Reconcile(setting) => self.reconcile_step(ctx, plan, setting).await,
            };

            match outcome {
                Ok(outcome) => records.push(StepRecord {
                    step: step.label(),
                    outcome,
                }),
                Err(error) => {
                    tracing::error!(
                        chain_id = %ctx.target,
                        step = %step.label(),
                        err = %error,
                        "Step failed, aborting remaining steps for this target"
                    );
                    return Err(TargetFailure {
                        step: step.label(),
                        error,
                    });
                }
            }
        }

        Ok(())
    }

    async fn deploy_step<T: ChainTransport>(
        &self,
        ctx: &mut TargetContext<'_, T>,
        component: &Component,
    ) -> Result<StepOutcome, DeployError> {
        // Arguments are resolved before anything is submitted, so a reference
        // to a later component fails without a transaction.
        let args = component.resolve_args(ctx.ledger, &ctx.config)?;

        match ctx.resolve(component) {
            Resolution::Reused(address) => {
                if self.options.verify_reused_code {
                    warn_if_codeless(ctx.transport.as_ref(), component, address).await;
                }
                tracing::info!(
                    chain_id = %ctx.target,
                    component = %component.name,
                    address = %address,
                    "Reusing deployed component"
                );
                Ok(StepOutcome::Reused { address })
            }
            Resolution::Deploy => {
                let artifact = self.artifacts.load(&component.contract)?;
                let data = artifact.deploy_data(&args)?;

                tracing::info!(
                    chain_id = %ctx.target,
                    component = %component.name,
                    source = %component.source,
                    "Deploying component"
                );

                let result = deploy(ctx, component, data).await?;
                ctx.ledger.set(&result.component, result.address);

                tracing::info!(
                    chain_id = %ctx.target,
                    component = %result.component,
                    address = %result.address,
                    tx_hash = %result.receipt.transaction_hash,
                    "Component deployed"
                );

                Ok(StepOutcome::Deployed {
                    address: result.address,
                    tx_hash: result.receipt.transaction_hash,
                })
            }
        }
    }

    async fn reconcile_step<T: ChainTransport>(
        &self,
        ctx: &mut TargetContext<'_, T>,
        plan: &DeploymentPlan,
        setting: &Setting,
    ) -> Result<StepOutcome, DeployError> {
        let desired = setting.desired(ctx.ledger, &ctx.config)?;
        let address = ctx
            .ledger
            .get(&setting.component)
            .ok_or_else(|| DeployError::MissingDependency {
                component: format!("{}.{}", setting.component, setting.setter),
                dependency: setting.component.clone(),
            })?;

        let contract = plan
            .components()
            .find(|component| component.name == setting.component)
            .map_or(setting.component.as_str(), |component| component.contract.as_str());
        let artifact = self.artifacts.load(contract)?;

        tracing::debug!(
            chain_id = %ctx.target,
            state = %RunState::Reconciling,
            component = %setting.component,
            setter = %setting.setter,
            "Reconciling setting"
        );

        let instance = ContractInstance {
            name: &setting.component,
            address,
            artifact: &artifact,
        };

        match reconcile(ctx, instance, &setting.getter, &setting.setter, desired).await? {
            ReconcileOutcome::Unchanged => Ok(StepOutcome::Unchanged),
            ReconcileOutcome::Updated(receipt) => Ok(StepOutcome::Updated {
                tx_hash: receipt.transaction_hash,
            }),
        }
    }
}

/// Submit the creation transaction of `component` and wait for its address.
pub async fn deploy<T: ChainTransport>(
    ctx: &TargetContext<'_, T>,
    component: &Component,
    data: Bytes,
) -> Result<DeploymentResult, DeployError> {
    let request = TxRequest::create(data, ctx.overrides);
    let receipt =
        submit_and_confirm(ctx.transport.as_ref(), &ctx.signer, request, &ctx.confirmation).await?;

    let address = receipt.contract_address.ok_or_else(|| {
        DeployError::transaction(
            Some(receipt.transaction_hash),
            format!("receipt of `{}` has no contract address", component.name),
        )
    })?;

    Ok(DeploymentResult {
        component: component.name.clone(),
        address,
        receipt,
    })
}
