//! Drives every target through its plan.

use std::{sync::Arc, time::Duration};

use alloy_signer_local::PrivateKeySigner;
use chrono::Utc;
use derive_more::Display;
use futures::{StreamExt, stream};
use tracing::Instrument;

use crate::{
    ArtifactStore, ChainTransport, ConfigValues, ConfirmationPolicy, DeployError, Deployer,
    DeploymentPlan, LedgerSession, LedgerStore, RunReport, Sequencer, SequencerOptions,
    TargetConfig, TargetContext, TargetFailure, TargetReport,
};

/// Progress of one target through a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum RunState {
    Idle,
    PerTargetLoop,
    Deploying,
    Reconciling,
    Persisted,
    Done,
}

/// Everything needed to run one target, built by the caller.
///
/// The signer is moved into the target's context and never shared.
pub struct TargetSpec<T> {
    pub config: TargetConfig,
    pub plan: DeploymentPlan,
    pub signer: PrivateKeySigner,
    pub transport: Arc<T>,
}

impl<T> TargetSpec<T> {
    /// A spec running the plan named in `config`.
    pub fn new(config: TargetConfig, signer: PrivateKeySigner, transport: Arc<T>) -> Self {
        Self {
            plan: config.plan.plan(),
            config,
            signer,
            transport,
        }
    }
}

/// Runs plans against targets and persists their ledgers.
///
/// Targets are independent: each one gets its own ledger session and context,
/// and a failure only ends that target's sequence.
#[derive(Debug)]
pub struct Orchestrator {
    store: LedgerStore,
    artifacts: ArtifactStore,
    shared: ConfigValues,
    confirmation: ConfirmationPolicy,
    max_parallel_targets: usize,
    target_deadline: Option<Duration>,
    options: SequencerOptions,
}

impl Orchestrator {
    pub fn new(store: LedgerStore, artifacts: ArtifactStore) -> Self {
        Self {
            store,
            artifacts,
            shared: ConfigValues::default(),
            confirmation: ConfirmationPolicy::default(),
            max_parallel_targets: 1,
            target_deadline: None,
            options: SequencerOptions::default(),
        }
    }

    /// An orchestrator configured from `deployer`.
    pub fn from_config(deployer: &Deployer) -> Self {
        Self::new(deployer.ledger_store(), deployer.artifact_store())
            .with_shared(deployer.shared.clone())
            .with_confirmation(deployer.confirmation)
            .with_max_parallel_targets(deployer.max_parallel_targets)
            .with_target_deadline(deployer.target_deadline())
            .with_options(SequencerOptions {
                verify_reused_code: deployer.verify_reused_code,
            })
    }

    pub fn with_shared(mut self, shared: ConfigValues) -> Self {
        self.shared = shared;
        self
    }

    pub fn with_confirmation(mut self, confirmation: ConfirmationPolicy) -> Self {
        self.confirmation = confirmation;
        self
    }

    pub fn with_max_parallel_targets(mut self, max: usize) -> Self {
        self.max_parallel_targets = max.max(1);
        self
    }

    pub fn with_target_deadline(mut self, deadline: Option<Duration>) -> Self {
        self.target_deadline = deadline;
        self
    }

    pub fn with_options(mut self, options: SequencerOptions) -> Self {
        self.options = options;
        self
    }

    pub fn store(&self) -> &LedgerStore {
        &self.store
    }

    pub fn artifacts(&self) -> &ArtifactStore {
        &self.artifacts
    }

    /// Run every target. Up to `max_parallel_targets` run at once; reports
    /// come back in the order of `targets`.
    pub async fn run<T: ChainTransport>(&self, targets: Vec<TargetSpec<T>>) -> RunReport {
        let started_at = Utc::now();
        tracing::info!(
            state = %RunState::Idle,
            targets = targets.len(),
            parallel = self.max_parallel_targets,
            ledger = %self.store.path().display(),
            "Starting deployment run"
        );

        let reports: Vec<TargetReport> = stream::iter(targets)
            .map(|spec| self.run_target(spec))
            .buffered(self.max_parallel_targets)
            .collect()
            .await;

        let report = RunReport {
            started_at,
            finished_at: Utc::now(),
            targets: reports,
        };
        tracing::info!(
            state = %RunState::Done,
            transactions = report.transactions(),
            failed = report.failed_targets().count(),
            "Deployment run finished"
        );
        report
    }

    /// Run one target's plan and persist its ledger, whatever the outcome.
    pub async fn run_target<T: ChainTransport>(&self, spec: TargetSpec<T>) -> TargetReport {
        let target = spec.config.chain_id;
        let span = tracing::info_span!("target", chain_id = %target, plan = %spec.config.plan);

        async move {
            let mut report = TargetReport::new(target);

            let mut session = match LedgerSession::open(&self.store, target) {
                Ok(session) => session,
                Err(e) => {
                    tracing::error!(err = %e, "Failed to load ledger, skipping target");
                    report.persist_error = Some(e.to_string());
                    report.failure = Some(TargetFailure {
                        step: "ledger".to_string(),
                        error: e.into(),
                    });
                    return report;
                }
            };

            tracing::info!(
                state = %RunState::PerTargetLoop,
                signer = %spec.signer.address(),
                known = session.len(),
                "Processing target"
            );

            let config = self
                .shared
                .merged(&spec.config.shared)
                .for_target(target, spec.signer.address());
            let mut ctx = TargetContext {
                target,
                signer: spec.signer,
                transport: spec.transport,
                ledger: &mut *session,
                config,
                overrides: spec.config.overrides,
                confirmation: ConfirmationPolicy {
                    confirmations: spec.config.confirmations,
                    ..self.confirmation
                },
            };

            tracing::debug!(
                state = %RunState::Deploying,
                steps = spec.plan.steps.len(),
                "Running plan"
            );
            let sequencer = Sequencer::new(&self.artifacts, self.options);
            let run = sequencer.run(&mut ctx, &spec.plan, &mut report.steps);

            let outcome = match self.target_deadline {
                Some(deadline) => match tokio::time::timeout(deadline, run).await {
                    Ok(outcome) => outcome,
                    Err(_) => {
                        let step = spec
                            .plan
                            .steps
                            .get(report.steps.len())
                            .map_or_else(|| "deadline".to_string(), |step| step.label());
                        tracing::error!(step = %step, ?deadline, "Target deadline exceeded");
                        Err(TargetFailure {
                            step,
                            error: DeployError::DeadlineExceeded(deadline),
                        })
                    }
                },
                None => run.await,
            };

            let outcome = match outcome {
                Ok(()) => record_start_block(&mut ctx).await,
                Err(failure) => Err(failure),
            };
            report.failure = outcome.err();
            drop(ctx);

            match session.close() {
                Ok(slice) => {
                    tracing::info!(
                        state = %RunState::Persisted,
                        success = report.failure.is_none(),
                        transactions = report.transactions(),
                        "Target finished"
                    );
                    report.ledger = slice;
                }
                Err(e) => {
                    tracing::error!(err = %e, "Failed to persist ledger");
                    report.persist_error = Some(e.to_string());
                }
            }

            report
        }
        .instrument(span)
        .await
    }
}

/// Record the block the target's deployment started being observable from.
async fn record_start_block<T: ChainTransport>(
    ctx: &mut TargetContext<'_, T>,
) -> Result<(), TargetFailure> {
    if ctx.ledger.start_block().is_some() {
        return Ok(());
    }

    let block = ctx.transport.block_number().await.map_err(|error| TargetFailure {
        step: "startBlock".to_string(),
        error,
    })?;
    ctx.ledger.set_start_block(block);
    tracing::debug!(start_block = block, "Recorded start block");
    Ok(())
}
