use std::{
    collections::HashSet,
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{Context, Result};
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use url::Url;

use crate::{
    ArtifactStore, ConfigValues, ConfirmationPolicy, LedgerStore, PlanKind, TargetId, TxOverrides,
    default_shared_config,
};

/// The default name for the relaykit configuration file.
pub const RELAYKIT_CONFIG_FILENAME: &str = "Relaykit.toml";

/// Prefix of environment variables overriding configuration values.
const CONFIG_ENV_PREFIX: &str = "RELAYKIT_";

/// Environment variable holding the signer key when a target does not name one.
pub const DEFAULT_SIGNER_KEY_ENV: &str = "SOCKET_SIGNER_KEY";

const DEFAULT_EVENT_BLOCK_RANGE: u64 = 5000;
const DEFAULT_MAX_PARALLEL_TARGETS: usize = 4;

/// Deployment mode. Each mode has its own ledger file.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum DeploymentMode {
    #[default]
    Dev,
    Surge,
    Prod,
}

impl DeploymentMode {
    /// File name of this mode's ledger, e.g. `dev_addresses.json`.
    pub fn ledger_file_name(self) -> String {
        format!("{self}_addresses.json")
    }
}

fn default_signer_key_env() -> String {
    DEFAULT_SIGNER_KEY_ENV.to_string()
}

fn default_event_block_range() -> u64 {
    DEFAULT_EVENT_BLOCK_RANGE
}

fn default_max_parallel_targets() -> usize {
    DEFAULT_MAX_PARALLEL_TARGETS
}

/// Configuration of one execution target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetConfig {
    /// Chain identifier, also the target's key in the ledger.
    pub chain_id: TargetId,
    pub rpc_url: Url,
    #[serde(default)]
    pub plan: PlanKind,
    /// Name of the environment variable holding this target's private key.
    #[serde(default = "default_signer_key_env")]
    pub signer_key_env: String,
    /// Blocks to wait on top of each receipt.
    #[serde(default)]
    pub confirmations: u64,
    #[serde(default = "default_event_block_range")]
    pub event_block_range: u64,
    #[serde(default = "default_event_block_range")]
    pub event_block_range_per_cron: u64,
    /// Gas and fee overrides applied to every transaction on this target.
    #[serde(default)]
    pub overrides: TxOverrides,
    /// Values layered on top of [`Deployer::shared`] for this target only.
    #[serde(default)]
    pub shared: ConfigValues,
}

impl TargetConfig {
    pub fn new(chain_id: u64, rpc_url: Url, plan: PlanKind) -> Self {
        Self {
            chain_id: TargetId(chain_id),
            rpc_url,
            plan,
            signer_key_env: default_signer_key_env(),
            confirmations: 0,
            event_block_range: DEFAULT_EVENT_BLOCK_RANGE,
            event_block_range_per_cron: DEFAULT_EVENT_BLOCK_RANGE,
            overrides: TxOverrides::default(),
            shared: ConfigValues::default(),
        }
    }
}

/// Configuration of a deployment run.
///
/// This struct contains everything needed to deploy the plans to every
/// configured target and can be serialized to/from TOML format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deployer {
    #[serde(default)]
    pub mode: DeploymentMode,
    /// Directory holding the `<mode>_addresses.json` ledgers.
    pub deployments_dir: PathBuf,
    /// Foundry `out/` directory.
    pub artifacts_dir: PathBuf,
    /// Directory receiving `config.json` and `abis.json`.
    pub export_dir: PathBuf,
    /// Number of targets deployed concurrently.
    #[serde(default = "default_max_parallel_targets")]
    pub max_parallel_targets: usize,
    /// Upper bound on a single target's whole sequence.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_deadline_secs: Option<u64>,
    /// Warn when a reused ledger address holds no code.
    #[serde(default)]
    pub verify_reused_code: bool,
    /// Contracts whose ABIs are bundled into `abis.json`.
    #[serde(default)]
    pub export_abis: Vec<String>,
    /// Values constructor arguments can reference by key.
    #[serde(default = "default_shared_config")]
    pub shared: ConfigValues,
    #[serde(default)]
    pub confirmation: ConfirmationPolicy,
    #[serde(default)]
    pub targets: Vec<TargetConfig>,
}

impl Default for Deployer {
    fn default() -> Self {
        Self {
            mode: DeploymentMode::Dev,
            deployments_dir: PathBuf::from("deployments"),
            artifacts_dir: PathBuf::from("out"),
            export_dir: PathBuf::from("deployments/export"),
            max_parallel_targets: DEFAULT_MAX_PARALLEL_TARGETS,
            target_deadline_secs: None,
            verify_reused_code: false,
            export_abis: Vec::new(),
            shared: default_shared_config(),
            confirmation: ConfirmationPolicy::default(),
            targets: Vec::new(),
        }
    }
}

impl Deployer {
    /// Save the configuration to a TOML file.
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        let content =
            toml::to_string_pretty(self).context("Failed to serialize deployer config to TOML")?;
        std::fs::write(path, content)
            .context(format!("Failed to write config to {}", path.display()))?;
        tracing::info!(path = %path.display(), "Configuration saved");
        Ok(())
    }

    /// Load the configuration from a TOML file, or from
    /// [`RELAYKIT_CONFIG_FILENAME`] inside a directory.
    ///
    /// The file is layered over [`Deployer::default`], so a partial table
    /// (e.g. `[shared]` with a single key) keeps the remaining defaults.
    /// `RELAYKIT_*` environment variables override both, with `__` separating
    /// nested keys (`RELAYKIT_CONFIRMATION__TIMEOUT_SECS`).
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let config_path = Self::resolve_path(path)?;

        let config: Self = Figment::from(Serialized::defaults(Self::default()))
            .merge(Toml::file(&config_path))
            .merge(Env::prefixed(CONFIG_ENV_PREFIX).split("__"))
            .extract()
            .context(format!(
                "Failed to load configuration from {}",
                config_path.display()
            ))?;
        config.validate()?;

        tracing::info!(
            path = %config_path.display(),
            mode = %config.mode,
            targets = config.targets.len(),
            "Configuration loaded"
        );
        Ok(config)
    }

    /// The file a configuration path points to.
    pub fn resolve_path(path: &Path) -> Result<PathBuf> {
        if !path.exists() {
            return Err(anyhow::anyhow!(
                "Configuration file or directory not found: {}",
                path.display()
            ));
        }

        Ok(if path.is_dir() {
            path.join(RELAYKIT_CONFIG_FILENAME)
        } else {
            path.to_path_buf()
        })
    }

    /// Reject configurations the orchestrator cannot run.
    pub fn validate(&self) -> Result<()> {
        if self.max_parallel_targets == 0 {
            anyhow::bail!("max_parallel_targets must be at least 1");
        }

        let mut seen = HashSet::new();
        for target in &self.targets {
            if !seen.insert(target.chain_id) {
                anyhow::bail!("Target {} is configured more than once", target.chain_id);
            }
        }

        Ok(())
    }

    pub fn ledger_store(&self) -> LedgerStore {
        LedgerStore::for_mode(&self.deployments_dir, self.mode)
    }

    pub fn artifact_store(&self) -> ArtifactStore {
        ArtifactStore::new(&self.artifacts_dir)
    }

    pub fn target_deadline(&self) -> Option<Duration> {
        self.target_deadline_secs.map(Duration::from_secs)
    }

    pub fn target(&self, chain_id: TargetId) -> Option<&TargetConfig> {
        self.targets.iter().find(|target| target.chain_id == chain_id)
    }

    /// The configured targets restricted to `only`, or all of them if `only`
    /// is empty.
    pub fn select_targets(&self, only: &[TargetId]) -> Result<Vec<&TargetConfig>> {
        if only.is_empty() {
            return Ok(self.targets.iter().collect());
        }

        only.iter()
            .map(|id| {
                self.target(*id)
                    .with_context(|| format!("Target {id} is not configured"))
            })
            .collect()
    }
}
