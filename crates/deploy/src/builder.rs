//! Builder module for creating a [`Deployer`] configuration.
//!
//! This module provides the [`DeployerBuilder`] struct which fills in the
//! directory layout and per-target defaults, and validates the result.

use std::path::PathBuf;

use anyhow::{Context, Result};
use url::Url;

use crate::{
    ConfigValues, ConfirmationPolicy, Deployer, DeploymentMode, PlanKind, TargetConfig,
    default_shared_config,
};

/// Builder for creating a [`Deployer`] configuration.
///
/// # Example
///
/// ```no_run
/// use relaykit_deploy::{DeployerBuilder, PlanKind};
///
/// # fn example() -> anyhow::Result<()> {
/// let deployer = DeployerBuilder::new()
///     .deployments_dir("deployments")
///     .target(421614, "https://sepolia-rollup.arbitrum.io/rpc".parse()?, PlanKind::Core)
///     .build()?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct DeployerBuilder {
    mode: DeploymentMode,
    deployments_dir: Option<PathBuf>,
    artifacts_dir: Option<PathBuf>,
    export_dir: Option<PathBuf>,
    shared: ConfigValues,
    confirmation: ConfirmationPolicy,
    max_parallel_targets: Option<usize>,
    target_deadline_secs: Option<u64>,
    verify_reused_code: bool,
    export_abis: Vec<String>,
    targets: Vec<TargetConfig>,
    create_dirs: bool,
}

impl Default for DeployerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl DeployerBuilder {
    pub fn new() -> Self {
        Self {
            mode: DeploymentMode::Dev,
            deployments_dir: None,
            artifacts_dir: None,
            export_dir: None,
            shared: default_shared_config(),
            confirmation: ConfirmationPolicy::default(),
            max_parallel_targets: None,
            target_deadline_secs: None,
            verify_reused_code: false,
            export_abis: Vec::new(),
            targets: Vec::new(),
            create_dirs: false,
        }
    }

    pub fn mode(mut self, mode: DeploymentMode) -> Self {
        self.mode = mode;
        self
    }

    /// Set the ledger directory.
    ///
    /// If not set, defaults to `./deployments`.
    pub fn deployments_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.deployments_dir = Some(path.into());
        self
    }

    /// Set the compiled artifacts directory.
    ///
    /// If not set, defaults to `./out`.
    pub fn artifacts_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.artifacts_dir = Some(path.into());
        self
    }

    /// Set the export directory.
    ///
    /// If not set, defaults to `<deployments_dir>/export`.
    pub fn export_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.export_dir = Some(path.into());
        self
    }

    /// Set a shared config value, replacing any default.
    pub fn shared(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.shared.insert(key, value);
        self
    }

    pub fn confirmation(mut self, confirmation: ConfirmationPolicy) -> Self {
        self.confirmation = confirmation;
        self
    }

    pub fn max_parallel_targets(mut self, max: usize) -> Self {
        self.max_parallel_targets = Some(max);
        self
    }

    pub fn target_deadline_secs(mut self, secs: u64) -> Self {
        self.target_deadline_secs = Some(secs);
        self
    }

    pub fn verify_reused_code(mut self, verify: bool) -> Self {
        self.verify_reused_code = verify;
        self
    }

    /// Add a contract whose ABI is exported to `abis.json`.
    pub fn export_abi(mut self, contract: impl Into<String>) -> Self {
        self.export_abis.push(contract.into());
        self
    }

    /// Add a target with default parameters.
    pub fn target(self, chain_id: u64, rpc_url: Url, plan: PlanKind) -> Self {
        self.target_config(TargetConfig::new(chain_id, rpc_url, plan))
    }

    pub fn target_config(mut self, target: TargetConfig) -> Self {
        self.targets.push(target);
        self
    }

    /// Create the ledger and export directories when building.
    pub fn create_dirs(mut self, create: bool) -> Self {
        self.create_dirs = create;
        self
    }

    /// Build the [`Deployer`] configuration.
    pub fn build(self) -> Result<Deployer> {
        let deployments_dir = self
            .deployments_dir
            .unwrap_or_else(|| PathBuf::from("deployments"));
        let export_dir = self
            .export_dir
            .unwrap_or_else(|| deployments_dir.join("export"));

        if self.create_dirs {
            for dir in [&deployments_dir, &export_dir] {
                std::fs::create_dir_all(dir)
                    .context(format!("Failed to create directory {}", dir.display()))?;
            }
        }

        let deployer = Deployer {
            mode: self.mode,
            deployments_dir,
            artifacts_dir: self.artifacts_dir.unwrap_or_else(|| PathBuf::from("out")),
            export_dir,
            max_parallel_targets: self
                .max_parallel_targets
                .unwrap_or(Deployer::default().max_parallel_targets),
            target_deadline_secs: self.target_deadline_secs,
            verify_reused_code: self.verify_reused_code,
            export_abis: self.export_abis,
            shared: self.shared,
            confirmation: self.confirmation,
            targets: self.targets,
        };
        deployer.validate()?;

        tracing::debug!(
            mode = %deployer.mode,
            targets = deployer.targets.len(),
            ledger = %deployer.ledger_store().path().display(),
            "Built deployer configuration"
        );

        Ok(deployer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempdir::TempDir;

    #[test]
    fn test_builder_defaults() {
        let deployer = DeployerBuilder::new().build().unwrap();
        assert_eq!(deployer.mode, DeploymentMode::Dev);
        assert_eq!(deployer.deployments_dir, PathBuf::from("deployments"));
        assert_eq!(deployer.export_dir, PathBuf::from("deployments/export"));
        assert_eq!(deployer.artifacts_dir, PathBuf::from("out"));
        assert!(deployer.targets.is_empty());
        assert!(deployer.shared.contains_key("feesData"));
    }

    #[test]
    fn test_builder_with_options() {
        let deployer = DeployerBuilder::new()
            .mode(DeploymentMode::Prod)
            .deployments_dir("deploy")
            .shared("watcher", "0x0000000000000000000000000000000000000001")
            .max_parallel_targets(2)
            .target(3605, "http://localhost:8545".parse().unwrap(), PlanKind::Watcher)
            .build()
            .unwrap();

        assert_eq!(deployer.mode, DeploymentMode::Prod);
        assert_eq!(deployer.export_dir, PathBuf::from("deploy/export"));
        assert_eq!(deployer.max_parallel_targets, 2);
        assert_eq!(deployer.targets[0].plan, PlanKind::Watcher);
        assert_eq!(
            deployer.shared.get("watcher").map(String::as_str),
            Some("0x0000000000000000000000000000000000000001")
        );
    }

    #[test]
    fn test_builder_rejects_duplicate_targets() {
        let url: Url = "http://localhost:8545".parse().unwrap();
        let result = DeployerBuilder::new()
            .target(3605, url.clone(), PlanKind::Core)
            .target(3605, url, PlanKind::Watcher)
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn test_builder_creates_dirs() {
        let dir = TempDir::new("builder").unwrap();
        let deployer = DeployerBuilder::new()
            .deployments_dir(dir.path().join("deployments"))
            .create_dirs(true)
            .build()
            .unwrap();

        assert!(deployer.deployments_dir.is_dir());
        assert!(deployer.export_dir.is_dir());
    }
}
