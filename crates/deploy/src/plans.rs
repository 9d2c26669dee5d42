//! The fixed deployment plans.
//!
//! Every plan is hand-ordered: a component only references components listed
//! before it.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};

use crate::{ArgDescriptor, CHAIN_SLUG_KEY, Component, ConfigValues, DeploymentPlan, SIGNER_KEY};

/// Shared config key holding the watcher address.
pub const WATCHER_KEY: &str = "watcher";
/// Shared config key holding the `(chainSlug, token, amount)` fees tuple.
pub const FEES_DATA_KEY: &str = "feesData";

const DEFAULT_WATCHER: &str = "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266";
const DEFAULT_FEES_DATA: &str =
    "(421614,0xEeeeeEeeeEeEeeEeEeEeeEEEeeeeEeeeeeeeEEeE,1000000000000000)";

/// 10_000 tokens with 18 decimals.
const SUPER_TOKEN_LIMIT: &str = "10000000000000000000000";
/// 1_000_000_000 tokens with 18 decimals.
const SUPER_TOKEN_INITIAL_SUPPLY: &str = "1000000000000000000000000000";

/// Which fixed plan a target runs.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    Display,
    EnumString,
    EnumIter,
    Serialize,
    Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum PlanKind {
    /// Socket core contracts, deployed on every execution chain.
    #[default]
    Core,
    /// Watcher VM contracts and the super token app gateway.
    Watcher,
}

impl PlanKind {
    pub fn plan(self) -> DeploymentPlan {
        match self {
            Self::Core => core_plan(),
            Self::Watcher => watcher_plan(),
        }
    }
}

/// Default values for the shared config keys the plans reference.
pub fn default_shared_config() -> ConfigValues {
    let mut values = ConfigValues::default();
    values.insert(WATCHER_KEY, DEFAULT_WATCHER);
    values.insert(FEES_DATA_KEY, DEFAULT_FEES_DATA);
    values
}

fn signer() -> ArgDescriptor {
    ArgDescriptor::config(SIGNER_KEY)
}

fn chain_slug() -> ArgDescriptor {
    ArgDescriptor::config(CHAIN_SLUG_KEY)
}

pub fn core_plan() -> DeploymentPlan {
    DeploymentPlan::new()
        .deploy(
            Component::new("SignatureVerifier", "contracts/socket/utils/SignatureVerifier.sol")
                .arg(signer()),
        )
        .deploy(Component::new("Hasher", "contracts/socket/utils/Hasher.sol").arg(signer()))
        .deploy(
            Component::new("Socket", "contracts/socket/Socket.sol")
                .arg(chain_slug())
                .arg(ArgDescriptor::component("Hasher"))
                .arg(signer())
                .arg(ArgDescriptor::literal("BROKEN_LEG")),
        )
        .deploy(
            Component::new("TransmitManager", "contracts/socket/TransmitManager.sol")
                .arg(chain_slug())
                .arg(signer())
                .arg(ArgDescriptor::component("Hasher"))
                .arg(ArgDescriptor::component("SignatureVerifier"))
                .arg(ArgDescriptor::component("Socket")),
        )
        .deploy(
            Component::new(
                "FastSwitchboard",
                "contracts/socket/switchboard/FastSwitchboard.sol",
            )
            .arg(chain_slug())
            .arg(ArgDescriptor::component("Socket"))
            .arg(ArgDescriptor::component("SignatureVerifier"))
            .arg(signer()),
        )
        .deploy(
            Component::new(
                "PayloadDeliveryPlug",
                "contracts/apps/payload-delivery/PayloadDeliveryPlug.sol",
            )
            .arg(ArgDescriptor::component("Socket"))
            .arg(chain_slug())
            .arg(signer()),
        )
}

pub fn watcher_plan() -> DeploymentPlan {
    DeploymentPlan::new()
        .deploy(
            Component::new("Watcher", "contracts/watcher/Watcher.sol")
                .arg(ArgDescriptor::config(WATCHER_KEY)),
        )
        .deploy(
            Component::new("AddressResolver", "contracts/AddressResolver.sol")
                .arg(ArgDescriptor::config(WATCHER_KEY))
                .arg(ArgDescriptor::component("Watcher")),
        )
        .deploy(
            Component::new(
                "AuctionHouse",
                "contracts/apps/payload-delivery/app-gateway/AuctionHouse.sol",
            )
            .arg(ArgDescriptor::component("AddressResolver")),
        )
        .reconcile(
            "AddressResolver",
            "auctionHouse",
            "setAuctionHouse",
            ArgDescriptor::component("AuctionHouse"),
        )
        .deploy(
            Component::new(
                "SuperTokenDeployer",
                "contracts/apps/super-token/app-gateway/SuperTokenDeployer.sol",
            )
            .arg(ArgDescriptor::component("AddressResolver"))
            .arg(signer())
            .arg(ArgDescriptor::literal(SUPER_TOKEN_LIMIT))
            .arg(ArgDescriptor::literal(SUPER_TOKEN_LIMIT))
            .arg(ArgDescriptor::literal("SUPER TOKEN"))
            .arg(ArgDescriptor::literal("SUPER"))
            .arg(ArgDescriptor::literal("18"))
            .arg(signer())
            .arg(ArgDescriptor::literal(SUPER_TOKEN_INITIAL_SUPPLY))
            .arg(ArgDescriptor::config(FEES_DATA_KEY)),
        )
        .deploy(
            Component::new(
                "SuperTokenApp",
                "contracts/apps/super-token/app-gateway/SuperTokenApp.sol",
            )
            .arg(ArgDescriptor::component("AddressResolver"))
            .arg(ArgDescriptor::config(FEES_DATA_KEY))
            .arg(ArgDescriptor::component("SuperTokenDeployer")),
        )
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use strum::IntoEnumIterator;

    use super::*;
    use crate::Step;

    /// Every component reference points at a component deployed earlier.
    #[test]
    fn test_plans_are_topologically_ordered() {
        for kind in PlanKind::iter() {
            let mut deployed = HashSet::new();
            for step in kind.plan().steps {
                let refs = match &step {
                    Step::Deploy(component) => component.args.clone(),
                    Step::Reconcile(setting) => vec![setting.value.clone()],
                };
                for arg in refs {
                    if let ArgDescriptor::ComponentRef(name) = arg {
                        assert!(
                            deployed.contains(&name),
                            "{kind}: `{}` references `{name}` before it is deployed",
                            step.label()
                        );
                    }
                }
                if let Step::Deploy(component) = step {
                    assert!(deployed.insert(component.name.clone()));
                }
            }
        }
    }

    #[test]
    fn test_plans_only_reference_known_config() {
        let known: HashSet<String> = default_shared_config()
            .keys()
            .cloned()
            .chain([SIGNER_KEY.to_string(), CHAIN_SLUG_KEY.to_string()])
            .collect();

        for kind in PlanKind::iter() {
            for component in kind.plan().components() {
                for arg in &component.args {
                    if let ArgDescriptor::ConfigRef(key) = arg {
                        assert!(known.contains(key), "{kind}: unknown config key `{key}`");
                    }
                }
            }
        }
    }

    #[test]
    fn test_plan_kind_parsing() {
        assert_eq!("watcher".parse::<PlanKind>().unwrap(), PlanKind::Watcher);
        assert_eq!(PlanKind::Core.to_string(), "core");
        assert!("socket".parse::<PlanKind>().is_err());
    }
}
