//! Per-target deployment context.

use std::{collections::BTreeMap, sync::Arc};

use alloy_core::primitives::Address;
use alloy_signer_local::PrivateKeySigner;
use derive_more::{Deref, Display, From};
use serde::{Deserialize, Serialize};

use crate::{ConfirmationPolicy, LedgerSlice, TxOverrides};

/// Config key resolving to the target's signer address.
pub const SIGNER_KEY: &str = "signer";
/// Config key resolving to the target identifier.
pub const CHAIN_SLUG_KEY: &str = "chainSlug";

/// Identifier of one execution target (a chain).
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Display,
    From,
    Serialize,
    Deserialize,
)]
#[serde(transparent)]
pub struct TargetId(pub u64);

/// Shared configuration values that constructor arguments can reference by key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deref, From, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConfigValues(BTreeMap<String, String>);

impl ConfigValues {
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    /// Layer `other` on top of `self`; keys in `other` win.
    pub fn merged(&self, other: &ConfigValues) -> ConfigValues {
        let mut merged = self.clone();
        merged.0.extend(other.0.iter().map(|(k, v)| (k.clone(), v.clone())));
        merged
    }

    /// Values for one target: the shared values plus the reserved
    /// [`SIGNER_KEY`] and [`CHAIN_SLUG_KEY`] entries.
    pub fn for_target(&self, target: TargetId, signer: Address) -> ConfigValues {
        let mut values = self.clone();
        values.insert(SIGNER_KEY, signer.to_checksum(None));
        values.insert(CHAIN_SLUG_KEY, target.to_string());
        values
    }
}

/// Everything the sequencer needs to work on one target.
///
/// The signer is owned by the context and never shared with another target.
/// The transport handle is shared for the lifetime of the run. The ledger
/// slice is borrowed exclusively from the target's ledger session.
pub struct TargetContext<'a, T> {
    pub target: TargetId,
    pub signer: PrivateKeySigner,
    pub transport: Arc<T>,
    pub ledger: &'a mut LedgerSlice,
    pub config: ConfigValues,
    pub overrides: TxOverrides,
    pub confirmation: ConfirmationPolicy,
}

impl<T> TargetContext<'_, T> {
    pub fn signer_address(&self) -> Address {
        self.signer.address()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_target_values_include_reserved_keys() {
        let mut shared = ConfigValues::default();
        shared.insert("watcher", "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266");

        let signer = Address::repeat_byte(0x11);
        let values = shared.for_target(TargetId(3605), signer);

        assert_eq!(values.get(CHAIN_SLUG_KEY).map(String::as_str), Some("3605"));
        assert_eq!(
            values.get(SIGNER_KEY).map(String::as_str),
            Some(signer.to_checksum(None).as_str())
        );
        assert!(values.contains_key("watcher"));
    }

    #[test]
    fn test_merged_prefers_other() {
        let mut base = ConfigValues::default();
        base.insert("a", "1");
        base.insert("b", "2");
        let mut other = ConfigValues::default();
        other.insert("b", "3");

        let merged = base.merged(&other);
        assert_eq!(merged.get("a").map(String::as_str), Some("1"));
        assert_eq!(merged.get("b").map(String::as_str), Some("3"));
    }
}
