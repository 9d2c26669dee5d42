//! Deploy-or-skip decision.

use alloy_core::primitives::Address;

use crate::{ChainTransport, Component, LedgerSlice, TargetContext};

/// Whether a component needs a fresh deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// The ledger already holds an address; nothing is submitted.
    Reused(Address),
    Deploy,
}

/// Decide whether `component` must be deployed.
///
/// The ledger is trusted: a recorded address is reused without checking that
/// code still lives there, and without checking that the target is reachable.
pub fn resolve(ledger: &LedgerSlice, component: &Component) -> Resolution {
    match ledger.get(&component.name) {
        Some(address) => Resolution::Reused(address),
        None => Resolution::Deploy,
    }
}

impl<T> TargetContext<'_, T> {
    pub fn resolve(&self, component: &Component) -> Resolution {
        resolve(self.ledger, component)
    }
}

/// Warn when a reused address has no code on the target.
///
/// Only a diagnostic: the entry is still reused.
pub async fn warn_if_codeless<T: ChainTransport>(
    transport: &T,
    component: &Component,
    address: Address,
) {
    match transport.code_at(address).await {
        Ok(code) if code.is_empty() => tracing::warn!(
            component = %component.name,
            address = %address,
            "Ledger entry points at an address without code"
        ),
        Ok(_) => {}
        Err(e) => tracing::warn!(
            component = %component.name,
            address = %address,
            err = %e,
            "Could not verify code of reused address"
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recorded_address_is_reused() {
        let address = Address::repeat_byte(0xab);
        let mut ledger = LedgerSlice::default();
        ledger.set("Hasher", address);

        let hasher = Component::new("Hasher", "contracts/socket/utils/Hasher.sol");
        assert_eq!(resolve(&ledger, &hasher), Resolution::Reused(address));
    }

    #[test]
    fn test_unknown_component_is_deployed() {
        let socket = Component::new("Socket", "contracts/socket/Socket.sol");
        assert_eq!(resolve(&LedgerSlice::default(), &socket), Resolution::Deploy);
    }

    #[test]
    fn test_lookup_uses_ledger_name_not_contract() {
        let address = Address::repeat_byte(0x01);
        let mut ledger = LedgerSlice::default();
        ledger.set("SuperTokenVault", address);

        let mut vault = Component::new("SuperTokenVault", "contracts/apps/Vault.sol");
        vault.contract = "Vault".into();
        assert_eq!(resolve(&ledger, &vault), Resolution::Reused(address));
    }
}
