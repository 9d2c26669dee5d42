//! Scoped ownership of one target's ledger slice.

use derive_more::{Deref, DerefMut};

use crate::{LedgerSlice, LedgerStore, TargetId, error::LedgerError};

/// A target's in-memory ledger slice, flushed to its store on every exit path.
///
/// [`LedgerSession::close`] persists explicitly and reports the outcome. If a
/// session is dropped without being closed (the run future was cancelled), the
/// slice is flushed from `Drop` and failures are only logged.
#[derive(Debug, Deref, DerefMut)]
pub struct LedgerSession<'a> {
    store: &'a LedgerStore,
    target: TargetId,
    #[deref]
    #[deref_mut]
    slice: LedgerSlice,
    closed: bool,
}

impl<'a> LedgerSession<'a> {
    /// Load the current slice of `target` from `store`.
    pub fn open(store: &'a LedgerStore, target: TargetId) -> Result<Self, LedgerError> {
        let slice = store.load(target)?;
        tracing::debug!(
            chain_id = %target,
            entries = slice.len(),
            path = %store.path().display(),
            "Ledger session opened"
        );
        Ok(Self {
            store,
            target,
            slice,
            closed: false,
        })
    }

    /// Persist the slice without ending the session.
    pub fn flush(&self) -> Result<(), LedgerError> {
        self.store.persist(self.target, &self.slice)
    }

    /// Persist the slice and hand it back.
    pub fn close(mut self) -> Result<LedgerSlice, LedgerError> {
        self.closed = true;
        self.flush()?;
        tracing::info!(chain_id = %self.target, entries = self.slice.len(), "Ledger persisted");
        Ok(std::mem::take(&mut self.slice))
    }
}

impl Drop for LedgerSession<'_> {
    fn drop(&mut self) {
        if self.closed {
            return;
        }

        match self.flush() {
            Ok(()) => tracing::warn!(
                chain_id = %self.target,
                entries = self.slice.len(),
                "Ledger flushed from an interrupted session"
            ),
            Err(e) => tracing::error!(
                chain_id = %self.target,
                err = %e,
                "Failed to flush ledger from an interrupted session"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DeploymentMode;
    use alloy_core::primitives::Address;
    use tempdir::TempDir;

    #[test]
    fn test_close_persists_and_returns_slice() {
        let dir = TempDir::new("session").unwrap();
        let store = LedgerStore::for_mode(dir.path(), DeploymentMode::Dev);

        let mut session = LedgerSession::open(&store, TargetId(421614)).unwrap();
        session.set("Watcher", Address::repeat_byte(0x01));
        let slice = session.close().unwrap();

        assert_eq!(slice.get("Watcher"), Some(Address::repeat_byte(0x01)));
        assert_eq!(store.load(TargetId(421614)).unwrap(), slice);
    }

    #[test]
    fn test_drop_flushes_unclosed_session() {
        let dir = TempDir::new("session").unwrap();
        let store = LedgerStore::for_mode(dir.path(), DeploymentMode::Dev);

        {
            let mut session = LedgerSession::open(&store, TargetId(3605)).unwrap();
            session.set("Hasher", Address::repeat_byte(0x02));
        }

        let slice = store.load(TargetId(3605)).unwrap();
        assert_eq!(slice.get("Hasher"), Some(Address::repeat_byte(0x02)));
    }

    #[test]
    fn test_reopen_sees_previous_entries() {
        let dir = TempDir::new("session").unwrap();
        let store = LedgerStore::for_mode(dir.path(), DeploymentMode::Surge);

        let mut session = LedgerSession::open(&store, TargetId(1)).unwrap();
        session.set("Socket", Address::repeat_byte(0x03));
        session.close().unwrap();

        let session = LedgerSession::open(&store, TargetId(1)).unwrap();
        assert!(session.contains("Socket"));
    }
}
