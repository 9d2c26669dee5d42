//! Per-target address ledger and its durable storage.
//!
//! The ledger file is one JSON document per deployment mode, keyed by target
//! identifier. Each value maps component names to addresses, plus an optional
//! `startBlock`:
//!
//! ```json
//! {
//!   "421614": {
//!     "SignatureVerifier": "0x5FbDB2315678afecb367f032d93F642f64180aa3",
//!     "startBlock": 1024
//!   }
//! }
//! ```

use std::{
    collections::BTreeMap,
    fs::{self, File, OpenOptions},
    io::Write,
    path::{Path, PathBuf},
    sync::{Mutex, PoisonError},
};

use alloy_core::primitives::Address;
use fs2::FileExt;
use serde::{Deserialize, Serialize};

use crate::{DeploymentMode, TargetId, error::LedgerError};

/// Every target's slice, keyed by target identifier.
pub type LedgerDocument = BTreeMap<TargetId, LedgerSlice>;

/// The ledger file as stored, slices unparsed.
type RawDocument = BTreeMap<TargetId, serde_json::Value>;

/// The ledger entries of a single target.
///
/// Addresses are stored parsed, so lookups and comparisons are
/// case-insensitive regardless of how the file spelled them. Values that are
/// not strings are carried through untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawSlice", into = "RawSlice")]
pub struct LedgerSlice {
    entries: BTreeMap<String, Address>,
    start_block: Option<u64>,
    extra: BTreeMap<String, serde_json::Value>,
}

#[derive(Serialize, Deserialize)]
struct RawSlice {
    #[serde(rename = "startBlock", default, skip_serializing_if = "Option::is_none")]
    start_block: Option<u64>,
    #[serde(flatten)]
    values: BTreeMap<String, serde_json::Value>,
}

impl TryFrom<RawSlice> for LedgerSlice {
    type Error = LedgerError;

    fn try_from(raw: RawSlice) -> Result<Self, Self::Error> {
        let mut slice = LedgerSlice {
            start_block: raw.start_block,
            ..Default::default()
        };

        for (component, value) in raw.values {
            match value {
                // An empty string is an unresolved entry.
                serde_json::Value::String(s) if s.is_empty() => {}
                serde_json::Value::String(s) => {
                    let address = s.parse::<Address>().map_err(|_| LedgerError::InvalidAddress {
                        component: component.clone(),
                        value: s.clone(),
                    })?;
                    slice.entries.insert(component, address);
                }
                other => {
                    slice.extra.insert(component, other);
                }
            }
        }

        Ok(slice)
    }
}

impl From<LedgerSlice> for RawSlice {
    fn from(slice: LedgerSlice) -> Self {
        let mut values = slice.extra;
        values.extend(
            slice
                .entries
                .into_iter()
                .map(|(name, address)| (name, serde_json::Value::String(address.to_checksum(None)))),
        );

        RawSlice {
            start_block: slice.start_block,
            values,
        }
    }
}

impl LedgerSlice {
    /// Returns the recorded address of `component`, if any.
    pub fn get(&self, component: &str) -> Option<Address> {
        self.entries.get(component).copied()
    }

    /// Record `address` for `component`, returning the previous address.
    ///
    /// Replacing a different address is permitted (redeploy-and-replace) but
    /// logged.
    pub fn set(&mut self, component: impl Into<String>, address: Address) -> Option<Address> {
        let component = component.into();
        let previous = self.entries.insert(component.clone(), address);

        if let Some(previous) = previous.filter(|previous| *previous != address) {
            tracing::warn!(
                component = %component,
                previous = %previous,
                address = %address,
                "Overwriting ledger entry with a different address"
            );
        }

        previous
    }

    pub fn contains(&self, component: &str) -> bool {
        self.entries.contains_key(component)
    }

    /// Iterate over `(component, address)` pairs in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, Address)> {
        self.entries.iter().map(|(name, address)| (name.as_str(), *address))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn start_block(&self) -> Option<u64> {
        self.start_block
    }

    pub fn set_start_block(&mut self, block: u64) {
        self.start_block = Some(block);
    }
}

/// Durable storage for the ledger document of one deployment mode.
///
/// Writes replace the whole document through a temporary file and a rename,
/// so a reader sees either the previous or the next version, never a torn
/// one. Concurrent persists (from concurrently running targets or another
/// process) are serialized by an in-process mutex and an exclusive lock on a
/// sibling `.lock` file.
#[derive(Debug)]
pub struct LedgerStore {
    path: PathBuf,
    write_guard: Mutex<()>,
}

impl LedgerStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_guard: Mutex::new(()),
        }
    }

    /// Store for `<dir>/<mode>_addresses.json`.
    pub fn for_mode(dir: &Path, mode: DeploymentMode) -> Self {
        Self::new(dir.join(mode.ledger_file_name()))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the document with every slice left as raw JSON.
    fn load_raw(&self) -> Result<RawDocument, LedgerError> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %self.path.display(), "No ledger file yet, starting empty");
                return Ok(RawDocument::new());
            }
            Err(source) => {
                return Err(LedgerError::Io {
                    action: "read",
                    path: self.path.clone(),
                    source,
                });
            }
        };

        if content.trim().is_empty() {
            return Ok(RawDocument::new());
        }

        serde_json::from_str(&content).map_err(|source| LedgerError::Parse {
            path: self.path.clone(),
            source,
        })
    }

    fn parse_slice(
        &self,
        target: TargetId,
        value: serde_json::Value,
    ) -> Result<LedgerSlice, LedgerError> {
        serde_json::from_value(value).map_err(|source| LedgerError::Slice {
            target,
            path: self.path.clone(),
            source,
        })
    }

    /// Read and parse every target's slice. A missing file is an empty ledger.
    pub fn load_all(&self) -> Result<LedgerDocument, LedgerError> {
        self.load_raw()?
            .into_iter()
            .map(|(target, value)| Ok((target, self.parse_slice(target, value)?)))
            .collect()
    }

    /// Read the slice of one target. Absent targets yield an empty slice.
    ///
    /// Only this target's slice is parsed, so a malformed entry recorded for
    /// another target does not get in the way.
    pub fn load(&self, target: TargetId) -> Result<LedgerSlice, LedgerError> {
        match self.load_raw()?.remove(&target) {
            Some(value) => self.parse_slice(target, value),
            None => Ok(LedgerSlice::default()),
        }
    }

    /// Replace the slice of `target` in the durable document.
    ///
    /// Other targets' slices are re-read under the lock and written back
    /// verbatim, without being parsed.
    pub fn persist(&self, target: TargetId, slice: &LedgerSlice) -> Result<(), LedgerError> {
        let _guard = self
            .write_guard
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let lock_file = self.lock_file()?;

        let mut document = self.load_raw()?;
        document.insert(
            target,
            serde_json::to_value(slice).map_err(LedgerError::Serialize)?,
        );

        let bytes = serde_json::to_vec_pretty(&document).map_err(LedgerError::Serialize)?;
        write_atomic(&self.path, &bytes)?;

        // Closing the handle would release the lock too; unlock explicitly so
        // failures show up in the logs.
        if let Err(e) = FileExt::unlock(&lock_file) {
            tracing::warn!(err = %e, path = %self.path.display(), "Failed to release ledger lock");
        }

        tracing::debug!(
            chain_id = %target,
            entries = slice.len(),
            path = %self.path.display(),
            "Ledger slice persisted"
        );

        Ok(())
    }

    fn lock_file(&self) -> Result<File, LedgerError> {
        let lock_path = self.path.with_extension("json.lock");
        ensure_parent(&lock_path)?;

        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&lock_path)
            .map_err(|source| LedgerError::Io {
                action: "open lock for",
                path: lock_path.clone(),
                source,
            })?;

        file.lock_exclusive().map_err(|source| LedgerError::Io {
            action: "lock",
            path: lock_path,
            source,
        })?;

        Ok(file)
    }
}

fn ensure_parent(path: &Path) -> Result<(), LedgerError> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => {
            fs::create_dir_all(parent).map_err(|source| LedgerError::Io {
                action: "create directory for",
                path: path.to_path_buf(),
                source,
            })
        }
        _ => Ok(()),
    }
}

fn io_error(action: &'static str, path: &Path) -> impl FnOnce(std::io::Error) -> LedgerError {
    let path = path.to_path_buf();
    move |source| LedgerError::Io {
        action,
        path,
        source,
    }
}

/// Write `bytes` to `path` through a synced temporary file and a rename.
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), LedgerError> {
    ensure_parent(path)?;

    let mut tmp_name = path.file_name().unwrap_or_default().to_os_string();
    tmp_name.push(format!(".{}.tmp", std::process::id()));
    let tmp_path = path.with_file_name(tmp_name);

    let written = File::create(&tmp_path)
        .map_err(io_error("create", &tmp_path))
        .and_then(|mut file| {
            file.write_all(bytes).map_err(io_error("write", &tmp_path))?;
            file.sync_all().map_err(io_error("sync", &tmp_path))
        })
        .and_then(|()| fs::rename(&tmp_path, path).map_err(io_error("replace", path)));

    if written.is_err() && tmp_path.exists() {
        if let Err(e) = fs::remove_file(&tmp_path) {
            tracing::warn!(err = %e, path = %tmp_path.display(), "Failed to remove temporary file");
        }
    }

    written
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_core::primitives::address;
    use tempdir::TempDir;

    const VERIFIER: Address = address!("0xabcabcabcabcabcabcabcabcabcabcabcabcabc0");
    const HASHER: Address = address!("0x5FbDB2315678afecb367f032d93F642f64180aa3");

    #[test]
    fn test_load_missing_file_is_empty() {
        let dir = TempDir::new("ledger").unwrap();
        let store = LedgerStore::for_mode(dir.path(), DeploymentMode::Dev);

        assert!(store.load_all().unwrap().is_empty());
        assert!(store.load(TargetId(421614)).unwrap().is_empty());
        assert!(!store.path().exists(), "loading must not create the file");
    }

    #[test]
    fn test_persist_then_load() {
        let dir = TempDir::new("ledger").unwrap();
        let store = LedgerStore::for_mode(dir.path(), DeploymentMode::Dev);

        let mut slice = LedgerSlice::default();
        slice.set("SignatureVerifier", VERIFIER);
        slice.set_start_block(1024);
        store.persist(TargetId(421614), &slice).unwrap();

        let loaded = store.load(TargetId(421614)).unwrap();
        assert_eq!(loaded, slice);
        assert_eq!(loaded.start_block(), Some(1024));
        assert!(store.path().ends_with("dev_addresses.json"));
    }

    #[test]
    fn test_persist_keeps_other_targets() {
        let dir = TempDir::new("ledger").unwrap();
        let store = LedgerStore::for_mode(dir.path(), DeploymentMode::Dev);

        let mut a = LedgerSlice::default();
        a.set("Hasher", HASHER);
        store.persist(TargetId(1), &a).unwrap();

        let mut b = LedgerSlice::default();
        b.set("SignatureVerifier", VERIFIER);
        store.persist(TargetId(2), &b).unwrap();

        let document = store.load_all().unwrap();
        assert_eq!(document.len(), 2);
        assert_eq!(document[&TargetId(1)].get("Hasher"), Some(HASHER));
        assert_eq!(document[&TargetId(2)].get("SignatureVerifier"), Some(VERIFIER));
    }

    #[test]
    fn test_addresses_compare_case_insensitively() {
        let json = r#"{
            "3605": {
                "SignatureVerifier": "0xABCABCABCABCABCABCABCABCABCABCABCABCABC0",
                "Hasher": "0x5fbdb2315678afecb367f032d93f642f64180aa3",
                "Socket": "",
                "startBlock": 7
            }
        }"#;
        let document: LedgerDocument = serde_json::from_str(json).unwrap();
        let slice = &document[&TargetId(3605)];

        assert_eq!(slice.get("SignatureVerifier"), Some(VERIFIER));
        assert_eq!(slice.get("Hasher"), Some(HASHER));
        assert_eq!(slice.get("Socket"), None, "empty entries are unresolved");
        assert_eq!(slice.start_block(), Some(7));
    }

    #[test]
    fn test_non_address_values_survive_round_trip() {
        let json = r#"{"1": {"Hasher": "0x5FbDB2315678afecb367f032d93F642f64180aa3", "integrations": {"2": {}}}}"#;
        let document: LedgerDocument = serde_json::from_str(json).unwrap();

        let value = serde_json::to_value(&document).unwrap();
        assert_eq!(value["1"]["integrations"], serde_json::json!({"2": {}}));
        assert_eq!(value["1"]["Hasher"], "0x5FbDB2315678afecb367f032d93F642f64180aa3");
        assert!(value["1"].get("startBlock").is_none());
    }

    #[test]
    fn test_malformed_address_is_rejected() {
        let json = r#"{"1": {"Hasher": "0x1234"}}"#;
        assert!(serde_json::from_str::<LedgerDocument>(json).is_err());
    }

    #[test]
    fn test_set_returns_previous_address() {
        let mut slice = LedgerSlice::default();
        assert_eq!(slice.set("Hasher", HASHER), None);
        assert_eq!(slice.set("Hasher", VERIFIER), Some(HASHER));
        assert_eq!(slice.get("Hasher"), Some(VERIFIER));
        assert_eq!(slice.len(), 1);
    }

    #[test]
    fn test_malformed_slice_only_affects_its_target() {
        let dir = TempDir::new("ledger").unwrap();
        let store = LedgerStore::for_mode(dir.path(), DeploymentMode::Dev);
        std::fs::write(store.path(), r#"{"1": {"Hasher": "0x1234"}}"#).unwrap();

        assert!(matches!(
            store.load(TargetId(1)),
            Err(LedgerError::Slice { target: TargetId(1), .. })
        ));
        assert!(store.load(TargetId(2)).unwrap().is_empty());
        assert!(store.load_all().is_err());

        let mut slice = LedgerSlice::default();
        slice.set("Hasher", HASHER);
        store.persist(TargetId(2), &slice).unwrap();

        let raw: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(store.path()).unwrap()).unwrap();
        assert_eq!(raw["1"], serde_json::json!({"Hasher": "0x1234"}));
        assert_eq!(store.load(TargetId(2)).unwrap(), slice);
    }

    #[test]
    fn test_failed_write_leaves_no_temporary_file() {
        let dir = TempDir::new("ledger").unwrap();
        // A directory in the way makes the final rename fail.
        let path = dir.path().join("dev_addresses.json");
        std::fs::create_dir(&path).unwrap();
        std::fs::write(path.join("occupied"), b"").unwrap();

        assert!(write_atomic(&path, b"{}").is_err());

        let leftovers: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|entry| entry.unwrap().file_name())
            .filter(|name| name.to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty(), "left behind {leftovers:?}");
    }

    #[test]
    fn test_corrupt_file_is_an_error() {
        let dir = TempDir::new("ledger").unwrap();
        let store = LedgerStore::for_mode(dir.path(), DeploymentMode::Dev);
        std::fs::write(store.path(), "{ not json").unwrap();

        assert!(matches!(store.load_all(), Err(LedgerError::Parse { .. })));
    }
}
