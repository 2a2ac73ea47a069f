//! Per-module consensus-version bookkeeping.
//!
//! The version map records, for every module, the consensus version its
//! *state* was last migrated to. Comparing it against the version each
//! module's *code* reports decides which migrations still need to run.
//!
//! ## Guarantees
//!
//! - Versions are non-decreasing for the whole lifetime of the map
//! - Iteration is name-ordered (`BTreeMap`), so replicas agree on order
//! - Persisted as JSON inside the reserved `upgrade` sub-store

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use dstate_common::{MultiStore, StoreError};

use crate::UPGRADE_STORE;

/// Store key holding the serialized version map.
const VERSIONS_KEY: &[u8] = b"versions";

/// Errors from version-map updates and persistence.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum VersionMapError {
    /// Attempted to move a module's version backwards.
    #[error("version for module {module} may not decrease: {current} -> {proposed}")]
    Decreasing {
        module: String,
        current: u64,
        proposed: u64,
    },

    /// The persisted map could not be decoded.
    #[error("persisted version map is corrupt: {0}")]
    Corrupt(String),

    /// Underlying store operation failed.
    #[error("store error: {0}")]
    Store(String),
}

impl From<StoreError> for VersionMapError {
    fn from(e: StoreError) -> Self {
        VersionMapError::Store(e.to_string())
    }
}

/// Module name -> consensus version, non-decreasing per module.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionMap {
    versions: BTreeMap<String, u64>,
}

impl VersionMap {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Version recorded for a module, if any. A module with no entry has
    /// never been migrated (treated as version 0 by the coordinator).
    #[must_use]
    pub fn get(&self, module: &str) -> Option<u64> {
        self.versions.get(module).copied()
    }

    /// Record a module's version. Setting an equal version is a no-op;
    /// setting a lower version is rejected.
    pub fn set(&mut self, module: &str, version: u64) -> Result<(), VersionMapError> {
        if let Some(current) = self.get(module) {
            if version < current {
                return Err(VersionMapError::Decreasing {
                    module: module.to_string(),
                    current,
                    proposed: version,
                });
            }
        }
        self.versions.insert(module.to_string(), version);
        Ok(())
    }

    /// Name-ordered iteration over all entries.
    pub fn iter(&self) -> impl Iterator<Item = (&str, u64)> {
        self.versions.iter().map(|(name, v)| (name.as_str(), *v))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.versions.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.versions.is_empty()
    }

    /// Load the persisted map from the reserved upgrade sub-store.
    /// An absent key yields an empty map (fresh chain).
    pub fn load(store: &dyn MultiStore) -> Result<Self, VersionMapError> {
        match store.get(UPGRADE_STORE, VERSIONS_KEY)? {
            Some(bytes) => {
                serde_json::from_slice(&bytes).map_err(|e| VersionMapError::Corrupt(e.to_string()))
            }
            None => Ok(Self::new()),
        }
    }

    /// Persist the map into the reserved upgrade sub-store.
    pub fn save(&self, store: &mut dyn MultiStore) -> Result<(), VersionMapError> {
        let bytes = serde_json::to_vec(self).map_err(|e| VersionMapError::Corrupt(e.to_string()))?;
        store.set(UPGRADE_STORE, VERSIONS_KEY, &bytes)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dstate_common::MemoryMultiStore;

    #[test]
    fn test_empty_map_has_no_entries() {
        let map = VersionMap::new();
        assert!(map.is_empty());
        assert_eq!(map.get("bank"), None);
    }

    #[test]
    fn test_set_and_get() {
        let mut map = VersionMap::new();
        map.set("bank", 2).expect("set");
        assert_eq!(map.get("bank"), Some(2));
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn test_versions_never_decrease() {
        let mut map = VersionMap::new();
        map.set("bank", 3).expect("set");

        // equal is a no-op, not an error
        map.set("bank", 3).expect("equal");

        let err = map.set("bank", 2).expect_err("decrease");
        assert_eq!(
            err,
            VersionMapError::Decreasing {
                module: "bank".to_string(),
                current: 3,
                proposed: 2,
            }
        );
        assert_eq!(map.get("bank"), Some(3));
    }

    #[test]
    fn test_monotone_across_many_updates() {
        let mut map = VersionMap::new();
        let mut last = 0;
        for v in [1, 1, 2, 5, 5, 9] {
            map.set("staking", v).expect("set");
            let now = map.get("staking").expect("entry");
            assert!(now >= last);
            last = now;
        }
        assert_eq!(map.get("staking"), Some(9));
    }

    #[test]
    fn test_iteration_is_name_ordered() {
        let mut map = VersionMap::new();
        map.set("staking", 1).expect("set");
        map.set("auth", 4).expect("set");
        map.set("bank", 2).expect("set");

        let entries: Vec<(&str, u64)> = map.iter().collect();
        assert_eq!(entries, vec![("auth", 4), ("bank", 2), ("staking", 1)]);
    }

    #[test]
    fn test_persistence_roundtrip() {
        let mut store = MemoryMultiStore::new();
        store.add_store(UPGRADE_STORE).expect("add");

        // absent key -> empty map
        let empty = VersionMap::load(&store).expect("load empty");
        assert!(empty.is_empty());

        let mut map = VersionMap::new();
        map.set("bank", 2).expect("set");
        map.set("auth", 1).expect("set");
        map.save(&mut store).expect("save");

        let loaded = VersionMap::load(&store).expect("load");
        assert_eq!(loaded, map);
    }

    #[test]
    fn test_corrupt_persisted_map_is_an_error() {
        let mut store = MemoryMultiStore::new();
        store.add_store(UPGRADE_STORE).expect("add");
        store
            .set(UPGRADE_STORE, VERSIONS_KEY, b"not json")
            .expect("set");

        let err = VersionMap::load(&store).expect_err("corrupt");
        assert!(matches!(err, VersionMapError::Corrupt(_)));
    }
}
