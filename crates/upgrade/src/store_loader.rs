//! One-shot store-schema rewrite.
//!
//! A `StoreLoaderRewrite` is bound to an exact height at boot and rewrites
//! the storage layout (add / rename / delete named sub-stores) before any
//! other component touches the store. It applies at most once: an
//! applied-marker is persisted in the reserved `upgrade` sub-store in the
//! same mutation batch as the rewrite, so a crash-replay of the same height
//! finds the marker and skips instead of double-applying.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use dstate_common::MultiStore;

use crate::registry::StoreDelta;
use crate::{UpgradeError, UPGRADE_STORE};

/// Store key holding the applied-marker record.
const APPLIED_KEY: &[u8] = b"applied";

/// Persisted proof that a named rewrite has run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct AppliedMarker {
    name: String,
    height: i64,
}

/// A store-schema rewrite bound to one upgrade at one height.
#[derive(Debug, Clone)]
pub struct StoreLoaderRewrite {
    name: String,
    height: i64,
    delta: StoreDelta,
}

impl StoreLoaderRewrite {
    #[must_use]
    pub fn new(name: impl Into<String>, height: i64, delta: StoreDelta) -> Self {
        Self {
            name: name.into(),
            height,
            delta,
        }
    }

    /// Height the rewrite is bound to.
    #[must_use]
    pub fn height(&self) -> i64 {
        self.height
    }

    /// Upgrade name the rewrite belongs to.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// True if this exact rewrite has already been applied to the store.
    pub fn already_applied(store: &dyn MultiStore, name: &str, height: i64) -> bool {
        let Ok(Some(bytes)) = store.get(UPGRADE_STORE, APPLIED_KEY) else {
            return false;
        };
        match serde_json::from_slice::<AppliedMarker>(&bytes) {
            Ok(marker) => marker.name == name && marker.height == height,
            Err(_) => false,
        }
    }

    /// Apply the schema delta, consuming the rewrite.
    ///
    /// Order within the delta: renames first (so an upgrade may rename a
    /// legacy store and add a fresh one under the old name), then adds,
    /// then deletes. A marker hit makes the whole call a no-op.
    pub fn apply(self, store: &mut dyn MultiStore) -> Result<(), UpgradeError> {
        if Self::already_applied(store, &self.name, self.height) {
            warn!(
                upgrade = %self.name,
                height = self.height,
                "store rewrite already applied, skipping replay"
            );
            return Ok(());
        }

        for (old, new) in &self.delta.renamed {
            store.rename_store(old, new)?;
        }
        for name in &self.delta.added {
            store.add_store(name)?;
        }
        for name in &self.delta.deleted {
            store.delete_store(name)?;
        }

        let marker = AppliedMarker {
            name: self.name.clone(),
            height: self.height,
        };
        let bytes = serde_json::to_vec(&marker).map_err(|e| UpgradeError::InvalidPlan(
            format!("applied marker encode: {e}"),
        ))?;
        store.set(UPGRADE_STORE, APPLIED_KEY, &bytes)?;

        info!(
            upgrade = %self.name,
            height = self.height,
            added = self.delta.added.len(),
            renamed = self.delta.renamed.len(),
            deleted = self.delta.deleted.len(),
            "store rewrite applied"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dstate_common::MemoryMultiStore;
    use std::collections::BTreeSet;

    fn store_with_upgrade_partition() -> MemoryMultiStore {
        let mut store = MemoryMultiStore::new();
        store.add_store(UPGRADE_STORE).expect("add upgrade store");
        store
    }

    #[test]
    fn test_apply_adds_renames_deletes() {
        let mut store = store_with_upgrade_partition();
        store.add_store("legacy").expect("add");
        store.add_store("doomed").expect("add");
        store.set("legacy", b"k", b"v").expect("set");

        let delta = StoreDelta {
            added: BTreeSet::from(["feegrant".to_string()]),
            renamed: vec![("legacy".to_string(), "modern".to_string())],
            deleted: BTreeSet::from(["doomed".to_string()]),
        };
        StoreLoaderRewrite::new("v0.7.0", 100, delta)
            .apply(&mut store)
            .expect("apply");

        assert!(store.has_store("feegrant"));
        assert!(store.has_store("modern"));
        assert!(!store.has_store("legacy"));
        assert!(!store.has_store("doomed"));
        assert_eq!(store.get("modern", b"k").expect("get"), Some(b"v".to_vec()));
    }

    #[test]
    fn test_replay_is_idempotent() {
        let mut store = store_with_upgrade_partition();
        let delta = StoreDelta::adding(["feegrant", "feemarket"]);

        StoreLoaderRewrite::new("v0.7.0", 100, delta.clone())
            .apply(&mut store)
            .expect("first apply");

        // crash-recovery replay of the same height: the same rewrite is
        // constructed again and must be a no-op, not a StoreExists error
        StoreLoaderRewrite::new("v0.7.0", 100, delta)
            .apply(&mut store)
            .expect("replay apply");

        assert!(store.has_store("feegrant"));
        assert!(store.has_store("feemarket"));
    }

    #[test]
    fn test_already_applied_checks_name_and_height() {
        let mut store = store_with_upgrade_partition();
        StoreLoaderRewrite::new("v0.7.0", 100, StoreDelta::adding(["feegrant"]))
            .apply(&mut store)
            .expect("apply");

        assert!(StoreLoaderRewrite::already_applied(&store, "v0.7.0", 100));
        assert!(!StoreLoaderRewrite::already_applied(&store, "v0.8.0", 100));
        assert!(!StoreLoaderRewrite::already_applied(&store, "v0.7.0", 200));
    }

    #[test]
    fn test_failed_delta_surfaces_store_error() {
        let mut store = store_with_upgrade_partition();
        let delta = StoreDelta {
            renamed: vec![("ghost".to_string(), "anything".to_string())],
            ..StoreDelta::default()
        };
        let err = StoreLoaderRewrite::new("v0.7.0", 100, delta)
            .apply(&mut store)
            .expect_err("rename of missing store");
        assert!(matches!(err, UpgradeError::Store(_)));
        // no marker written on failure
        assert!(!StoreLoaderRewrite::already_applied(&store, "v0.7.0", 100));
    }
}
