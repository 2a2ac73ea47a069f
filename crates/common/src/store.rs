//! Named Key-Value Multistore
//!
//! The persistent store is partitioned into named sub-stores, one per
//! application module plus a reserved `upgrade` partition for
//! version bookkeeping. The `MultiStore` trait is the only surface the
//! rest of the workspace sees; the real node backs it with a disk engine,
//! tests and the in-process app use [`MemoryMultiStore`].
//!
//! ## Guarantees
//!
//! - Store names are unique; adding an existing name is an error
//! - Rename moves the partition's entire contents under the new name
//! - Delete drops the partition and its contents
//! - No operation panics

use std::collections::HashMap;
use std::fmt::Debug;

use parking_lot::RwLock;
use thiserror::Error;

/// Errors from multistore operations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    /// The named sub-store does not exist.
    #[error("unknown store: {0}")]
    UnknownStore(String),

    /// A sub-store with this name already exists.
    #[error("store already exists: {0}")]
    StoreExists(String),
}

/// A key-value store partitioned into named sub-stores.
///
/// Schema operations (`add_store`, `rename_store`, `delete_store`) are only
/// legal during the load/init phase or inside an upgrade store rewrite; data
/// operations are legal any time the caller owns the store.
pub trait MultiStore: Debug + Send + Sync {
    /// True if a sub-store with this name exists.
    fn has_store(&self, name: &str) -> bool;

    /// Create an empty sub-store. Fails with [`StoreError::StoreExists`]
    /// if the name is taken.
    fn add_store(&mut self, name: &str) -> Result<(), StoreError>;

    /// Move a sub-store and all its contents to a new name.
    fn rename_store(&mut self, old: &str, new: &str) -> Result<(), StoreError>;

    /// Drop a sub-store and all its contents.
    fn delete_store(&mut self, name: &str) -> Result<(), StoreError>;

    /// Read a value from a named sub-store.
    fn get(&self, store: &str, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError>;

    /// Write a value into a named sub-store.
    fn set(&mut self, store: &str, key: &[u8], value: &[u8]) -> Result<(), StoreError>;

    /// Remove a key from a named sub-store. Removing an absent key is not
    /// an error.
    fn remove(&mut self, store: &str, key: &[u8]) -> Result<(), StoreError>;

    /// Names of all sub-stores, sorted, for deterministic inspection.
    fn store_names(&self) -> Vec<String>;
}

/// In-memory [`MultiStore`] backed by a `HashMap` of `HashMap`s.
///
/// Interior `RwLock` so shared read access does not require `&mut self`;
/// schema and write operations still take `&mut self` to keep the trait
/// honest about exclusive ownership during block execution.
#[derive(Debug, Default)]
pub struct MemoryMultiStore {
    stores: RwLock<HashMap<String, HashMap<Vec<u8>, Vec<u8>>>>,
}

impl MemoryMultiStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of keys in a sub-store, `None` if the store is absent.
    /// Test and inspection helper.
    #[must_use]
    pub fn len(&self, store: &str) -> Option<usize> {
        self.stores.read().get(store).map(HashMap::len)
    }
}

impl MultiStore for MemoryMultiStore {
    fn has_store(&self, name: &str) -> bool {
        self.stores.read().contains_key(name)
    }

    fn add_store(&mut self, name: &str) -> Result<(), StoreError> {
        let mut stores = self.stores.write();
        if stores.contains_key(name) {
            return Err(StoreError::StoreExists(name.to_string()));
        }
        stores.insert(name.to_string(), HashMap::new());
        Ok(())
    }

    fn rename_store(&mut self, old: &str, new: &str) -> Result<(), StoreError> {
        let mut stores = self.stores.write();
        if stores.contains_key(new) {
            return Err(StoreError::StoreExists(new.to_string()));
        }
        let contents = stores
            .remove(old)
            .ok_or_else(|| StoreError::UnknownStore(old.to_string()))?;
        stores.insert(new.to_string(), contents);
        Ok(())
    }

    fn delete_store(&mut self, name: &str) -> Result<(), StoreError> {
        self.stores
            .write()
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| StoreError::UnknownStore(name.to_string()))
    }

    fn get(&self, store: &str, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        let stores = self.stores.read();
        let sub = stores
            .get(store)
            .ok_or_else(|| StoreError::UnknownStore(store.to_string()))?;
        Ok(sub.get(key).cloned())
    }

    fn set(&mut self, store: &str, key: &[u8], value: &[u8]) -> Result<(), StoreError> {
        let mut stores = self.stores.write();
        let sub = stores
            .get_mut(store)
            .ok_or_else(|| StoreError::UnknownStore(store.to_string()))?;
        sub.insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    fn remove(&mut self, store: &str, key: &[u8]) -> Result<(), StoreError> {
        let mut stores = self.stores.write();
        let sub = stores
            .get_mut(store)
            .ok_or_else(|| StoreError::UnknownStore(store.to_string()))?;
        sub.remove(key);
        Ok(())
    }

    fn store_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.stores.read().keys().cloned().collect();
        names.sort();
        names
    }
}
