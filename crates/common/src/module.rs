//! Application Module Registry
//!
//! Modules are the unit of state-machine business logic and of schema
//! versioning. This crate only defines the seam: each module reports its
//! name and the consensus version its code implements, and knows how to
//! migrate its own store contents forward from an older version.
//!
//! The registry is keyed by module name and iterates in name order so
//! every replica walks modules in the same order.

use std::collections::BTreeMap;
use std::fmt;

use thiserror::Error;

use crate::store::MultiStore;

/// Errors surfaced by module migrations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ModuleError {
    /// A migration step failed; the message names the module and cause.
    #[error("migration failed for module {module}: {reason}")]
    MigrationFailed { module: String, reason: String },

    /// A module was registered twice under the same name.
    #[error("module already registered: {0}")]
    DuplicateModule(String),
}

/// A state-machine module as seen by the upgrade subsystem.
///
/// `consensus_version` is the version the *code* implements; the version
/// map records the version the *state* was last migrated to. A module
/// needs migration whenever code version exceeds the recorded version.
pub trait AppModule: Send + Sync {
    /// Unique module name, also its sub-store name.
    fn name(&self) -> &str;

    /// Consensus version implemented by this binary.
    fn consensus_version(&self) -> u64;

    /// Migrate this module's state from `from_version` up to
    /// [`AppModule::consensus_version`]. Must be deterministic.
    fn migrate(&self, from_version: u64, store: &mut dyn MultiStore) -> Result<(), ModuleError>;
}

/// Name-keyed module registry with deterministic (name-ordered) iteration.
#[derive(Default)]
pub struct ModuleRegistry {
    modules: BTreeMap<String, Box<dyn AppModule>>,
}

impl ModuleRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a module. Fails if the name is already taken.
    pub fn register(&mut self, module: Box<dyn AppModule>) -> Result<(), ModuleError> {
        let name = module.name().to_string();
        if self.modules.contains_key(&name) {
            return Err(ModuleError::DuplicateModule(name));
        }
        self.modules.insert(name, module);
        Ok(())
    }

    /// Look up a module by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&dyn AppModule> {
        self.modules.get(name).map(|m| m.as_ref())
    }

    /// Iterate modules in name order.
    pub fn iter(&self) -> impl Iterator<Item = &dyn AppModule> {
        self.modules.values().map(|m| m.as_ref())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.modules.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }
}

impl fmt::Debug for ModuleRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleRegistry")
            .field("modules", &self.modules.keys().collect::<Vec<_>>())
            .finish()
    }
}
