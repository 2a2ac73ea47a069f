//! Upgrade Descriptor Registry
//!
//! An ordered, append-only sequence of named upgrade descriptors. Insertion
//! order is deployment chronological order; it matters only for matching the
//! on-disk plan, never for execution order (at most one plan is active).
//!
//! Names are unique and enforced at registration time. The registry is
//! read-only once the coordinator begins binding handlers; nothing here is
//! protected by a lock because the binding phase is single-threaded by
//! contract.

use std::collections::BTreeSet;
use std::fmt;

use crate::coordinator::MigrationContext;
use crate::UpgradeError;

/// An upgrade's migration logic, bound by name into the app's handler table.
///
/// The handler receives a [`MigrationContext`] whose version map is a
/// scratch copy; the coordinator commits it only if the handler succeeds.
pub type UpgradeHandler =
    Box<dyn Fn(&mut MigrationContext<'_>) -> Result<(), UpgradeError> + Send + Sync>;

/// Declarative store-schema delta applied by an upgrade.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreDelta {
    /// Sub-stores created by the upgrade.
    pub added: BTreeSet<String>,
    /// Sub-stores renamed by the upgrade, `(old, new)` pairs.
    pub renamed: Vec<(String, String)>,
    /// Sub-stores dropped by the upgrade.
    pub deleted: BTreeSet<String>,
}

impl StoreDelta {
    /// Delta that only adds sub-stores.
    #[must_use]
    pub fn adding<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            added: names.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// True if the upgrade touches no store schema at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.renamed.is_empty() && self.deleted.is_empty()
    }
}

/// A named, immutable upgrade: migration handler plus store-schema delta.
pub struct UpgradeDescriptor {
    pub name: String,
    pub handler: UpgradeHandler,
    pub store_delta: StoreDelta,
}

impl UpgradeDescriptor {
    pub fn new(name: impl Into<String>, handler: UpgradeHandler, store_delta: StoreDelta) -> Self {
        Self {
            name: name.into(),
            handler,
            store_delta,
        }
    }
}

// The handler is an opaque closure; keep Debug output useful without it.
impl fmt::Debug for UpgradeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UpgradeDescriptor")
            .field("name", &self.name)
            .field("store_delta", &self.store_delta)
            .finish_non_exhaustive()
    }
}

/// Ordered, append-only registry of upgrade descriptors.
#[derive(Debug, Default)]
pub struct UpgradeRegistry {
    entries: Vec<UpgradeDescriptor>,
}

impl UpgradeRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a descriptor. Duplicate names are rejected rather than
    /// silently overridden: a duplicate only ever comes from a deployment
    /// mistake, and overriding would surface as replica divergence later.
    pub fn register(&mut self, descriptor: UpgradeDescriptor) -> Result<(), UpgradeError> {
        if self.entries.iter().any(|d| d.name == descriptor.name) {
            return Err(UpgradeError::DuplicateName(descriptor.name));
        }
        self.entries.push(descriptor);
        Ok(())
    }

    /// Look up a descriptor by upgrade name.
    #[must_use]
    pub fn lookup(&self, name: &str) -> Option<&UpgradeDescriptor> {
        self.entries.iter().find(|d| d.name == name)
    }

    /// Descriptors in registration (deployment) order.
    pub fn iter(&self) -> impl Iterator<Item = &UpgradeDescriptor> {
        self.entries.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
