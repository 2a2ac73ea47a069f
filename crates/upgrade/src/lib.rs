//! # dstate Upgrade Crate
//!
//! Versioned upgrade orchestration for the replicated state machine.
//!
//! This crate is the ONLY authorized path for changing the state machine's
//! schema version while the chain is live. It pairs a registry of named
//! upgrade descriptors with an on-disk pending plan approved by governance,
//! and applies store-schema rewrites exactly once at the agreed height.
//!
//! ## Guarantees
//!
//! - **Deterministic**: migrations run in module-name order on every replica
//! - **Monotonic**: per-module consensus versions never decrease
//! - **All-or-nothing**: one upgrade event commits every migration or none
//! - **At-most-once**: a store rewrite bound to height H never double-applies,
//!   even across a crash-replay of H
//!
//! ## Boot flow
//!
//! ```text
//! read plan ──> match registry ──> bind handlers
//!                  │
//!                  └─> name match + delta + not skipped + no marker
//!                          │
//!                          └─> install StoreLoaderRewrite(H)
//! ```

pub mod coordinator;
pub mod plan;
pub mod registry;
pub mod store_loader;
pub mod version_map;

pub use coordinator::{default_handler, MigrationContext, UpgradeCoordinator, UpgradeState};
pub use plan::{clear_plan, read_plan, write_plan, PendingPlan};
pub use registry::{StoreDelta, UpgradeDescriptor, UpgradeHandler, UpgradeRegistry};
pub use store_loader::StoreLoaderRewrite;
pub use version_map::VersionMap;

use thiserror::Error;

/// Sub-store reserved for upgrade bookkeeping (version map, applied markers).
pub const UPGRADE_STORE: &str = "upgrade";

/// Errors surfaced by the upgrade subsystem.
///
/// Boot-fatal and migration-fatal cases both land here; the caller decides
/// whether the process may continue (it may not, in either case).
#[derive(Debug, Error)]
pub enum UpgradeError {
    /// Two descriptors were registered under the same name.
    #[error("duplicate upgrade name: {0}")]
    DuplicateName(String),

    /// The pending-plan file exists but could not be read or parsed.
    #[error("pending plan at {path} is unreadable: {reason}")]
    PlanUnreadable { path: String, reason: String },

    /// The pending-plan record failed validation.
    #[error("invalid pending plan: {0}")]
    InvalidPlan(String),

    /// A migration failed during handler execution. Migration-fatal:
    /// the block cannot be finalized with half-migrated state.
    #[error("upgrade {name} failed: {reason}")]
    MigrationFailed { name: String, reason: String },

    /// The handler ran at a height with no bound handler for the plan name.
    #[error("no bound handler for upgrade {0}")]
    HandlerMissing(String),

    /// Underlying store operation failed.
    #[error(transparent)]
    Store(#[from] dstate_common::StoreError),

    /// Version-map bookkeeping violation.
    #[error(transparent)]
    Version(#[from] version_map::VersionMapError),
}
