//! Upgrade Coordinator
//!
//! Boot-time orchestration and finalize-time execution of upgrades. The
//! coordinator is the decision layer: it reads the pending plan exactly
//! once, binds every registered handler into the app's named-handler table,
//! and installs the one-shot store rewrite when (and only when) the plan
//! matches a descriptor that needs one. Execution is driven later by the
//! state machine when block height reaches the plan height.
//!
//! ## Per-plan state machine
//!
//! ```text
//! NoPlan -> PlanPending(h) -> HandlerRunning -> HandlerSucceeded
//!                                   │
//!                                   └────────-> HandlerFailed (fatal)
//! ```
//!
//! `NoPlan` is both initial and terminal. `HandlerFailed` halts the node:
//! continuing past a failed migration risks undetectable state divergence
//! between replicas.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use tracing::{error, info, warn};

use dstate_common::{ModuleRegistry, MultiStore};

use crate::plan::{clear_plan, read_plan, PendingPlan};
use crate::registry::{UpgradeHandler, UpgradeRegistry};
use crate::store_loader::StoreLoaderRewrite;
use crate::version_map::VersionMap;
use crate::UpgradeError;

/// Everything a migration handler may touch. The version map is a scratch
/// copy; the coordinator commits it only if the handler returns success.
pub struct MigrationContext<'a> {
    pub upgrade_name: &'a str,
    pub modules: &'a ModuleRegistry,
    pub store: &'a mut dyn MultiStore,
    pub versions: &'a mut VersionMap,
}

impl MigrationContext<'_> {
    /// Run the standard migration sweep: every module whose code version
    /// exceeds its version-map entry is migrated, in module-name order,
    /// and its entry is advanced only after its migration succeeds.
    pub fn run_migrations(&mut self) -> Result<(), UpgradeError> {
        for module in self.modules.iter() {
            let code_version = module.consensus_version();
            let state_version = self.versions.get(module.name()).unwrap_or(0);
            if code_version <= state_version {
                continue;
            }
            info!(
                module = module.name(),
                from = state_version,
                to = code_version,
                "running module migration"
            );
            module
                .migrate(state_version, self.store)
                .map_err(|e| UpgradeError::MigrationFailed {
                    name: self.upgrade_name.to_string(),
                    reason: e.to_string(),
                })?;
            self.versions.set(module.name(), code_version)?;
        }
        Ok(())
    }
}

/// The standard handler: just the migration sweep. Most upgrades need
/// nothing else; store surgery beyond the declared delta belongs in a
/// custom handler.
#[must_use]
pub fn default_handler() -> UpgradeHandler {
    Box::new(|ctx| ctx.run_migrations())
}

/// Where the active plan currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpgradeState {
    /// No plan pending. Initial and terminal.
    NoPlan,
    /// A plan is waiting for its height.
    PlanPending(i64),
    /// The bound handler is executing inside finalize.
    HandlerRunning,
    /// Handler committed; version map advanced, plan cleared.
    HandlerSucceeded,
    /// Handler failed. Fatal: the node must halt.
    HandlerFailed,
}

/// Boot-time binder and finalize-time executor for upgrades.
#[derive(Debug)]
pub struct UpgradeCoordinator {
    registry: Arc<UpgradeRegistry>,
    /// Named-handler table: upgrade name -> registry index, bound at boot.
    handlers: HashMap<String, usize>,
    plan_path: PathBuf,
    plan: Option<PendingPlan>,
    state: UpgradeState,
    store_loader: Option<StoreLoaderRewrite>,
}

impl UpgradeCoordinator {
    /// Bind handlers and decide on the store rewrite. Called once at boot,
    /// after the store exists but before anything else touches it.
    ///
    /// The pending-plan read is idempotent and side-effect-free; a disk
    /// failure here is boot-fatal because the coordinator cannot safely
    /// decide whether a store rewrite is due. A plan naming an upgrade this
    /// binary does not know is NOT fatal: the plan is dormant until the
    /// binary updates.
    ///
    /// Registry names are unique by construction, so at most one descriptor
    /// can match the plan; a second match would be a configuration error,
    /// and [`UpgradeRegistry::register`] already makes it unrepresentable.
    pub fn bind(
        registry: Arc<UpgradeRegistry>,
        plan_path: PathBuf,
        skip_heights: &[i64],
        store: &dyn MultiStore,
    ) -> Result<Self, UpgradeError> {
        let mut handlers = HashMap::new();
        for (index, descriptor) in registry.iter().enumerate() {
            handlers.insert(descriptor.name.clone(), index);
        }

        let plan = read_plan(&plan_path)?;
        let state = match &plan {
            Some(p) => UpgradeState::PlanPending(p.height),
            None => UpgradeState::NoPlan,
        };

        let mut store_loader = None;
        if let Some(p) = &plan {
            match registry.lookup(&p.name) {
                Some(descriptor) if !descriptor.store_delta.is_empty() => {
                    if skip_heights.contains(&p.height) {
                        warn!(
                            upgrade = %p.name,
                            height = p.height,
                            "height in skip set, suppressing store rewrite"
                        );
                    } else if StoreLoaderRewrite::already_applied(store, &p.name, p.height) {
                        info!(
                            upgrade = %p.name,
                            height = p.height,
                            "store rewrite already applied, not reinstalling"
                        );
                    } else {
                        info!(
                            upgrade = %p.name,
                            height = p.height,
                            "installing store rewrite"
                        );
                        store_loader = Some(StoreLoaderRewrite::new(
                            p.name.clone(),
                            p.height,
                            descriptor.store_delta.clone(),
                        ));
                    }
                }
                Some(_) => {
                    info!(upgrade = %p.name, height = p.height, "plan pending, no store delta");
                }
                None => {
                    info!(
                        upgrade = %p.name,
                        height = p.height,
                        "plan names an upgrade unknown to this binary, dormant"
                    );
                }
            }
        }

        Ok(Self {
            registry,
            handlers,
            plan_path,
            plan,
            state,
            store_loader,
        })
    }

    /// The rewrite decided on at bind time, if any. The caller runs it
    /// during load, before per-block execution starts; it can be taken
    /// only once.
    pub fn take_store_loader(&mut self) -> Option<StoreLoaderRewrite> {
        self.store_loader.take()
    }

    /// The plan read at boot, until it is consumed.
    #[must_use]
    pub fn pending_plan(&self) -> Option<&PendingPlan> {
        self.plan.as_ref()
    }

    #[must_use]
    pub fn state(&self) -> UpgradeState {
        self.state
    }

    /// True iff finalize at `height` must run the upgrade handler: a plan
    /// is pending for exactly this height and this binary has its handler
    /// bound. A dormant plan (unknown name) never triggers execution.
    #[must_use]
    pub fn should_execute(&self, height: i64) -> bool {
        match (&self.plan, self.state) {
            (Some(p), UpgradeState::PlanPending(_)) => {
                p.height == height && self.handlers.contains_key(&p.name)
            }
            _ => false,
        }
    }

    /// Execute the bound handler for the pending plan. Invoked by the state
    /// machine during finalize when [`Self::should_execute`] holds.
    ///
    /// Migrations are all-or-nothing: the handler works on a scratch copy
    /// of the version map, which is committed and persisted only on
    /// success. Any failure leaves the version map, the store bookkeeping,
    /// and the plan file untouched, and is migration-fatal for the caller.
    pub fn execute(
        &mut self,
        height: i64,
        modules: &ModuleRegistry,
        store: &mut dyn MultiStore,
        versions: &mut VersionMap,
    ) -> Result<(), UpgradeError> {
        let plan = match &self.plan {
            Some(p) if p.height == height => p.clone(),
            _ => {
                return Err(UpgradeError::InvalidPlan(format!(
                    "execute called at height {height} with no matching plan"
                )))
            }
        };
        let index = *self
            .handlers
            .get(&plan.name)
            .ok_or_else(|| UpgradeError::HandlerMissing(plan.name.clone()))?;
        let descriptor = self
            .registry
            .iter()
            .nth(index)
            .ok_or_else(|| UpgradeError::HandlerMissing(plan.name.clone()))?;

        self.state = UpgradeState::HandlerRunning;
        info!(upgrade = %plan.name, height, "executing upgrade handler");

        let mut scratch = versions.clone();
        let mut ctx = MigrationContext {
            upgrade_name: &plan.name,
            modules,
            store,
            versions: &mut scratch,
        };

        match (descriptor.handler)(&mut ctx) {
            Ok(()) => {
                *versions = scratch;
                versions.save(store)?;
                clear_plan(&self.plan_path)?;
                self.plan = None;
                self.state = UpgradeState::HandlerSucceeded;
                info!(upgrade = %plan.name, height, "upgrade handler succeeded");
                Ok(())
            }
            Err(e) => {
                self.state = UpgradeState::HandlerFailed;
                error!(
                    upgrade = %plan.name,
                    height,
                    error = %e,
                    "upgrade handler failed, node must halt"
                );
                Err(UpgradeError::MigrationFailed {
                    name: plan.name,
                    reason: e.to_string(),
                })
            }
        }
    }
}
