//! The state machine behind the consensus callbacks.
//!
//! `App` owns the store exclusively during block execution and implements
//! the six-stage [`ConsensusApp`] contract. Business logic of individual
//! modules lives behind the [`dstate_common::AppModule`] seam; this shell
//! is responsible for the consensus-critical ordering around upgrades:
//!
//! 1. store rewrite at the plan height, before anything touches the store,
//! 2. upgrade handler, all-or-nothing, fatal on failure,
//! 3. ordinary block processing.

use std::sync::Arc;

use thiserror::Error;
use tracing::info;

use dstate_common::{Config, ModuleRegistry, MultiStore};
use dstate_consensus::{
    CommitResponse, ConsensusApp, Event, ExtendVoteRequest, ExtendVoteResponse,
    FinalizeBlockRequest, FinalizeBlockResponse, PrepareProposalRequest, PrepareProposalResponse,
    ProcessProposalRequest, ProcessProposalResponse, StageError, VerifyVoteExtensionRequest,
    VerifyVoteExtensionResponse,
};
use dstate_upgrade::{
    StoreLoaderRewrite, UpgradeCoordinator, UpgradeError, UpgradeRegistry, UpgradeState,
    VersionMap, UPGRADE_STORE,
};

/// Fallback plan path when the config leaves it unset.
const DEFAULT_PLAN_PATH: &str = "./data/upgrade-info.json";

/// Boot-fatal construction errors. Per the error taxonomy these stop the
/// process; there is no recovery path past a failed boot.
#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Upgrade(#[from] UpgradeError),

    #[error("store setup failed: {0}")]
    Store(#[from] dstate_common::StoreError),

    #[error("version map unreadable: {0}")]
    Versions(#[from] dstate_upgrade::version_map::VersionMapError),
}

/// The replicated deterministic state machine.
pub struct App {
    store: Box<dyn MultiStore>,
    modules: ModuleRegistry,
    versions: VersionMap,
    coordinator: UpgradeCoordinator,
    pending_rewrite: Option<StoreLoaderRewrite>,
    retain_blocks: i64,
    last_height: i64,
}

impl App {
    /// Boot the state machine. Order matters: the coordinator binds and the
    /// store loader is armed before any other component can touch the
    /// store, and the pending-plan read happens exactly once, here.
    pub fn load(
        config: &Config,
        registry: Arc<UpgradeRegistry>,
        modules: ModuleRegistry,
        mut store: Box<dyn MultiStore>,
    ) -> Result<Self, AppError> {
        if !store.has_store(UPGRADE_STORE) {
            store.add_store(UPGRADE_STORE)?;
        }
        let versions = VersionMap::load(store.as_ref())?;

        let plan_path = config
            .plan_path
            .clone()
            .unwrap_or_else(|| DEFAULT_PLAN_PATH.to_string());
        let mut coordinator = UpgradeCoordinator::bind(
            registry,
            plan_path.into(),
            &config.skip_heights(),
            store.as_ref(),
        )?;
        let pending_rewrite = coordinator.take_store_loader();

        info!(
            modules = modules.len(),
            tracked_versions = versions.len(),
            rewrite_armed = pending_rewrite.is_some(),
            "state machine loaded"
        );

        Ok(Self {
            store,
            modules,
            versions,
            coordinator,
            pending_rewrite,
            retain_blocks: config.retain_blocks.unwrap_or(0),
            last_height: 0,
        })
    }

    #[must_use]
    pub fn store(&self) -> &dyn MultiStore {
        self.store.as_ref()
    }

    #[must_use]
    pub fn versions(&self) -> &VersionMap {
        &self.versions
    }

    #[must_use]
    pub fn upgrade_state(&self) -> UpgradeState {
        self.coordinator.state()
    }

    /// Tear down, handing the store back. Used by restart flows and tests
    /// that boot a second App over surviving state.
    #[must_use]
    pub fn into_store(self) -> Box<dyn MultiStore> {
        self.store
    }
}

impl ConsensusApp for App {
    fn prepare_proposal(
        &mut self,
        request: PrepareProposalRequest,
    ) -> Result<PrepareProposalResponse, StageError> {
        // tx selection policy is a module concern; the shell proposes
        // everything the engine handed it, in order
        Ok(PrepareProposalResponse { txs: request.txs })
    }

    fn process_proposal(
        &mut self,
        _request: ProcessProposalRequest,
    ) -> Result<ProcessProposalResponse, StageError> {
        Ok(ProcessProposalResponse { accept: true })
    }

    fn extend_vote(
        &mut self,
        _request: ExtendVoteRequest,
    ) -> Result<ExtendVoteResponse, StageError> {
        Ok(ExtendVoteResponse {
            vote_extension: Vec::new(),
        })
    }

    fn verify_vote_extension(
        &mut self,
        _request: VerifyVoteExtensionRequest,
    ) -> Result<VerifyVoteExtensionResponse, StageError> {
        Ok(VerifyVoteExtensionResponse { accept: true })
    }

    fn finalize_block(
        &mut self,
        request: FinalizeBlockRequest,
    ) -> Result<FinalizeBlockResponse, StageError> {
        let mut events = Vec::new();

        // one-shot schema rewrite, bound to exactly this height
        let rewrite_due = self
            .pending_rewrite
            .as_ref()
            .map_or(false, |r| r.height() == request.height);
        if rewrite_due {
            if let Some(rewrite) = self.pending_rewrite.take() {
                rewrite
                    .apply(self.store.as_mut())
                    .map_err(|e| StageError::new(format!("store rewrite failed: {e}")))?;
            }
        }

        if self.coordinator.should_execute(request.height) {
            let name = self
                .coordinator
                .pending_plan()
                .map(|p| p.name.clone())
                .unwrap_or_default();
            // migration-fatal on error: the engine sees the failure and
            // halts the node instead of committing half-migrated state
            self.coordinator
                .execute(
                    request.height,
                    &self.modules,
                    self.store.as_mut(),
                    &mut self.versions,
                )
                .map_err(|e| StageError::new(e.to_string()))?;
            events.push(Event {
                kind: "upgrade".to_string(),
                attributes: vec![
                    ("name".to_string(), name),
                    ("height".to_string(), request.height.to_string()),
                ],
            });
        }

        self.last_height = request.height;
        Ok(FinalizeBlockResponse { events })
    }

    fn commit(&mut self) -> Result<CommitResponse, StageError> {
        let retain_height = if self.retain_blocks > 0 {
            (self.last_height - self.retain_blocks).max(0)
        } else {
            0
        };
        Ok(CommitResponse { retain_height })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dstate_common::MemoryMultiStore;

    fn empty_app() -> App {
        App::load(
            &Config {
                plan_path: Some("/nonexistent/upgrade-info.json".to_string()),
                skip_heights: None,
                retain_blocks: Some(10),
                health_env_var: None,
            },
            Arc::new(UpgradeRegistry::new()),
            ModuleRegistry::new(),
            Box::new(MemoryMultiStore::new()),
        )
        .expect("load")
    }

    #[test]
    fn test_load_creates_upgrade_partition() {
        let app = empty_app();
        assert!(app.store().has_store(UPGRADE_STORE));
        assert_eq!(app.upgrade_state(), UpgradeState::NoPlan);
    }

    #[test]
    fn test_prepare_passes_txs_through() {
        let mut app = empty_app();
        let txs = vec![b"a".to_vec(), b"b".to_vec()];
        let response = app
            .prepare_proposal(PrepareProposalRequest {
                height: 1,
                txs: txs.clone(),
                misbehavior: vec![],
            })
            .expect("prepare");
        assert_eq!(response.txs, txs);
    }

    #[test]
    fn test_commit_retains_window() {
        let mut app = empty_app();
        // before any block, nothing to prune
        assert_eq!(app.commit().expect("commit").retain_height, 0);

        app.finalize_block(FinalizeBlockRequest {
            height: 25,
            txs: vec![],
            misbehavior: vec![],
        })
        .expect("finalize");
        assert_eq!(app.commit().expect("commit").retain_height, 15);
    }

    #[test]
    fn test_commit_retain_floors_at_zero() {
        let mut app = empty_app();
        app.finalize_block(FinalizeBlockRequest {
            height: 3,
            txs: vec![],
            misbehavior: vec![],
        })
        .expect("finalize");
        assert_eq!(app.commit().expect("commit").retain_height, 0);
    }
}
