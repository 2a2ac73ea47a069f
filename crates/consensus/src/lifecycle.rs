//! Instrumented Consensus Lifecycle
//!
//! `ConsensusApp` is the six-stage callback contract the engine drives;
//! `InstrumentedApp` wraps any implementation with timing, begin/end logs,
//! and metric emission.
//!
//! ## Transparency invariant
//!
//! The wrapper returns the inner call's result and error completely
//! unmodified. Any behavioral change introduced here would itself be a
//! consensus divergence bug, so observations are strictly one-way:
//!
//! - begin log before delegating
//! - end log + duration metric exactly once per call, on every exit path
//!   (normal return, error return, unwind), via a `Drop` scope guard
//! - misbehavior counters and the height gauge never touch control flow

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info};

use crate::metrics::{LifecycleMetrics, Stage};
use crate::misbehavior::labels_for;
use crate::types::{
    CommitResponse, ExtendVoteRequest, ExtendVoteResponse, FinalizeBlockRequest,
    FinalizeBlockResponse, MisbehaviorRecord, PrepareProposalRequest, PrepareProposalResponse,
    ProcessProposalRequest, ProcessProposalResponse, StageError, VerifyVoteExtensionRequest,
    VerifyVoteExtensionResponse,
};

/// The six consensus-engine callbacks, driven strictly sequentially per
/// height. Implementations own the store for the duration of each call.
pub trait ConsensusApp: Send {
    fn prepare_proposal(
        &mut self,
        request: PrepareProposalRequest,
    ) -> Result<PrepareProposalResponse, StageError>;

    fn process_proposal(
        &mut self,
        request: ProcessProposalRequest,
    ) -> Result<ProcessProposalResponse, StageError>;

    fn extend_vote(&mut self, request: ExtendVoteRequest)
        -> Result<ExtendVoteResponse, StageError>;

    fn verify_vote_extension(
        &mut self,
        request: VerifyVoteExtensionRequest,
    ) -> Result<VerifyVoteExtensionResponse, StageError>;

    fn finalize_block(
        &mut self,
        request: FinalizeBlockRequest,
    ) -> Result<FinalizeBlockResponse, StageError>;

    fn commit(&mut self) -> Result<CommitResponse, StageError>;
}

/// Scope guard carrying the stage's start instant. Its `Drop` fires the
/// end observation, so the observation survives early returns and unwinds
/// inside the wrapped call.
struct StageObservation {
    stage: Stage,
    start: Instant,
    metrics: Arc<LifecycleMetrics>,
}

impl StageObservation {
    fn begin(stage: Stage, metrics: Arc<LifecycleMetrics>) -> Self {
        info!(stage = stage.name(), "stage begin");
        Self {
            stage,
            start: Instant::now(),
            metrics,
        }
    }
}

impl Drop for StageObservation {
    fn drop(&mut self) {
        let elapsed_ms = self.start.elapsed().as_millis() as u64;
        self.metrics.record_stage(self.stage, elapsed_ms);
        info!(stage = self.stage.name(), elapsed_ms, "stage end");
    }
}

/// Wraps a [`ConsensusApp`] with per-stage instrumentation.
pub struct InstrumentedApp<A: ConsensusApp> {
    inner: A,
    metrics: Arc<LifecycleMetrics>,
}

impl<A: ConsensusApp> InstrumentedApp<A> {
    pub fn new(inner: A, metrics: Arc<LifecycleMetrics>) -> Self {
        Self { inner, metrics }
    }

    /// The wrapped application.
    pub fn inner(&self) -> &A {
        &self.inner
    }

    /// Side observation shared by the stages that carry evidence.
    /// One counter increment per record; unrecognized kinds land under
    /// the "unknown" label instead of failing the call.
    fn observe_misbehavior(&self, records: &[MisbehaviorRecord]) {
        for record in records {
            let labels = labels_for(record);
            debug!(
                kind = labels.kind,
                validator = %labels.validator_hex,
                power = %labels.validator_power,
                "misbehavior evidence observed"
            );
            self.metrics.record_misbehavior(labels);
        }
    }
}

impl<A: ConsensusApp> ConsensusApp for InstrumentedApp<A> {
    fn prepare_proposal(
        &mut self,
        request: PrepareProposalRequest,
    ) -> Result<PrepareProposalResponse, StageError> {
        let _observation =
            StageObservation::begin(Stage::PrepareProposal, Arc::clone(&self.metrics));
        self.observe_misbehavior(&request.misbehavior);
        self.inner.prepare_proposal(request)
    }

    fn process_proposal(
        &mut self,
        request: ProcessProposalRequest,
    ) -> Result<ProcessProposalResponse, StageError> {
        let _observation =
            StageObservation::begin(Stage::ProcessProposal, Arc::clone(&self.metrics));
        self.observe_misbehavior(&request.misbehavior);
        self.inner.process_proposal(request)
    }

    fn extend_vote(
        &mut self,
        request: ExtendVoteRequest,
    ) -> Result<ExtendVoteResponse, StageError> {
        let _observation = StageObservation::begin(Stage::ExtendVote, Arc::clone(&self.metrics));
        self.inner.extend_vote(request)
    }

    fn verify_vote_extension(
        &mut self,
        request: VerifyVoteExtensionRequest,
    ) -> Result<VerifyVoteExtensionResponse, StageError> {
        let _observation =
            StageObservation::begin(Stage::VerifyVoteExtension, Arc::clone(&self.metrics));
        self.inner.verify_vote_extension(request)
    }

    fn finalize_block(
        &mut self,
        request: FinalizeBlockRequest,
    ) -> Result<FinalizeBlockResponse, StageError> {
        let _observation = StageObservation::begin(Stage::FinalizeBlock, Arc::clone(&self.metrics));
        self.observe_misbehavior(&request.misbehavior);
        self.metrics.set_block_height(request.height);
        self.inner.finalize_block(request)
    }

    fn commit(&mut self) -> Result<CommitResponse, StageError> {
        let _observation = StageObservation::begin(Stage::Commit, Arc::clone(&self.metrics));
        self.inner.commit()
    }
}
