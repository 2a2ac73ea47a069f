//! # dstate Consensus Crate
//!
//! The consensus-engine boundary: the six-stage callback protocol the
//! external engine drives the state machine through, plus the
//! instrumentation wrapper that observes every stage without changing it.
//!
//! ## Modules
//! - `types`: request/response pairs for the six stages
//! - `lifecycle`: `ConsensusApp` trait and the `InstrumentedApp` wrapper
//! - `misbehavior`: evidence classification into a closed kind set
//! - `metrics`: lock-free lifecycle metrics with Prometheus export
//!
//! ## Instrumentation contract
//!
//! The wrapper must be invisible to the engine: inputs, outputs, and errors
//! of the wrapped call pass through bit-for-bit. Timing, logs, and metrics
//! are side observations and fire exactly once per call on every exit path,
//! including unwinds.

pub mod lifecycle;
pub mod metrics;
pub mod misbehavior;
pub mod types;

pub use lifecycle::{ConsensusApp, InstrumentedApp};
pub use metrics::{LifecycleMetrics, Stage};
pub use misbehavior::{classify, labels_for, MisbehaviorKind, MisbehaviorLabels};
pub use types::{
    CommitResponse, Event, ExtendVoteRequest, ExtendVoteResponse, FinalizeBlockRequest,
    FinalizeBlockResponse, MisbehaviorRecord, PrepareProposalRequest, PrepareProposalResponse,
    ProcessProposalRequest, ProcessProposalResponse, StageError, VerifyVoteExtensionRequest,
    VerifyVoteExtensionResponse,
};
