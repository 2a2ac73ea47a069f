//! Request/response types for the consensus-engine callback protocol.
//!
//! These mirror the engine's wire structs one-to-one; the engine drives the
//! six stages strictly sequentially per height, heights strictly increasing.
//! The types carry only what this state machine observes. Everything is
//! plain owned data so the instrumentation layer can never alias or mutate
//! a request behind the engine's back.

use thiserror::Error;

/// Error returned by a lifecycle stage. The instrumentation wrapper passes
/// it through unchanged; interpretation is the engine's responsibility.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{0}")]
pub struct StageError(pub String);

impl StageError {
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Raw validator-misconduct evidence surfaced by the engine.
///
/// `kind` is the engine's numeric type tag; classification into the closed
/// kind set happens in [`crate::misbehavior`]. Ephemeral: consumed into
/// metric labels and dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MisbehaviorRecord {
    pub validator_address: Vec<u8>,
    pub power: i64,
    pub kind: i32,
}

/// A structured event emitted by block processing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    pub kind: String,
    pub attributes: Vec<(String, String)>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrepareProposalRequest {
    pub height: i64,
    pub txs: Vec<Vec<u8>>,
    pub misbehavior: Vec<MisbehaviorRecord>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrepareProposalResponse {
    /// Transactions selected into the proposal, in order.
    pub txs: Vec<Vec<u8>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessProposalRequest {
    pub height: i64,
    pub txs: Vec<Vec<u8>>,
    pub misbehavior: Vec<MisbehaviorRecord>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessProposalResponse {
    pub accept: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtendVoteRequest {
    pub height: i64,
    pub block_hash: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtendVoteResponse {
    pub vote_extension: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifyVoteExtensionRequest {
    pub height: i64,
    pub validator_address: Vec<u8>,
    pub vote_extension: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifyVoteExtensionResponse {
    pub accept: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinalizeBlockRequest {
    pub height: i64,
    pub txs: Vec<Vec<u8>>,
    pub misbehavior: Vec<MisbehaviorRecord>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FinalizeBlockResponse {
    pub events: Vec<Event>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitResponse {
    /// Lowest height the engine should retain; 0 means retain everything.
    pub retain_height: i64,
}
