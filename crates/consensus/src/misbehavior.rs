//! Misbehavior Evidence Classification
//!
//! Maps the engine's raw evidence type tag into a closed kind set for
//! metrics labeling. Pure decision logic: no side effects, no IO, never
//! fails. An unrecognized tag is data, not an error — it classifies as
//! [`MisbehaviorKind::Unknown`] so a newer engine can never break an older
//! state machine mid-block.

use crate::types::MisbehaviorRecord;

/// Engine type tag for duplicate-vote evidence.
const TAG_DUPLICATE_VOTE: i32 = 1;
/// Engine type tag for light-client-attack evidence.
const TAG_LIGHT_CLIENT_ATTACK: i32 = 2;

/// Closed set of evidence categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MisbehaviorKind {
    /// Tag outside the recognized set. Default arm, never an error.
    Unknown,
    /// A validator signed two different votes for the same height/round.
    DuplicateVote,
    /// A validator helped forge a light-client view of the chain.
    LightClientAttack,
}

impl MisbehaviorKind {
    /// Stable label value for metrics.
    #[must_use]
    pub fn as_label(self) -> &'static str {
        match self {
            MisbehaviorKind::Unknown => "unknown",
            MisbehaviorKind::DuplicateVote => "duplicate_vote",
            MisbehaviorKind::LightClientAttack => "light_client_attack",
        }
    }
}

/// Classify a raw engine type tag.
#[must_use]
pub fn classify(kind_tag: i32) -> MisbehaviorKind {
    match kind_tag {
        TAG_DUPLICATE_VOTE => MisbehaviorKind::DuplicateVote,
        TAG_LIGHT_CLIENT_ATTACK => MisbehaviorKind::LightClientAttack,
        _ => MisbehaviorKind::Unknown,
    }
}

/// Metric label set derived from one evidence record.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MisbehaviorLabels {
    /// Validator address in its display form (uppercase hex).
    pub validator: String,
    /// Validator address as lowercase hex.
    pub validator_hex: String,
    /// Voting power as a decimal string.
    pub validator_power: String,
    /// Classified kind label.
    pub kind: &'static str,
}

/// Derive the full label set for one record. The caller emits.
#[must_use]
pub fn labels_for(record: &MisbehaviorRecord) -> MisbehaviorLabels {
    MisbehaviorLabels {
        validator: hex::encode_upper(&record.validator_address),
        validator_hex: hex::encode(&record.validator_address),
        validator_power: record.power.to_string(),
        kind: classify(record.kind).as_label(),
    }
}
