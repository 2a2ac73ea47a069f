//! Consensus Lifecycle Metrics
//!
//! Thread-safe metrics for the six lifecycle stages.
//!
//! ## Metrics Tracked
//!
//! | Metric | Description |
//! |--------|-------------|
//! | stage duration sum + call count | per stage, milliseconds |
//! | misbehavior counters | per label set (type, validator, power) |
//! | finalize block height | gauge, last finalized height |
//!
//! ## Thread Safety
//!
//! Stage counters and the height gauge are plain atomics with `Relaxed`
//! increments and `SeqCst` snapshot reads. The labeled misbehavior counters
//! need a map, so they sit behind a `parking_lot::RwLock`; emission never
//! fails and never blocks block execution for longer than a map insert.
//!
//! Recording methods are infallible by construction: instrumentation must
//! not introduce failures into the consensus path.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

use parking_lot::RwLock;

use crate::misbehavior::MisbehaviorLabels;

/// The six consensus lifecycle stages, in engine call order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    PrepareProposal,
    ProcessProposal,
    ExtendVote,
    VerifyVoteExtension,
    FinalizeBlock,
    Commit,
}

impl Stage {
    pub const ALL: [Stage; 6] = [
        Stage::PrepareProposal,
        Stage::ProcessProposal,
        Stage::ExtendVote,
        Stage::VerifyVoteExtension,
        Stage::FinalizeBlock,
        Stage::Commit,
    ];

    /// Stable short name used in metric labels and log fields.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Stage::PrepareProposal => "prepare",
            Stage::ProcessProposal => "process",
            Stage::ExtendVote => "extend",
            Stage::VerifyVoteExtension => "verify",
            Stage::FinalizeBlock => "finalize",
            Stage::Commit => "commit",
        }
    }

    fn index(self) -> usize {
        match self {
            Stage::PrepareProposal => 0,
            Stage::ProcessProposal => 1,
            Stage::ExtendVote => 2,
            Stage::VerifyVoteExtension => 3,
            Stage::FinalizeBlock => 4,
            Stage::Commit => 5,
        }
    }
}

#[derive(Debug, Default)]
struct StageCounter {
    duration_ms_total: AtomicU64,
    calls: AtomicU64,
}

/// Metrics surface for the instrumented consensus lifecycle.
#[derive(Debug, Default)]
pub struct LifecycleMetrics {
    stages: [StageCounter; 6],
    finalize_block_height: AtomicI64,
    misbehavior: RwLock<HashMap<MisbehaviorLabels, u64>>,
}

impl LifecycleMetrics {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one completed stage call and its wall duration.
    pub fn record_stage(&self, stage: Stage, duration_ms: u64) {
        let counter = &self.stages[stage.index()];
        counter.duration_ms_total.fetch_add(duration_ms, Ordering::Relaxed);
        counter.calls.fetch_add(1, Ordering::Relaxed);
    }

    /// Set the finalize block-height gauge.
    pub fn set_block_height(&self, height: i64) {
        self.finalize_block_height.store(height, Ordering::Relaxed);
    }

    /// Increment the misbehavior counter for one label set.
    pub fn record_misbehavior(&self, labels: MisbehaviorLabels) {
        let mut map = self.misbehavior.write();
        *map.entry(labels).or_insert(0) += 1;
    }

    /// Calls recorded for a stage.
    #[must_use]
    pub fn stage_calls(&self, stage: Stage) -> u64 {
        self.stages[stage.index()].calls.load(Ordering::SeqCst)
    }

    /// Total milliseconds recorded for a stage.
    #[must_use]
    pub fn stage_duration_ms(&self, stage: Stage) -> u64 {
        self.stages[stage.index()]
            .duration_ms_total
            .load(Ordering::SeqCst)
    }

    /// Last finalized height the gauge saw.
    #[must_use]
    pub fn block_height(&self) -> i64 {
        self.finalize_block_height.load(Ordering::SeqCst)
    }

    /// Counter value for one misbehavior label set.
    #[must_use]
    pub fn misbehavior_count(&self, labels: &MisbehaviorLabels) -> u64 {
        self.misbehavior.read().get(labels).copied().unwrap_or(0)
    }

    /// Sum of all misbehavior counters.
    #[must_use]
    pub fn misbehavior_total(&self) -> u64 {
        self.misbehavior.read().values().sum()
    }

    /// Export in Prometheus text exposition format.
    ///
    /// Deterministic: label sets are sorted before rendering so the same
    /// state always produces the same output.
    #[must_use]
    pub fn to_prometheus(&self) -> String {
        let mut out = String::new();

        out.push_str(
            "# HELP dstate_stage_duration_ms_total Wall milliseconds spent per lifecycle stage\n\
             # TYPE dstate_stage_duration_ms_total counter\n",
        );
        for stage in Stage::ALL {
            out.push_str(&format!(
                "dstate_stage_duration_ms_total{{stage=\"{}\"}} {}\n",
                stage.name(),
                self.stage_duration_ms(stage)
            ));
        }

        out.push_str(
            "# HELP dstate_stage_calls_total Lifecycle stage invocations\n\
             # TYPE dstate_stage_calls_total counter\n",
        );
        for stage in Stage::ALL {
            out.push_str(&format!(
                "dstate_stage_calls_total{{stage=\"{}\"}} {}\n",
                stage.name(),
                self.stage_calls(stage)
            ));
        }

        out.push_str(
            "# HELP dstate_finalize_block_height Last finalized block height\n\
             # TYPE dstate_finalize_block_height gauge\n",
        );
        out.push_str(&format!(
            "dstate_finalize_block_height {}\n",
            self.block_height()
        ));

        out.push_str(
            "# HELP dstate_misbehavior_total Misbehavior evidence records observed\n\
             # TYPE dstate_misbehavior_total counter\n",
        );
        let map = self.misbehavior.read();
        let mut entries: Vec<(&MisbehaviorLabels, &u64)> = map.iter().collect();
        entries.sort_by(|a, b| {
            (a.0.kind, &a.0.validator_hex, &a.0.validator_power)
                .cmp(&(b.0.kind, &b.0.validator_hex, &b.0.validator_power))
        });
        for (labels, count) in entries {
            out.push_str(&format!(
                "dstate_misbehavior_total{{type=\"{}\",validator=\"{}\",validator_hex=\"{}\",validator_power=\"{}\"}} {}\n",
                labels.kind, labels.validator, labels.validator_hex, labels.validator_power, count
            ));
        }

        out
    }
}
