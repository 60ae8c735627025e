//! Per-round miner record.

use serde::{Deserialize, Serialize};
use serde_with::{serde_as, Bytes};
use shared_types::{Hash, Pubkey, Timestamp};

/// One miner's state within a round.
///
/// The commitment/reveal pair (`out_value`, `in_value`,
/// `previous_in_value`) feeds the verifiable-randomness chain:
/// `out_value = keccak256(in_value)` is published while mining, the
/// preimage is revealed one round later as `previous_in_value`.
/// `in_value` is populated only when the round payload is supplied,
/// never written by another miner's transaction.
#[serde_as]
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MinerInRound {
    pub pubkey: Pubkey,
    /// Position in the mining schedule, 1..=N, unique within a round.
    pub order: u32,
    /// Assigned time slot. Unset only while a round is under construction;
    /// every committed round has a complete schedule.
    pub expected_mining_time: Option<Timestamp>,
    /// Commitment published in this round.
    #[serde_as(as = "Option<Bytes>")]
    pub out_value: Option<Hash>,
    /// Signature over the in-value and previous round's signatures.
    #[serde_as(as = "Option<Bytes>")]
    pub signature: Option<Hash>,
    /// Commitment preimage, populated at round-supply time.
    #[serde_as(as = "Option<Bytes>")]
    pub in_value: Option<Hash>,
    /// Reveal of the previous round's in-value.
    #[serde_as(as = "Option<Bytes>")]
    pub previous_in_value: Option<Hash>,
    /// Next-round order derived from `signature`.
    pub supposed_order_of_next_round: u32,
    /// Next-round order after conflict resolution; unique across all
    /// miners that produced a block this round.
    pub final_order_of_next_round: u32,
    /// Blocks produced across the miner's lifetime in this term.
    pub produced_blocks: u64,
    /// Tiny blocks produced in the current slot.
    pub produced_tiny_blocks: u32,
    /// Slots missed across the miner's lifetime in this term.
    pub missed_time_slots: u64,
    /// Observed mining times; volatile, excluded from the canonical hash.
    pub actual_mining_times: Vec<Timestamp>,
    /// Highest block height this miner considers irreversible.
    pub implied_irreversible_block_height: u64,
    /// Whether this miner terminates the round.
    pub is_extra_block_producer: bool,
}

impl MinerInRound {
    /// Fresh record for a newly generated round.
    pub fn new(pubkey: Pubkey, order: u32, expected_mining_time: Timestamp) -> Self {
        Self {
            pubkey,
            order,
            expected_mining_time: Some(expected_mining_time),
            ..Default::default()
        }
    }

    /// Whether the miner has produced its primary block this round.
    pub fn has_produced(&self) -> bool {
        self.out_value.is_some()
    }

    /// Most recent observed mining time, if any.
    pub fn latest_actual_mining_time(&self) -> Option<Timestamp> {
        self.actual_mining_times.last().copied()
    }

    /// Record a produced block at `time`.
    pub fn record_block(&mut self, time: Timestamp) {
        self.produced_blocks = self.produced_blocks.saturating_add(1);
        self.actual_mining_times.push(time);
    }
}
