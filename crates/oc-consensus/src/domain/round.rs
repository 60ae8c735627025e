//! Round entity: the unit of consensus scheduling.

use crate::domain::error::{ConsensusError, ConsensusResult};
use crate::domain::miner::MinerInRound;
use serde::{Deserialize, Serialize};
use shared_crypto::{keccak256, keccak256_many};
use shared_types::{Hash, Pubkey, Timestamp};
use std::collections::BTreeMap;

/// One complete cycle through all active miners' time slots plus one
/// extra-block slot.
///
/// A round is created by the round generation algorithm, mutated only by
/// the currently processing miner's own transaction effects, and becomes
/// immutable history once superseded.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Round {
    /// Strictly increasing across the chain's lifetime.
    pub round_number: u64,
    /// Increments only on a term transition.
    pub term_number: u64,
    /// One entry per active miner; keys are unique by construction.
    pub miners: BTreeMap<Pubkey, MinerInRound>,
    /// The miner that terminated the prior round.
    pub extra_block_producer_of_previous_round: Pubkey,
    /// This round's view of the last irreversible block height.
    /// Non-decreasing across consecutive committed rounds.
    pub confirmed_irreversible_block_height: u64,
    /// Round number the irreversible height was confirmed in.
    pub confirmed_irreversible_block_round_number: u64,
    /// True only for the first round of a term or after a mid-term
    /// replacement.
    pub is_miner_list_just_changed: bool,
}

impl Round {
    /// Number of active miners this round.
    pub fn miners_count(&self) -> usize {
        self.miners.len()
    }

    /// Number of miners that produced their primary block.
    pub fn produced_count(&self) -> usize {
        self.miners.values().filter(|m| m.has_produced()).count()
    }

    /// Look up a miner record.
    pub fn miner(&self, pubkey: &Pubkey) -> Option<&MinerInRound> {
        self.miners.get(pubkey)
    }

    /// Look up the miner holding `order`.
    pub fn miner_at_order(&self, order: u32) -> Option<&MinerInRound> {
        self.miners.values().find(|m| m.order == order)
    }

    /// The miner flagged to terminate this round.
    pub fn extra_block_producer(&self) -> Option<&MinerInRound> {
        self.miners.values().find(|m| m.is_extra_block_producer)
    }

    /// Cheap equality fingerprint: the sum of all expected mining times
    /// in whole seconds.
    ///
    /// Refuses to compute while any schedule entry is unset; a partial
    /// sum would be forgeable by omission.
    pub fn round_id(&self) -> ConsensusResult<u64> {
        let mut sum: u64 = 0;
        for miner in self.miners.values() {
            let expected = miner
                .expected_mining_time
                .ok_or(ConsensusError::IncompleteSchedule {
                    round_number: self.round_number,
                })?;
            sum = sum.wrapping_add(expected.seconds() as u64);
        }
        Ok(sum)
    }

    /// Duration of a full round in milliseconds: one slot per miner plus
    /// the extra-block slot.
    pub fn total_millis(&self, mining_interval_ms: i64) -> i64 {
        (self.miners.len() as i64 + 1) * mining_interval_ms
    }

    /// Nominal start of this round: one interval before the first slot.
    pub fn round_start_time(&self, mining_interval_ms: i64) -> Option<Timestamp> {
        let first = self.miners.values().min_by_key(|m| m.order)?;
        first
            .expected_mining_time
            .map(|t| t.add_millis(-(first.order as i64) * mining_interval_ms))
    }

    /// Start of the extra-block slot, after every regular miner's slot.
    pub fn extra_block_mining_time(&self, mining_interval_ms: i64) -> Option<Timestamp> {
        self.round_start_time(mining_interval_ms)
            .map(|start| start.add_millis(self.total_millis(mining_interval_ms)))
    }

    /// Whether `miner`'s time slot has fully elapsed at `now`.
    ///
    /// An unset slot never counts as elapsed.
    pub fn is_time_slot_passed(
        &self,
        miner: &MinerInRound,
        now: Timestamp,
        mining_interval_ms: i64,
    ) -> bool {
        match miner.expected_mining_time {
            Some(expected) => now >= expected.add_millis(mining_interval_ms),
            None => false,
        }
    }

    /// Concatenated signatures of this round in schedule order; the
    /// material the next round's randomness and ordering derive from.
    pub fn signature_material(&self) -> Vec<u8> {
        let mut by_order: Vec<&MinerInRound> = self
            .miners
            .values()
            .filter(|m| m.signature.is_some())
            .collect();
        by_order.sort_by_key(|m| m.order);
        let mut material = Vec::with_capacity(by_order.len() * 32);
        for miner in by_order {
            if let Some(signature) = miner.signature {
                material.extend_from_slice(&signature);
            }
        }
        if material.is_empty() {
            // Pre-commitment rounds fall back to the round number.
            material.extend_from_slice(&self.round_number.to_be_bytes());
        }
        material
    }

    /// Signature a miner publishes alongside a new in-value: binds the
    /// preimage to everything signed in this round so far.
    pub fn calculate_signature(&self, in_value: &Hash) -> Hash {
        keccak256_many(&[in_value, &self.signature_material()])
    }

    /// Canonical, order-independent digest of the round excluding
    /// volatile fields (actual mining times, produced-block counters).
    ///
    /// Compared before and after execution to catch unvalidated mutation.
    pub fn canonical_hash(&self) -> Hash {
        let mut stripped = self.clone();
        for miner in stripped.miners.values_mut() {
            miner.actual_mining_times.clear();
            miner.produced_blocks = 0;
            miner.produced_tiny_blocks = 0;
        }
        // BTreeMap keys give a deterministic encoding.
        let encoded = bincode::serialize(&stripped).unwrap_or_default();
        keccak256(&encoded)
    }
}

/// Map a signature digest onto a mining order in 1..=miners_count.
pub fn order_from_signature(signature: &Hash, miners_count: usize) -> u32 {
    if miners_count == 0 {
        return 1;
    }
    let mut prefix = [0u8; 8];
    prefix.copy_from_slice(&signature[..8]);
    (u64::from_be_bytes(prefix) % miners_count as u64) as u32 + 1
}
