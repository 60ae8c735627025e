//! Behaviour decision engine.
//!
//! Given a round, a miner and the current time, decide what (if anything)
//! the miner should produce next. The decision is advisory for the node
//! scheduler; the validation pipeline independently enforces every rule
//! the decision relies on.

use crate::config::ConsensusConfig;
use crate::domain::round::Round;
use crate::domain::term::is_time_to_change_term;
use serde::{Deserialize, Serialize};
use shared_types::{Pubkey, Timestamp};
use std::fmt;

/// What a miner should do next.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConsensusBehaviour {
    /// Publish a bonus block within an owned slot.
    TinyBlock,
    /// Publish this round's commitment and reveal the previous one.
    UpdateValue,
    /// Terminate the round and propose the next one.
    NextRound,
    /// Terminate the term with a freshly elected miner set.
    NextTerm,
    /// Do not mine.
    Nothing,
}

impl fmt::Display for ConsensusBehaviour {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::TinyBlock => "TinyBlock",
            Self::UpdateValue => "UpdateValue",
            Self::NextRound => "NextRound",
            Self::NextTerm => "NextTerm",
            Self::Nothing => "Nothing",
        };
        write!(f, "{name}")
    }
}

/// Decide the behaviour for `pubkey` at `now`.
///
/// `blockchain_start` anchors the term boundary predicate.
pub fn get_behaviour(
    round: &Round,
    pubkey: &Pubkey,
    now: Timestamp,
    blockchain_start: Timestamp,
    config: &ConsensusConfig,
) -> ConsensusBehaviour {
    let Some(miner) = round.miner(pubkey) else {
        return ConsensusBehaviour::Nothing;
    };
    let interval = config.mining_interval_ms;

    // Bootstrap: in the very first round the schedule is not yet anchored
    // to real commitments, so any miner that has not produced may do so.
    if round.round_number == 1 && !miner.has_produced() {
        return ConsensusBehaviour::UpdateValue;
    }

    if !miner.has_produced() {
        if !round.is_time_slot_passed(miner, now, interval) {
            return ConsensusBehaviour::UpdateValue;
        }
    } else {
        // Single-producer fast path: with one active miner there is nobody
        // to wait for, terminate as soon as the commitment is in.
        if round.miners_count() == 1 {
            return termination(round, blockchain_start, config);
        }

        // Bonus slot: the previous round's terminator may keep producing
        // tiny blocks until this round nominally starts.
        if round.extra_block_producer_of_previous_round == *pubkey
            && miner.produced_tiny_blocks < config.maximum_tiny_blocks_per_slot
        {
            if let Some(start) = round.round_start_time(interval) {
                if now < start {
                    return ConsensusBehaviour::TinyBlock;
                }
            }
        }

        // Remaining tiny-block budget within the miner's own slot.
        if let Some(expected) = miner.expected_mining_time {
            let slot_end = expected.add_millis(interval);
            if now >= expected
                && now < slot_end
                && miner.produced_tiny_blocks < config.maximum_tiny_blocks_per_slot
            {
                return ConsensusBehaviour::TinyBlock;
            }
        }
    }

    if round.is_time_slot_passed(miner, now, interval) {
        return termination(round, blockchain_start, config);
    }

    ConsensusBehaviour::Nothing
}

fn termination(
    round: &Round,
    blockchain_start: Timestamp,
    config: &ConsensusConfig,
) -> ConsensusBehaviour {
    if is_time_to_change_term(round, blockchain_start, config.term_period_seconds) {
        ConsensusBehaviour::NextTerm
    } else {
        ConsensusBehaviour::NextRound
    }
}
