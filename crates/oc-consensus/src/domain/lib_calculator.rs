//! Last-irreversible-block calculation.
//!
//! Works on two consecutive rounds' commitment-reveal graph: a miner's
//! implied height counts only if its reveal verifiably chains back to the
//! previous round's commitment. Failure to reach quorum is a normal
//! liveness condition, not an error.

use crate::domain::round::Round;
use crate::domain::term::consent_count;
use serde::{Deserialize, Serialize};
use shared_crypto::keccak256;

/// A newly confirmed irreversibility point.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LibInformation {
    pub height: u64,
    pub round_number: u64,
}

/// Compute the new LIB from `current` and its immediate predecessor.
///
/// Collects the implied irreversible heights of every miner whose
/// `previous_in_value` hashes to its stored commitment in `previous`.
/// The result is the highest height confirmed by a quorum of at least
/// `consent_count` such miners, and only if it advances past the value
/// already stored in `current`. Returns `None` when no quorum is
/// reachable or the quorum height does not advance.
pub fn calculate_lib(current: &Round, previous: &Round) -> Option<LibInformation> {
    let quorum = consent_count(current.miners_count());

    let mut heights: Vec<u64> = current
        .miners
        .values()
        .filter(|miner| miner.implied_irreversible_block_height > 0)
        .filter(|miner| {
            let Some(reveal) = miner.previous_in_value else {
                return false;
            };
            let Some(commitment) = previous.miner(&miner.pubkey).and_then(|p| p.out_value) else {
                return false;
            };
            keccak256(&reveal) == commitment
        })
        .map(|miner| miner.implied_irreversible_block_height)
        .collect();

    if heights.len() < quorum {
        return None;
    }
    heights.sort_unstable();
    // Largest height at least `quorum` miners stand behind.
    let height = heights[heights.len() - quorum];
    if height <= current.confirmed_irreversible_block_height {
        return None;
    }
    Some(LibInformation {
        height,
        round_number: previous.round_number,
    })
}
