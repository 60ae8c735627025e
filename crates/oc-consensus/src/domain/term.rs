//! Term boundary bookkeeping.
//!
//! A term is a span of consecutive rounds sharing one elected miner set.
//! The boundary predicate is vote-like: the term changes once a
//! supermajority of miners has demonstrably mined past the boundary,
//! so a single miner with a skewed clock cannot force an early election.

use crate::domain::round::Round;
use shared_types::Timestamp;

/// Supermajority count for N miners: floor(2N/3) + 1.
pub fn consent_count(miners_count: usize) -> usize {
    miners_count * 2 / 3 + 1
}

/// Zero-based term index the timestamp `t` falls into.
pub fn term_index(blockchain_start: Timestamp, t: Timestamp, period_seconds: i64) -> u64 {
    if period_seconds <= 0 || t <= blockchain_start {
        return 0;
    }
    (t.millis_since(blockchain_start) / 1000 / period_seconds) as u64
}

/// Whether the election boundary has been reached for `round`.
///
/// True once at least a supermajority of miners' latest actual mining
/// times fall into a term index at or beyond the current term number
/// (term N occupies indices 0..N).
pub fn is_time_to_change_term(
    round: &Round,
    blockchain_start: Timestamp,
    period_seconds: i64,
) -> bool {
    let approvals = round
        .miners
        .values()
        .filter_map(|m| m.latest_actual_mining_time())
        .filter(|t| term_index(blockchain_start, *t, period_seconds) >= round.term_number)
        .count();
    approvals >= consent_count(round.miners_count())
}
