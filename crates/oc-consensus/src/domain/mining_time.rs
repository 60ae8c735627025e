//! Mining-time arranging service.
//!
//! Three pure functions computing the instant a miner's timer should
//! fire. All of them re-anchor to round boundaries using the
//! count-of-miners slot offset (the extra slot comes after every regular
//! miner's slot); using a miner's own order here would collide with a
//! regular slot of the following round.

use crate::domain::round::Round;
use shared_types::{Pubkey, Timestamp};

/// Arranged time for a regular in-slot block: a miner queries slightly
/// early and waits for its slot.
pub fn arrange_normal_time(
    round: &Round,
    pubkey: &Pubkey,
    now: Timestamp,
    _mining_interval_ms: i64,
) -> Timestamp {
    match round.miner(pubkey).and_then(|m| m.expected_mining_time) {
        Some(expected) => expected.max(now),
        None => now,
    }
}

/// Arranged time for terminating the current round.
///
/// Inside the current round this is the extra-block slot; once that has
/// passed, re-anchor to the extra slot of the next whole-round boundary.
pub fn arrange_extra_block_time(round: &Round, now: Timestamp, mining_interval_ms: i64) -> Timestamp {
    match round.extra_block_mining_time(mining_interval_ms) {
        Some(extra) if now < extra => extra,
        Some(_) => arrange_abnormal_time(round, now, mining_interval_ms),
        None => now,
    }
}

/// Recovery path for a slot missed by one or more whole rounds: the
/// extra slot of the first round boundary after `now`.
pub fn arrange_abnormal_time(round: &Round, now: Timestamp, mining_interval_ms: i64) -> Timestamp {
    let Some(start) = round.round_start_time(mining_interval_ms) else {
        return now;
    };
    let total = round.total_millis(mining_interval_ms);
    let elapsed = now.millis_since(start).max(0);
    let missed_rounds = elapsed / total;
    let future_start = start.add_millis((missed_rounds + 1) * total);
    future_start.add_millis(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::miner::MinerInRound;

    fn key(tag: u8) -> Pubkey {
        Pubkey::parse(&format!("{tag:02x}")).unwrap()
    }

    /// Start 0ms, interval 4000ms, 3 miners: slots 4s/8s/12s, extra 16s.
    fn round() -> Round {
        let mut round = Round {
            round_number: 2,
            ..Default::default()
        };
        for order in 1..=3u32 {
            let pubkey = key(order as u8);
            round.miners.insert(
                pubkey.clone(),
                MinerInRound::new(pubkey, order, Timestamp::from_millis(order as i64 * 4000)),
            );
        }
        round
    }

    #[test]
    fn test_normal_time_waits_for_slot() {
        let r = round();
        let arranged = arrange_normal_time(&r, &key(2), Timestamp::from_millis(5_000), 4000);
        assert_eq!(arranged, Timestamp::from_millis(8_000));
    }

    #[test]
    fn test_normal_time_late_query_mines_now() {
        let r = round();
        let arranged = arrange_normal_time(&r, &key(2), Timestamp::from_millis(9_000), 4000);
        assert_eq!(arranged, Timestamp::from_millis(9_000));
    }

    #[test]
    fn test_extra_time_within_current_round() {
        let r = round();
        let arranged = arrange_extra_block_time(&r, Timestamp::from_millis(10_000), 4000);
        assert_eq!(arranged, Timestamp::from_millis(16_000));
    }

    #[test]
    fn test_extra_time_past_window_reanchors() {
        let r = round();
        // One whole round (16s) has elapsed at 17s; next boundary is 32s,
        // whose extra slot is 48s.
        let arranged = arrange_extra_block_time(&r, Timestamp::from_millis(17_000), 4000);
        assert_eq!(arranged, Timestamp::from_millis(48_000));
    }

    #[test]
    fn test_abnormal_time_never_collides_with_regular_slots() {
        let r = round();
        let arranged = arrange_abnormal_time(&r, Timestamp::from_millis(40_000), 4000);
        // Whatever boundary was chosen, the arranged instant must land on
        // an extra slot, strictly after every regular slot of that round.
        let start = r.round_start_time(4000).unwrap();
        let total = r.total_millis(4000);
        let offset = arranged.millis_since(start) % total;
        for order in 1..=3i64 {
            assert_ne!(offset, order * 4000, "collides with regular slot {order}");
        }
    }

    #[test]
    fn test_abnormal_time_multiple_missed_rounds() {
        let r = round();
        // 40s elapsed = 2 whole rounds; boundary at 48s, extra at 64s.
        let arranged = arrange_abnormal_time(&r, Timestamp::from_millis(40_000), 4000);
        assert_eq!(arranged, Timestamp::from_millis(64_000));
    }
}
