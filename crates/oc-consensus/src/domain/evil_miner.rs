//! Evil-miner detection and replacement.
//!
//! A miner accumulating more missed time slots than the configured
//! tolerance is flagged and substituted with a backup candidate. Removed
//! miners stay banned until explicitly un-banned; every backup pool must
//! subtract them, otherwise the replacement path reintroduces the miner
//! it just removed.

use crate::domain::error::{ConsensusError, ConsensusResult};
use crate::domain::round::Round;
use shared_types::Pubkey;
use std::collections::BTreeSet;

/// Miners whose missed-slot count has crossed `tolerance`.
pub fn find_evil_miners(round: &Round, tolerance: u64) -> Vec<Pubkey> {
    round
        .miners
        .values()
        .filter(|m| m.missed_time_slots > tolerance)
        .map(|m| m.pubkey.clone())
        .collect()
}

/// Candidates eligible to fill a vacated slot: not already mining this
/// round and not banned.
pub fn filter_backup_candidates(
    candidates: &[Pubkey],
    round: &Round,
    banned: &BTreeSet<Pubkey>,
) -> Vec<Pubkey> {
    candidates
        .iter()
        .filter(|pk| !round.miners.contains_key(*pk) && !banned.contains(*pk))
        .cloned()
        .collect()
}

/// Substitute `backup` for `evil` in `round`, inheriting the vacated
/// order and time slot with fresh counters, and mark the miner list as
/// changed for this round.
pub fn replace_miner(round: &mut Round, evil: &Pubkey, backup: &Pubkey) -> ConsensusResult<()> {
    let record = round
        .miners
        .remove(evil)
        .ok_or_else(|| ConsensusError::NotAMiner(evil.clone()))?;

    let mut substitute = crate::domain::miner::MinerInRound::new(
        backup.clone(),
        record.order,
        record.expected_mining_time.unwrap_or_default(),
    );
    substitute.expected_mining_time = record.expected_mining_time;
    substitute.is_extra_block_producer = record.is_extra_block_producer;
    round.miners.insert(backup.clone(), substitute);
    round.is_miner_list_just_changed = true;
    Ok(())
}
