//! Round generation: builds the next round's ordering, time slots and
//! extra-producer assignment from the current one.

use crate::config::ConsensusConfig;
use crate::domain::error::{ConsensusError, ConsensusResult};
use crate::domain::miner::MinerInRound;
use crate::domain::round::{order_from_signature, Round};
use shared_crypto::{keccak256, keccak256_many};
use shared_types::{Pubkey, Timestamp};
use std::collections::{BTreeMap, BTreeSet};

/// Resolve every produced miner's next-round order, relocating conflicts.
///
/// When two or more miners derived the same `supposed_order_of_next_round`
/// from their signatures, all but the first are walked through candidate
/// slots `supposed + 1 ..` (wrapping, skipping occupied ones) until a free
/// slot is found. Miners are visited in current-order sequence so the
/// result is deterministic for every node.
pub fn resolve_next_round_orders(round: &Round) -> ConsensusResult<BTreeMap<Pubkey, u32>> {
    let miners_count = round.miners_count() as u32;
    let mut produced: Vec<&MinerInRound> =
        round.miners.values().filter(|m| m.has_produced()).collect();
    produced.sort_by_key(|m| m.order);

    let mut taken: BTreeMap<u32, Pubkey> = BTreeMap::new();
    for miner in produced {
        let desired = miner.supposed_order_of_next_round.clamp(1, miners_count);
        let mut assigned = None;
        for step in 0..miners_count {
            let candidate = (desired - 1 + step) % miners_count + 1;
            if !taken.contains_key(&candidate) {
                assigned = Some(candidate);
                break;
            }
        }
        match assigned {
            Some(order) => {
                taken.insert(order, miner.pubkey.clone());
            }
            // All N slots already held by distinct miners: a duplicate
            // must never be fabricated, the transition is rejected.
            None => {
                return Err(ConsensusError::OrderConflictUnresolvable {
                    round_number: round.round_number,
                })
            }
        }
    }

    Ok(taken.into_iter().map(|(order, pk)| (pk, order)).collect())
}

/// Single end-of-processing reconciliation pass: write the resolved
/// next-round orders back into every produced miner's
/// `final_order_of_next_round`.
///
/// This is the only place another miner's record is touched; the pass is
/// deterministic and idempotent.
pub fn reconcile_final_orders(round: &mut Round) -> ConsensusResult<()> {
    let resolved = resolve_next_round_orders(round)?;
    for (pubkey, order) in resolved {
        if let Some(miner) = round.miners.get_mut(&pubkey) {
            miner.final_order_of_next_round = order;
        }
    }
    Ok(())
}

/// Slot of the next round's extra block producer, derived from the
/// source round's signature material.
///
/// A result equal to the last ordinal position is moved to the
/// second-to-last slot so the extra producer's bonus window never
/// coincides with the last regular slot.
pub fn calculate_extra_block_producer_order(source: &Round, next_miners_count: usize) -> u32 {
    let digest = keccak256(&source.signature_material());
    let mut order = order_from_signature(&digest, next_miners_count);
    if order as usize == next_miners_count && next_miners_count > 1 {
        order -= 1;
    }
    order
}

/// Generate the next round within the same term.
pub fn generate_next_round(
    current: &Round,
    sender: &Pubkey,
    current_block_time: Timestamp,
    config: &ConsensusConfig,
) -> ConsensusResult<Round> {
    if current.miners.is_empty() {
        return Err(ConsensusError::EmptyMinerList);
    }
    let miners_count = current.miners_count();
    let resolved = resolve_next_round_orders(current)?;

    // Orders not claimed by produced miners go to the silent ones, in
    // pubkey order.
    let mut free_orders: BTreeSet<u32> = (1..=miners_count as u32).collect();
    for order in resolved.values() {
        free_orders.remove(order);
    }
    let mut free_orders = free_orders.into_iter();

    let mut next = Round {
        round_number: current.round_number + 1,
        term_number: current.term_number,
        extra_block_producer_of_previous_round: sender.clone(),
        confirmed_irreversible_block_height: current.confirmed_irreversible_block_height,
        confirmed_irreversible_block_round_number: current.confirmed_irreversible_block_round_number,
        is_miner_list_just_changed: false,
        miners: BTreeMap::new(),
    };

    for (pubkey, miner) in &current.miners {
        let (order, missed) = match resolved.get(pubkey) {
            Some(order) => (*order, miner.missed_time_slots),
            None => (
                free_orders.next().ok_or(ConsensusError::OrderConflictUnresolvable {
                    round_number: current.round_number,
                })?,
                miner.missed_time_slots + 1,
            ),
        };
        let mut record = MinerInRound::new(
            pubkey.clone(),
            order,
            current_block_time.add_millis(order as i64 * config.mining_interval_ms),
        );
        record.produced_blocks = miner.produced_blocks;
        record.missed_time_slots = missed;
        next.miners.insert(pubkey.clone(), record);
    }

    mark_extra_block_producer(current, &mut next);
    Ok(next)
}

/// Generate the first round of the next term from a freshly elected
/// miner set. Counters reset; the caller must have verified `new_miners`
/// against the election authority.
pub fn generate_next_term(
    current: &Round,
    sender: &Pubkey,
    current_block_time: Timestamp,
    new_miners: &[Pubkey],
    config: &ConsensusConfig,
) -> ConsensusResult<Round> {
    let mut next = build_term_round(
        new_miners,
        current.round_number + 1,
        current.term_number + 1,
        current_block_time,
        config,
    )?;
    next.extra_block_producer_of_previous_round = sender.clone();
    next.confirmed_irreversible_block_height = current.confirmed_irreversible_block_height;
    next.confirmed_irreversible_block_round_number =
        current.confirmed_irreversible_block_round_number;
    mark_extra_block_producer(current, &mut next);
    Ok(next)
}

/// Generate the very first round of the chain.
pub fn generate_first_round(
    miners: &[Pubkey],
    start_time: Timestamp,
    config: &ConsensusConfig,
) -> ConsensusResult<Round> {
    let mut round = build_term_round(miners, 1, 1, start_time, config)?;
    // No prior signatures exist; the fallback material decides.
    let source = round.clone();
    mark_extra_block_producer(&source, &mut round);
    Ok(round)
}

/// Deterministic miner schedule for the first round of a term: ordered
/// by the digest of pubkey and term number, one slot per miner.
fn build_term_round(
    miners: &[Pubkey],
    round_number: u64,
    term_number: u64,
    start_time: Timestamp,
    config: &ConsensusConfig,
) -> ConsensusResult<Round> {
    if miners.is_empty() {
        return Err(ConsensusError::EmptyMinerList);
    }
    let mut shuffled: Vec<&Pubkey> = miners.iter().collect();
    shuffled.sort_by_key(|pk| keccak256_many(&[&pk.to_bytes(), &term_number.to_be_bytes()]));

    let mut round = Round {
        round_number,
        term_number,
        is_miner_list_just_changed: true,
        ..Default::default()
    };
    for (index, pubkey) in shuffled.into_iter().enumerate() {
        let order = index as u32 + 1;
        round.miners.insert(
            (*pubkey).clone(),
            MinerInRound::new(
                pubkey.clone(),
                order,
                start_time.add_millis(order as i64 * config.mining_interval_ms),
            ),
        );
    }
    Ok(round)
}

fn mark_extra_block_producer(source: &Round, next: &mut Round) {
    let order = calculate_extra_block_producer_order(source, next.miners_count());
    for miner in next.miners.values_mut() {
        miner.is_extra_block_producer = miner.order == order;
    }
}
