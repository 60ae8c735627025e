//! Checks specific to round- and term-termination proposals.

use super::{RoundValidator, ValidationContext};
use crate::domain::{
    calculate_extra_block_producer_order, check_reconstruction_budget,
    resolve_next_round_orders, ConsensusBehaviour, ConsensusError, ConsensusResult,
};
use shared_crypto::keccak256_many;
use shared_types::Pubkey;
use std::collections::BTreeSet;

/// Structural checks shared by both termination behaviours: numbering,
/// no commitments in a fresh round, a complete schedule, and sender
/// authorization. Only the designated extra block producer may terminate
/// a round; a single-miner network is exempt since it has nobody else.
pub struct RoundTerminationValidator;

impl RoundValidator for RoundTerminationValidator {
    fn name(&self) -> &'static str {
        "round_termination"
    }

    fn validate(&self, ctx: &ValidationContext<'_>) -> ConsensusResult<()> {
        let base = ctx.base_round;
        let proposed = &ctx.proposal.round;
        let sender = &ctx.proposal.sender_pubkey;

        if proposed.round_number != base.round_number + 1 {
            return Err(ConsensusError::WrongRoundNumber {
                expected: base.round_number + 1,
                actual: proposed.round_number,
            });
        }
        let expected_term = match ctx.proposal.behaviour {
            ConsensusBehaviour::NextTerm => base.term_number + 1,
            _ => base.term_number,
        };
        if proposed.term_number != expected_term {
            return Err(ConsensusError::WrongTermNumber {
                expected: expected_term,
                actual: proposed.term_number,
            });
        }

        for (pubkey, miner) in &proposed.miners {
            let clean = miner.in_value.is_none()
                && miner.out_value.is_none()
                && miner.previous_in_value.is_none()
                && miner.signature.is_none();
            if !clean {
                return Err(ConsensusError::UnexpectedCommitment(pubkey.clone()));
            }
        }

        // Every miner of the new round needs an assigned slot.
        proposed.round_id()?;

        // Bootstrap: while only one miner has ever produced, the derived
        // extra producer may be a peer that never came online; the sole
        // producer terminates instead.
        let sole_producer = {
            let mut produced = base.miners.values().filter(|m| m.has_produced());
            match (produced.next(), produced.next()) {
                (Some(m), None) => &m.pubkey == sender,
                _ => false,
            }
        };
        let authorized = base
            .extra_block_producer()
            .map(|m| &m.pubkey == sender)
            .unwrap_or(false)
            || (base.miners_count() == 1 && base.miner(sender).is_some())
            || sole_producer;
        if !authorized {
            return Err(ConsensusError::UnauthorizedRoundTerminator(sender.clone()));
        }

        Ok(())
    }
}

/// Orders in a next-round proposal must match the conflict-resolved
/// orders derived from the committed round, and the miner set may only
/// change through a justified replacement.
pub struct MiningOrderValidator;

impl RoundValidator for MiningOrderValidator {
    fn name(&self) -> &'static str {
        "mining_order"
    }

    fn validate(&self, ctx: &ValidationContext<'_>) -> ConsensusResult<()> {
        let base = ctx.base_round;
        let proposed = &ctx.proposal.round;

        check_order_uniqueness(ctx)?;

        // Produced miners carry commitments to their next-round orders;
        // re-derive those deterministically and compare.
        let resolved = resolve_next_round_orders(base)?;
        for (pubkey, expected_order) in &resolved {
            let Some(miner) = proposed.miner(pubkey) else {
                // A miner that produced this round cannot have missed
                // enough slots to justify its removal.
                return Err(ConsensusError::MinerListMismatch);
            };
            if miner.order != *expected_order {
                return Err(ConsensusError::OrderMismatch {
                    pubkey: pubkey.clone(),
                    expected: *expected_order,
                    actual: miner.order,
                });
            }
        }

        // Miner set can deviate only through evil-miner replacement.
        let base_keys: BTreeSet<_> = base.miners.keys().collect();
        let proposed_keys: BTreeSet<_> = proposed.miners.keys().collect();
        if base_keys == proposed_keys {
            return check_schedule_and_extra_producer(ctx);
        }
        if !proposed.is_miner_list_just_changed
            || base_keys.len() != proposed_keys.len()
        {
            return Err(ConsensusError::MinerListMismatch);
        }
        for newcomer in proposed_keys.difference(&base_keys) {
            if ctx.banned.contains(*newcomer) {
                return Err(ConsensusError::BannedMinerReintroduced((*newcomer).clone()));
            }
        }
        let tolerance = ctx.config.tolerable_missed_time_slots;
        for removed in base_keys.difference(&proposed_keys) {
            let miner = &base.miners[*removed];
            let missed = miner.missed_time_slots + u64::from(!miner.has_produced());
            if missed <= tolerance {
                return Err(ConsensusError::UnjustifiedReplacement {
                    pubkey: (*removed).clone(),
                    missed,
                    tolerance,
                });
            }
        }
        check_schedule_and_extra_producer(ctx)
    }
}

/// The proposed schedule and extra-producer assignment are pure
/// functions of the committed round and the terminating block's time.
/// Re-derive both and compare, so a terminator cannot backdate its
/// peers' slots or hand itself the next round's extra slot.
fn check_schedule_and_extra_producer(ctx: &ValidationContext<'_>) -> ConsensusResult<()> {
    let proposed = &ctx.proposal.round;
    let interval = ctx.config.mining_interval_ms;
    let block_time = ctx.proposal.block_time;
    let extra_order = calculate_extra_block_producer_order(ctx.base_round, proposed.miners_count());

    for (pubkey, miner) in &proposed.miners {
        let expected = block_time.add_millis(miner.order as i64 * interval);
        if miner.expected_mining_time != Some(expected) {
            return Err(ConsensusError::ScheduleMismatch {
                pubkey: pubkey.clone(),
                expected_millis: expected.as_millis(),
                actual_millis: miner
                    .expected_mining_time
                    .map(|t| t.as_millis())
                    .unwrap_or_default(),
            });
        }
        if miner.is_extra_block_producer != (miner.order == extra_order) {
            return Err(ConsensusError::ExtraProducerMismatch(pubkey.clone()));
        }
    }
    Ok(())
}

/// A next-term proposal must seat exactly the miner set the election
/// authority reported, minus anyone banned.
pub struct MinerListValidator;

impl RoundValidator for MinerListValidator {
    fn name(&self) -> &'static str {
        "miner_list"
    }

    fn validate(&self, ctx: &ValidationContext<'_>) -> ConsensusResult<()> {
        let expected = ctx.expected_miners.ok_or_else(|| {
            ConsensusError::ElectionError("no election snapshot for term validation".into())
        })?;

        check_order_uniqueness(ctx)?;

        let expected_keys: BTreeSet<_> = expected
            .iter()
            .filter(|pk| !ctx.banned.contains(*pk))
            .collect();
        let proposed_keys: BTreeSet<_> = ctx.proposal.round.miners.keys().collect();
        for pubkey in &proposed_keys {
            if ctx.banned.contains(*pubkey) {
                return Err(ConsensusError::BannedMinerReintroduced((*pubkey).clone()));
            }
        }
        if expected_keys != proposed_keys {
            return Err(ConsensusError::MinerListMismatch);
        }

        // The first round of a term seats miners in digest order over
        // pubkey and term number; re-derive the shuffle and compare.
        let term_number = ctx.proposal.round.term_number;
        let mut shuffled: Vec<&Pubkey> = proposed_keys.iter().copied().collect();
        shuffled.sort_by_key(|pk| keccak256_many(&[&pk.to_bytes(), &term_number.to_be_bytes()]));
        for (index, pubkey) in shuffled.into_iter().enumerate() {
            let expected = index as u32 + 1;
            let actual = ctx.proposal.round.miners[pubkey].order;
            if actual != expected {
                return Err(ConsensusError::OrderMismatch {
                    pubkey: pubkey.clone(),
                    expected,
                    actual,
                });
            }
        }

        check_schedule_and_extra_producer(ctx)
    }
}

/// Reject a round whose size would make commitment reconstruction
/// exceed the configured time budget. The worst case reconstructs a
/// secret for every miner of the round, so the check is the same
/// whole-round formula the reveal path enforces.
pub struct ReconstructionBudgetValidator;

impl RoundValidator for ReconstructionBudgetValidator {
    fn name(&self) -> &'static str {
        "reconstruction_budget"
    }

    fn validate(&self, ctx: &ValidationContext<'_>) -> ConsensusResult<()> {
        check_reconstruction_budget(ctx.proposal.round.miners_count(), ctx.config)
    }
}

/// Orders in the proposed round must be a permutation of `1..=n`.
fn check_order_uniqueness(ctx: &ValidationContext<'_>) -> ConsensusResult<()> {
    let proposed = &ctx.proposal.round;
    let count = proposed.miners_count() as u32;
    let mut seen = BTreeSet::new();
    for miner in proposed.miners.values() {
        if miner.order < 1 || miner.order > count {
            return Err(ConsensusError::OrderMismatch {
                pubkey: miner.pubkey.clone(),
                expected: 0,
                actual: miner.order,
            });
        }
        if !seen.insert(miner.order) {
            return Err(ConsensusError::DuplicateOrder { order: miner.order });
        }
    }
    Ok(())
}
