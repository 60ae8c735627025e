//! Checks applied to every proposal regardless of behaviour.

use super::{RoundValidator, ValidationContext};
use crate::domain::{ConsensusBehaviour, ConsensusError, ConsensusResult};

/// The sender must be a miner of the current committed round.
pub struct MiningPermissionValidator;

impl RoundValidator for MiningPermissionValidator {
    fn name(&self) -> &'static str {
        "mining_permission"
    }

    fn validate(&self, ctx: &ValidationContext<'_>) -> ConsensusResult<()> {
        if ctx.base_round.miner(&ctx.proposal.sender_pubkey).is_none() {
            return Err(ConsensusError::NotAMiner(ctx.proposal.sender_pubkey.clone()));
        }
        Ok(())
    }
}

/// The block time must fall in a window the sender is entitled to.
///
/// Block production: the sender's own slot, or the bonus window before
/// round start if the sender produced the previous round's extra block.
/// Round termination: at or after the extra block slot. The bootstrap
/// round carries no meaningful schedule and is exempt, as is a
/// single-miner network where slot arithmetic degenerates.
pub struct TimeSlotValidator;

impl RoundValidator for TimeSlotValidator {
    fn name(&self) -> &'static str {
        "time_slot"
    }

    fn validate(&self, ctx: &ValidationContext<'_>) -> ConsensusResult<()> {
        let base = ctx.base_round;
        if base.round_number == 1 || base.miners_count() == 1 {
            return Ok(());
        }
        let interval = ctx.config.mining_interval_ms;
        let block_time = ctx.proposal.block_time;
        let sender = &ctx.proposal.sender_pubkey;

        let out_of_slot = || ConsensusError::OutOfTimeSlot {
            pubkey: sender.clone(),
            block_time_millis: block_time.as_millis(),
        };

        match ctx.proposal.behaviour {
            ConsensusBehaviour::UpdateValue | ConsensusBehaviour::TinyBlock => {
                let miner = base
                    .miner(sender)
                    .ok_or_else(|| ConsensusError::NotAMiner(sender.clone()))?;
                if let Some(expected) = miner.expected_mining_time {
                    if block_time >= expected && block_time < expected.add_millis(interval) {
                        return Ok(());
                    }
                }
                // Bonus window: previous round's extra producer may keep
                // producing until the first regular slot opens.
                if *sender == base.extra_block_producer_of_previous_round {
                    if let Some(start) = base.round_start_time(interval) {
                        if block_time < start {
                            return Ok(());
                        }
                    }
                }
                Err(out_of_slot())
            }
            ConsensusBehaviour::NextRound | ConsensusBehaviour::NextTerm => {
                let extra_time = base
                    .extra_block_mining_time(interval)
                    .ok_or(ConsensusError::IncompleteSchedule {
                        round_number: base.round_number,
                    })?;
                if block_time >= extra_time {
                    Ok(())
                } else {
                    Err(out_of_slot())
                }
            }
            ConsensusBehaviour::Nothing => Err(ConsensusError::UnproposableBehaviour("Nothing")),
        }
    }
}

/// The sender must not have spent its continuous-block allowance.
///
/// A tiny block needs headroom left; a primary block or termination is
/// still acceptable when the counter sits exactly at the cap.
pub struct ContinuousBlocksValidator;

impl RoundValidator for ContinuousBlocksValidator {
    fn name(&self) -> &'static str {
        "continuous_blocks"
    }

    fn validate(&self, ctx: &ValidationContext<'_>) -> ConsensusResult<()> {
        let sender = &ctx.proposal.sender_pubkey;
        let miner = ctx
            .base_round
            .miner(sender)
            .ok_or_else(|| ConsensusError::NotAMiner(sender.clone()))?;
        let limit = ctx.config.maximum_tiny_blocks_per_slot;
        let exceeded = match ctx.proposal.behaviour {
            ConsensusBehaviour::TinyBlock => miner.produced_tiny_blocks >= limit,
            _ => miner.produced_tiny_blocks > limit,
        };
        if exceeded {
            return Err(ConsensusError::TinyBlockLimitExceeded {
                produced: miner.produced_tiny_blocks,
                limit,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;
    use crate::config::ConsensusConfig;
    use std::collections::BTreeSet;

    fn ctx_run(
        base: &crate::domain::Round,
        proposal: &crate::domain::RoundProposal,
        validator: &dyn RoundValidator,
    ) -> ConsensusResult<()> {
        let config = ConsensusConfig::default();
        let banned = BTreeSet::new();
        validator.validate(&ValidationContext {
            base_round: base,
            previous_round: None,
            proposal,
            expected_miners: None,
            banned: &banned,
            config: &config,
        })
    }

    #[test]
    fn test_stranger_has_no_mining_permission() {
        let base = base_round();
        let p = proposal(key(99), ConsensusBehaviour::TinyBlock, base.clone(), 4000);
        assert!(matches!(
            ctx_run(&base, &p, &MiningPermissionValidator),
            Err(ConsensusError::NotAMiner(_))
        ));
    }

    #[test]
    fn test_block_inside_own_slot_accepted() {
        let base = base_round();
        // Miner 2's slot runs [8000, 12000).
        let p = proposal(key(2), ConsensusBehaviour::UpdateValue, base.clone(), 9500);
        ctx_run(&base, &p, &TimeSlotValidator).unwrap();

        let late = proposal(key(2), ConsensusBehaviour::UpdateValue, base.clone(), 12000);
        assert!(matches!(
            ctx_run(&base, &late, &TimeSlotValidator),
            Err(ConsensusError::OutOfTimeSlot { .. })
        ));
    }

    #[test]
    fn test_previous_extra_producer_bonus_window() {
        let base = base_round();
        // Round start is first slot minus one interval: 0. Miner 1 is the
        // previous extra producer but its bonus window is empty here, so
        // give it a round starting later.
        let mut shifted = base.clone();
        for miner in shifted.miners.values_mut() {
            let expected = miner.expected_mining_time.unwrap();
            miner.expected_mining_time = Some(expected.add_millis(10_000));
        }
        // Window now ends at round start 10_000.
        let p = proposal(key(1), ConsensusBehaviour::TinyBlock, shifted.clone(), 6000);
        ctx_run(&shifted, &p, &TimeSlotValidator).unwrap();

        // Another miner gets no bonus.
        let other = proposal(key(3), ConsensusBehaviour::TinyBlock, shifted.clone(), 6000);
        assert!(ctx_run(&shifted, &other, &TimeSlotValidator).is_err());
    }

    #[test]
    fn test_termination_waits_for_extra_slot() {
        let base = base_round();
        // Extra slot: start 0 + (5 + 1) * 4000 = 24_000.
        let early = proposal(key(4), ConsensusBehaviour::NextRound, base.clone(), 20_000);
        assert!(matches!(
            ctx_run(&base, &early, &TimeSlotValidator),
            Err(ConsensusError::OutOfTimeSlot { .. })
        ));
        let on_time = proposal(key(4), ConsensusBehaviour::NextRound, base.clone(), 24_000);
        ctx_run(&base, &on_time, &TimeSlotValidator).unwrap();
    }

    #[test]
    fn test_tiny_block_cap() {
        let mut base = base_round();
        base.miners.get_mut(&key(2)).unwrap().produced_tiny_blocks = 8;
        let tiny = proposal(key(2), ConsensusBehaviour::TinyBlock, base.clone(), 8100);
        assert!(matches!(
            ctx_run(&base, &tiny, &ContinuousBlocksValidator),
            Err(ConsensusError::TinyBlockLimitExceeded { produced: 8, limit: 8 })
        ));
        // At the cap the slot owner may still terminate the round.
        let next = proposal(key(2), ConsensusBehaviour::NextRound, base.clone(), 24_000);
        ctx_run(&base, &next, &ContinuousBlocksValidator).unwrap();
    }
}
