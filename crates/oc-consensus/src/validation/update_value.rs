//! Checks specific to in-round block production proposals.

use super::{RoundValidator, ValidationContext};
use crate::domain::{ConsensusBehaviour, ConsensusError, ConsensusResult};
use shared_crypto::keccak256;

/// An update-value proposal must keep the committed round's shape: same
/// round and term numbers, same miner set, and exactly one record
/// changed, the sender's, which must now carry its first and only
/// commitment of the round.
pub struct UpdateValueValidator;

impl RoundValidator for UpdateValueValidator {
    fn name(&self) -> &'static str {
        "update_value"
    }

    fn validate(&self, ctx: &ValidationContext<'_>) -> ConsensusResult<()> {
        let base = ctx.base_round;
        let proposed = &ctx.proposal.round;
        let sender = &ctx.proposal.sender_pubkey;

        if proposed.round_number != base.round_number {
            return Err(ConsensusError::WrongRoundNumber {
                expected: base.round_number,
                actual: proposed.round_number,
            });
        }
        if proposed.term_number != base.term_number {
            return Err(ConsensusError::WrongTermNumber {
                expected: base.term_number,
                actual: proposed.term_number,
            });
        }
        if proposed.miners.len() != base.miners.len()
            || !proposed.miners.keys().eq(base.miners.keys())
        {
            return Err(ConsensusError::MinerListMismatch);
        }

        // A produced miner's primary slot is spent; accepting a second
        // commitment would let it re-roll its next-round order.
        if base.miner(sender).is_some_and(|m| m.has_produced()) {
            return Err(ConsensusError::CommitmentAlreadyPublished(sender.clone()));
        }

        let record = proposed
            .miner(sender)
            .ok_or_else(|| ConsensusError::NotAMiner(sender.clone()))?;
        if record.out_value.is_none() || record.signature.is_none() {
            return Err(ConsensusError::CommitmentMissing(sender.clone()));
        }

        // Nobody else's commitment fields may change hands.
        for (pubkey, proposed_miner) in &proposed.miners {
            if pubkey == sender {
                continue;
            }
            let committed = &base.miners[pubkey];
            let untouched = proposed_miner.in_value == committed.in_value
                && proposed_miner.out_value == committed.out_value
                && proposed_miner.previous_in_value == committed.previous_in_value
                && proposed_miner.signature == committed.signature;
            if !untouched {
                return Err(ConsensusError::ForeignCommitmentTouched(pubkey.clone()));
            }
        }

        // A revealed previous in-value must hash to the commitment the
        // sender published last round. Nothing to check when the previous
        // round is out of retention or carried no commitment.
        if let Some(revealed) = record.previous_in_value {
            if let Some(previous) = ctx.previous_round {
                if let Some(prev_out) = previous.miner(sender).and_then(|m| m.out_value) {
                    if keccak256(&revealed) != prev_out {
                        return Err(ConsensusError::RevealMismatch(sender.clone()));
                    }
                }
            }
        }

        Ok(())
    }
}

/// The irreversible-block view must never move backwards.
///
/// Applies to every behaviour that carries a round payload: the proposed
/// round's confirmed height and round number must be at least the
/// committed ones, and an update-value proposal must not lower the
/// sender's own implied height.
pub struct LibInformationValidator;

impl RoundValidator for LibInformationValidator {
    fn name(&self) -> &'static str {
        "lib_information"
    }

    fn validate(&self, ctx: &ValidationContext<'_>) -> ConsensusResult<()> {
        let base = ctx.base_round;
        let proposed = &ctx.proposal.round;

        if proposed.confirmed_irreversible_block_height < base.confirmed_irreversible_block_height {
            return Err(ConsensusError::LibRegression {
                field: "height",
                committed: base.confirmed_irreversible_block_height,
                proposed: proposed.confirmed_irreversible_block_height,
            });
        }
        if proposed.confirmed_irreversible_block_round_number
            < base.confirmed_irreversible_block_round_number
        {
            return Err(ConsensusError::LibRegression {
                field: "round_number",
                committed: base.confirmed_irreversible_block_round_number,
                proposed: proposed.confirmed_irreversible_block_round_number,
            });
        }

        if ctx.proposal.behaviour == ConsensusBehaviour::UpdateValue {
            let sender = &ctx.proposal.sender_pubkey;
            if let (Some(committed), Some(proposed_miner)) =
                (base.miner(sender), proposed.miner(sender))
            {
                if proposed_miner.implied_irreversible_block_height
                    < committed.implied_irreversible_block_height
                {
                    return Err(ConsensusError::LibRegression {
                        field: "implied_height",
                        committed: committed.implied_irreversible_block_height,
                        proposed: proposed_miner.implied_irreversible_block_height,
                    });
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;
    use crate::domain::{MinerInRound, Round};
    use shared_types::Timestamp;
    use std::collections::BTreeSet;

    /// Base round with miner 3's slot still open and commitment unset.
    fn base_with_pending_sender() -> Round {
        let mut base = base_round();
        {
            let miner = base.miners.get_mut(&key(3)).unwrap();
            miner.out_value = None;
            miner.signature = None;
            miner.in_value = None;
        }
        base
    }

    /// Proposal where miner 3 fills in its commitment.
    fn update_from_miner_3(base: &Round) -> crate::domain::RoundProposal {
        let mut proposed = base.clone();
        {
            let miner = proposed.miners.get_mut(&key(3)).unwrap();
            let in_value = [42u8; 32];
            miner.in_value = Some(in_value);
            miner.out_value = Some(keccak256(&in_value));
            miner.signature = Some(base.calculate_signature(&in_value));
            miner.record_block(Timestamp::from_millis(12_500));
        }
        proposal(key(3), ConsensusBehaviour::UpdateValue, proposed, 12_500)
    }

    #[test]
    fn test_well_formed_update_accepted() {
        let base = base_with_pending_sender();
        let p = update_from_miner_3(&base);
        UpdateValueValidator
            .validate(&ValidationContext {
                base_round: &base,
                previous_round: None,
                proposal: &p,
                expected_miners: None,
                banned: &BTreeSet::new(),
                config: &crate::config::ConsensusConfig::default(),
            })
            .unwrap();
    }

    #[test]
    fn test_missing_commitment_rejected() {
        let base = base_with_pending_sender();
        let mut p = update_from_miner_3(&base);
        p.round.miners.get_mut(&key(3)).unwrap().out_value = None;
        let result = run(&base, None, &p, None, &BTreeSet::new());
        assert!(matches!(result, Err(ConsensusError::CommitmentMissing(_))));
    }

    #[test]
    fn test_touching_foreign_record_rejected() {
        let base = base_with_pending_sender();
        let mut p = update_from_miner_3(&base);
        p.round.miners.get_mut(&key(5)).unwrap().out_value = Some([0xee; 32]);
        let result = run(&base, None, &p, None, &BTreeSet::new());
        assert!(matches!(
            result,
            Err(ConsensusError::ForeignCommitmentTouched(pk)) if pk == key(5)
        ));
    }

    #[test]
    fn test_second_commitment_in_same_round_rejected() {
        // Miner 3 already produced in the committed round; swapping in a
        // fresh commitment inside its slot must not go through.
        let base = base_round();
        let p = update_from_miner_3(&base);
        assert!(matches!(
            run(&base, None, &p, None, &BTreeSet::new()),
            Err(ConsensusError::CommitmentAlreadyPublished(pk)) if pk == key(3)
        ));
    }

    #[test]
    fn test_miner_set_must_not_change() {
        let base = base_with_pending_sender();
        let mut p = update_from_miner_3(&base);
        p.round.miners.insert(
            key(77),
            MinerInRound::new(key(77), 6, Timestamp::from_millis(24_000)),
        );
        assert!(matches!(
            run(&base, None, &p, None, &BTreeSet::new()),
            Err(ConsensusError::MinerListMismatch)
        ));
    }

    #[test]
    fn test_reveal_checked_against_previous_round() {
        let base = base_with_pending_sender();
        let previous_in = [7u8; 32];
        let mut previous = base_round();
        previous.round_number = 6;
        previous.miners.get_mut(&key(3)).unwrap().out_value = Some(keccak256(&previous_in));

        let mut p = update_from_miner_3(&base);
        p.round.miners.get_mut(&key(3)).unwrap().previous_in_value = Some(previous_in);
        run(&base, Some(&previous), &p, None, &BTreeSet::new()).unwrap();

        p.round.miners.get_mut(&key(3)).unwrap().previous_in_value = Some([8u8; 32]);
        assert!(matches!(
            run(&base, Some(&previous), &p, None, &BTreeSet::new()),
            Err(ConsensusError::RevealMismatch(_))
        ));
    }

    #[test]
    fn test_lib_height_regression_rejected() {
        let base = base_with_pending_sender();
        let mut p = update_from_miner_3(&base);
        p.round.confirmed_irreversible_block_height = 89;
        assert!(matches!(
            run(&base, None, &p, None, &BTreeSet::new()),
            Err(ConsensusError::LibRegression { field: "height", committed: 90, proposed: 89 })
        ));
    }

    #[test]
    fn test_implied_height_regression_rejected() {
        let base = base_with_pending_sender();
        let mut p = update_from_miner_3(&base);
        p.round
            .miners
            .get_mut(&key(3))
            .unwrap()
            .implied_irreversible_block_height = 50;
        assert!(matches!(
            run(&base, None, &p, None, &BTreeSet::new()),
            Err(ConsensusError::LibRegression { field: "implied_height", .. })
        ));
    }
}
