//! Validation pipeline.
//!
//! Each behaviour maps to an ordered list of independent checks; the
//! first failure short-circuits. The same pipeline runs before execution
//! (against the proposal) and, structurally, after execution (canonical
//! hash comparison against the committed round).

mod basic;
mod termination;
mod update_value;

pub use basic::{ContinuousBlocksValidator, MiningPermissionValidator, TimeSlotValidator};
pub use termination::{
    MinerListValidator, MiningOrderValidator, ReconstructionBudgetValidator,
    RoundTerminationValidator,
};
pub use update_value::{LibInformationValidator, UpdateValueValidator};

use crate::config::ConsensusConfig;
use crate::domain::{ConsensusBehaviour, ConsensusError, ConsensusResult, Round, RoundProposal};
use shared_types::Pubkey;
use std::collections::BTreeSet;
use tracing::debug;

/// Everything a validator may look at. Checks always run against the
/// current *committed* round (`base_round`), never against fields of the
/// proposed round itself.
pub struct ValidationContext<'a> {
    pub base_round: &'a Round,
    pub previous_round: Option<&'a Round>,
    pub proposal: &'a RoundProposal,
    /// Election authority snapshot, supplied for NextTerm proposals.
    pub expected_miners: Option<&'a [Pubkey]>,
    /// Miners removed for misbehaviour, permanently excluded.
    pub banned: &'a BTreeSet<Pubkey>,
    pub config: &'a ConsensusConfig,
}

/// One independent validation check.
pub trait RoundValidator: Send + Sync {
    /// Stable name for logs and rejection metrics.
    fn name(&self) -> &'static str;

    fn validate(&self, ctx: &ValidationContext<'_>) -> ConsensusResult<()>;
}

/// Ordered validator list for a behaviour.
pub fn validators_for(behaviour: ConsensusBehaviour) -> Vec<Box<dyn RoundValidator>> {
    match behaviour {
        ConsensusBehaviour::UpdateValue => vec![
            Box::new(MiningPermissionValidator),
            Box::new(TimeSlotValidator),
            Box::new(ContinuousBlocksValidator),
            Box::new(UpdateValueValidator),
            Box::new(LibInformationValidator),
        ],
        ConsensusBehaviour::TinyBlock => vec![
            Box::new(MiningPermissionValidator),
            Box::new(TimeSlotValidator),
            Box::new(ContinuousBlocksValidator),
        ],
        ConsensusBehaviour::NextRound => vec![
            Box::new(MiningPermissionValidator),
            Box::new(TimeSlotValidator),
            Box::new(ContinuousBlocksValidator),
            Box::new(RoundTerminationValidator),
            Box::new(MiningOrderValidator),
            Box::new(LibInformationValidator),
            Box::new(ReconstructionBudgetValidator),
        ],
        ConsensusBehaviour::NextTerm => vec![
            Box::new(MiningPermissionValidator),
            Box::new(TimeSlotValidator),
            Box::new(ContinuousBlocksValidator),
            Box::new(RoundTerminationValidator),
            Box::new(MinerListValidator),
            Box::new(LibInformationValidator),
            Box::new(ReconstructionBudgetValidator),
        ],
        ConsensusBehaviour::Nothing => Vec::new(),
    }
}

/// Run the pre-execution pipeline for a proposal.
pub fn validate_proposal(ctx: &ValidationContext<'_>) -> ConsensusResult<()> {
    if ctx.proposal.behaviour == ConsensusBehaviour::Nothing {
        return Err(ConsensusError::UnproposableBehaviour("Nothing"));
    }
    for validator in validators_for(ctx.proposal.behaviour) {
        if let Err(reason) = validator.validate(ctx) {
            debug!(
                validator = validator.name(),
                behaviour = %ctx.proposal.behaviour,
                %reason,
                "proposal rejected"
            );
            return Err(reason);
        }
    }
    Ok(())
}

/// Post-execution structural check: the committed round must hash to the
/// same canonical digest as the validated proposal, so no unvalidated
/// mutation slipped in during processing.
pub fn validate_committed_round(committed: &Round, validated: &Round) -> ConsensusResult<()> {
    if committed.round_number != validated.round_number {
        return Err(ConsensusError::WrongRoundNumber {
            expected: validated.round_number,
            actual: committed.round_number,
        });
    }
    if committed.canonical_hash() != validated.canonical_hash() {
        return Err(ConsensusError::PostExecutionHashMismatch);
    }
    Ok(())
}


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;

    #[test]
    fn test_nothing_is_unproposable() {
        let base = base_round();
        let p = proposal(key(1), ConsensusBehaviour::Nothing, base.clone(), 4000);
        let result = run(&base, None, &p, None, &BTreeSet::new());
        assert!(matches!(
            result,
            Err(ConsensusError::UnproposableBehaviour("Nothing"))
        ));
    }

    #[test]
    fn test_committed_round_hash_check() {
        let base = base_round();
        validate_committed_round(&base, &base.clone()).unwrap();

        // Volatile mutation during processing is fine.
        let mut committed = base.clone();
        committed
            .miners
            .get_mut(&key(1))
            .unwrap()
            .record_block(shared_types::Timestamp::from_millis(4_000));
        validate_committed_round(&committed, &base).unwrap();

        // Consensus-relevant mutation is not.
        let mut tampered = base.clone();
        tampered.miners.get_mut(&key(2)).unwrap().order = 9;
        assert!(matches!(
            validate_committed_round(&tampered, &base),
            Err(ConsensusError::PostExecutionHashMismatch)
        ));
    }
}
