//! Payload types exchanged with the node runtime.

use crate::domain::behaviour::ConsensusBehaviour;
use crate::domain::round::Round;
use serde::{Deserialize, Serialize};
use shared_types::{Hash, Pubkey, Timestamp};

/// Scheduling instruction returned to the node: what to mine and when.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsensusCommand {
    pub behaviour: ConsensusBehaviour,
    /// Instant the node's timer should fire before submitting.
    pub arranged_mining_time: Timestamp,
    /// Milliseconds the miner may spend producing before its window closes.
    pub limit_millis: i64,
}

/// What a miner supplies when asking for the concrete round payload.
///
/// `in_value` is the fresh commitment preimage; it enters the round
/// record only here, at round-supply time.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerInformation {
    pub pubkey: Pubkey,
    pub behaviour: ConsensusBehaviour,
    /// Commitment preimage for this round.
    pub in_value: Option<Hash>,
    /// Reveal of the previous round's preimage.
    pub previous_in_value: Option<Hash>,
    /// Highest block height the node considers irreversible, fed into
    /// the LIB quorum.
    pub implied_irreversible_block_height: Option<u64>,
}

/// A proposed round transition, submitted as block extra data and fed
/// through the validation pipeline before and after execution.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundProposal {
    pub sender_pubkey: Pubkey,
    pub behaviour: ConsensusBehaviour,
    /// The full round as it should look after this transition.
    pub round: Round,
    /// Block time the proposal was produced at.
    pub block_time: Timestamp,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_proposal_serde_round_trip() {
        let proposal = RoundProposal {
            sender_pubkey: Pubkey::parse("ab").unwrap(),
            behaviour: ConsensusBehaviour::NextRound,
            round: Round {
                round_number: 5,
                term_number: 2,
                ..Default::default()
            },
            block_time: Timestamp::from_millis(123_456),
        };
        let bytes = bincode::serialize(&proposal).unwrap();
        let back: RoundProposal = bincode::deserialize(&bytes).unwrap();
        assert_eq!(back, proposal);
    }
}
