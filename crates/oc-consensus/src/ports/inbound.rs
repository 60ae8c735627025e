//! Driving ports (Inbound API)

use crate::domain::{
    ConsensusBehaviour, ConsensusCommand, ConsensusResult, RoundProposal, TriggerInformation,
};
use async_trait::async_trait;
use shared_types::{Pubkey, Timestamp};

/// Primary consensus API, mirroring the four entry points a block
/// producer calls over one block's lifecycle plus chain bookkeeping.
#[async_trait]
pub trait ConsensusApi: Send + Sync {
    /// Decide what the given miner should do at `block_time`: produce,
    /// terminate the round or term, or stand by.
    async fn get_consensus_command(
        &self,
        pubkey: Pubkey,
        block_time: Timestamp,
    ) -> ConsensusResult<ConsensusCommand>;

    /// Build the round payload a block carries for the behaviour chosen
    /// by `get_consensus_command`. The returned proposal is what peers
    /// will validate and what `process` replays.
    async fn get_consensus_extra_data(
        &self,
        trigger: TriggerInformation,
        block_time: Timestamp,
    ) -> ConsensusResult<RoundProposal>;

    /// Run the full pre-execution validation pipeline for a proposal.
    async fn validate_before_execution(&self, proposal: &RoundProposal) -> ConsensusResult<()>;

    /// Structural check after execution: the committed round must match
    /// the validated proposal's canonical hash.
    async fn validate_after_execution(&self, proposal: &RoundProposal) -> ConsensusResult<()>;

    /// Apply a validated proposal to consensus state and publish the
    /// resulting events.
    async fn process(&self, proposal: RoundProposal) -> ConsensusResult<()>;

    /// Record a main-chain round number and miner list observed over
    /// cross-chain communication.
    async fn record_main_chain_round(
        &self,
        round_number: u64,
        miners: Vec<Pubkey>,
    ) -> ConsensusResult<()>;

    /// The behaviour the decision engine currently assigns to `pubkey`,
    /// without constructing a command.
    async fn current_behaviour(
        &self,
        pubkey: Pubkey,
        block_time: Timestamp,
    ) -> ConsensusResult<ConsensusBehaviour>;
}
