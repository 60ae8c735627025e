//! Published events (Outgoing)

use crate::domain::ConsensusBehaviour;
use serde::{Deserialize, Serialize};
use shared_types::{Pubkey, Timestamp};

/// A new block height reached two-thirds-plus-one agreement and can
/// never be reverted. Downstream consumers prune forks below it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IrreversibleBlockFoundEvent {
    pub height: u64,
    /// Round in which the height was implied, not the round that
    /// confirmed it.
    pub round_number: u64,
}

/// A miner's round information was applied to consensus state.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MiningInformationUpdatedEvent {
    pub pubkey: Pubkey,
    pub behaviour: ConsensusBehaviour,
    pub round_number: u64,
    pub block_time: Timestamp,
}

/// The active miner set changed at a term boundary.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MinerListChangedEvent {
    pub term_number: u64,
    pub miners: Vec<Pubkey>,
}

/// A miner was removed mid-term for exceeding the missed-slot tolerance.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MinerReplacedEvent {
    pub evil_miner: Pubkey,
    pub backup: Pubkey,
    pub round_number: u64,
}

/// All events the consensus service publishes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConsensusEvent {
    IrreversibleBlockFound(IrreversibleBlockFoundEvent),
    MiningInformationUpdated(MiningInformationUpdatedEvent),
    MinerListChanged(MinerListChangedEvent),
    MinerReplaced(MinerReplacedEvent),
}
