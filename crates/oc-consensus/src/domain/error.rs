//! Error types for the consensus core.
//!
//! The taxonomy distinguishes rejections (a proposal fails validation and
//! is discarded, state unchanged) from structural invariant violations
//! (the transition itself is malformed and must be aborted). Liveness
//! conditions are not errors; functions that may legitimately make no
//! progress return `Option`.

use shared_types::Pubkey;

/// Consensus error types.
#[derive(Debug, thiserror::Error)]
pub enum ConsensusError {
    // --- Rejections: the proposal is discarded, the round is unchanged ---
    #[error("Sender {0} is not a miner of the current round")]
    NotAMiner(Pubkey),

    #[error("Block from {pubkey} at {block_time_millis}ms is outside its time slot")]
    OutOfTimeSlot {
        pubkey: Pubkey,
        block_time_millis: i64,
    },

    #[error("Tiny block limit reached: {produced} of {limit} this slot")]
    TinyBlockLimitExceeded { produced: u32, limit: u32 },

    #[error("Wrong round number: expected {expected}, got {actual}")]
    WrongRoundNumber { expected: u64, actual: u64 },

    #[error("Wrong term number: expected {expected}, got {actual}")]
    WrongTermNumber { expected: u64, actual: u64 },

    #[error("Sender {0} supplied no commitment in an update-value proposal")]
    CommitmentMissing(Pubkey),

    #[error("Proposed round carries a commitment for {0} where none is allowed")]
    UnexpectedCommitment(Pubkey),

    #[error("Sender {0} already published a commitment this round")]
    CommitmentAlreadyPublished(Pubkey),

    #[error("Update-value proposal touches another miner's record: {0}")]
    ForeignCommitmentTouched(Pubkey),

    #[error("Previous-round reveal from {0} does not match the stored commitment")]
    RevealMismatch(Pubkey),

    #[error("Irreversible-block {field} regressed: committed {committed}, proposed {proposed}")]
    LibRegression {
        field: &'static str,
        committed: u64,
        proposed: u64,
    },

    #[error("Sender {0} is not the designated extra block producer")]
    UnauthorizedRoundTerminator(Pubkey),

    #[error("Miner {pubkey} proposed with order {actual}, reconciled order is {expected}")]
    OrderMismatch {
        pubkey: Pubkey,
        expected: u32,
        actual: u32,
    },

    #[error("Order {order} assigned more than once in the proposed round")]
    DuplicateOrder { order: u32 },

    #[error("Miner {pubkey} scheduled at {actual_millis}ms, derived slot is {expected_millis}ms")]
    ScheduleMismatch {
        pubkey: Pubkey,
        expected_millis: i64,
        actual_millis: i64,
    },

    #[error("Extra-producer flag on {0} does not match the derived assignment")]
    ExtraProducerMismatch(Pubkey),

    #[error("Proposed miner list does not match the election authority's output")]
    MinerListMismatch,

    #[error("Replaced miner {pubkey} had only {missed} missed slots, tolerance is {tolerance}")]
    UnjustifiedReplacement {
        pubkey: Pubkey,
        missed: u64,
        tolerance: u64,
    },

    #[error("Banned miner {0} reintroduced into the round")]
    BannedMinerReintroduced(Pubkey),

    #[error("Committed round hash diverges from the validated proposal")]
    PostExecutionHashMismatch,

    #[error("Secret reconstruction cost {cost_micros}us exceeds the {budget_micros}us budget")]
    ReconstructionOverBudget {
        cost_micros: u64,
        budget_micros: u64,
    },

    #[error("Main-chain round {provided} is not beyond the stored {stored}")]
    MainChainRoundNotMonotonic { stored: u64, provided: u64 },

    #[error("Main-chain round jump from {stored} to {provided} exceeds {max_jump}")]
    MainChainRoundJumpTooLarge {
        stored: u64,
        provided: u64,
        max_jump: u64,
    },

    #[error("Behaviour {0} cannot be proposed")]
    UnproposableBehaviour(&'static str),

    // --- Structural invariant violations: fatal to the transition ---
    #[error("Round {round_number} has unset expected mining times")]
    IncompleteSchedule { round_number: u64 },

    #[error("Order conflict resolution exhausted in round {round_number}")]
    OrderConflictUnresolvable { round_number: u64 },

    #[error("Miner list must not be empty")]
    EmptyMinerList,

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Round {round_number} is not in the store")]
    UnknownRound { round_number: u64 },

    #[error("Consensus store has no current round")]
    NoCurrentRound,

    // --- Collaborator failures ---
    #[error("Election authority error: {0}")]
    ElectionError(String),

    #[error("Event bus error: {0}")]
    EventBusError(String),
}

impl ConsensusError {
    /// True for validation rejections where the proposal is simply
    /// discarded and the sender's slot is missed.
    pub fn is_rejection(&self) -> bool {
        !matches!(
            self,
            Self::IncompleteSchedule { .. }
                | Self::OrderConflictUnresolvable { .. }
                | Self::EmptyMinerList
                | Self::InvalidConfig(_)
                | Self::UnknownRound { .. }
                | Self::NoCurrentRound
                | Self::ElectionError(_)
                | Self::EventBusError(_)
        )
    }

    /// Short stable label for metrics and logs.
    pub fn label(&self) -> &'static str {
        match self {
            Self::NotAMiner(_) => "not_a_miner",
            Self::OutOfTimeSlot { .. } => "out_of_time_slot",
            Self::TinyBlockLimitExceeded { .. } => "tiny_block_limit",
            Self::WrongRoundNumber { .. } => "wrong_round_number",
            Self::WrongTermNumber { .. } => "wrong_term_number",
            Self::CommitmentMissing(_) => "commitment_missing",
            Self::UnexpectedCommitment(_) => "unexpected_commitment",
            Self::CommitmentAlreadyPublished(_) => "commitment_already_published",
            Self::ForeignCommitmentTouched(_) => "foreign_commitment",
            Self::RevealMismatch(_) => "reveal_mismatch",
            Self::LibRegression { .. } => "lib_regression",
            Self::UnauthorizedRoundTerminator(_) => "unauthorized_terminator",
            Self::OrderMismatch { .. } => "order_mismatch",
            Self::DuplicateOrder { .. } => "duplicate_order",
            Self::ScheduleMismatch { .. } => "schedule_mismatch",
            Self::ExtraProducerMismatch(_) => "extra_producer_mismatch",
            Self::MinerListMismatch => "miner_list_mismatch",
            Self::UnjustifiedReplacement { .. } => "unjustified_replacement",
            Self::BannedMinerReintroduced(_) => "banned_reintroduced",
            Self::PostExecutionHashMismatch => "post_execution_hash",
            Self::ReconstructionOverBudget { .. } => "reconstruction_budget",
            Self::MainChainRoundNotMonotonic { .. } => "main_chain_not_monotonic",
            Self::MainChainRoundJumpTooLarge { .. } => "main_chain_jump",
            Self::UnproposableBehaviour(_) => "unproposable_behaviour",
            Self::IncompleteSchedule { .. } => "incomplete_schedule",
            Self::OrderConflictUnresolvable { .. } => "order_conflict",
            Self::EmptyMinerList => "empty_miner_list",
            Self::InvalidConfig(_) => "invalid_config",
            Self::UnknownRound { .. } => "unknown_round",
            Self::NoCurrentRound => "no_current_round",
            Self::ElectionError(_) => "election",
            Self::EventBusError(_) => "event_bus",
        }
    }
}

/// Result type for consensus operations.
pub type ConsensusResult<T> = Result<T, ConsensusError>;
