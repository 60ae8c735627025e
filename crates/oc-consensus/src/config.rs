//! Runtime configuration for the consensus core.

use crate::domain::{ConsensusError, ConsensusResult};
use serde::Deserialize;
use shared_crypto::{default_threshold, reconstruction_cost_micros};

/// Consensus tuning parameters.
///
/// All values are governance-controlled; `validate` must pass before the
/// configuration is used.
#[derive(Clone, Debug, Deserialize)]
pub struct ConsensusConfig {
    /// Width of one mining time slot in milliseconds.
    pub mining_interval_ms: i64,

    /// Tiny blocks a miner may produce inside one slot.
    pub maximum_tiny_blocks_per_slot: u32,

    /// Governance ceiling on the miner count. Bounds the worst-case
    /// secret-reconstruction cost (see `validate`).
    pub maximum_miners_count: usize,

    /// Missed slots tolerated before a miner is flagged for replacement.
    pub tolerable_missed_time_slots: u64,

    /// Term length in seconds.
    pub term_period_seconds: i64,

    /// Largest accepted forward jump in the parent-chain round number.
    pub maximum_main_chain_round_jump: u64,

    /// Per-block budget for secret-share reconstruction, milliseconds.
    pub reconstruction_budget_ms: u64,
}

impl Default for ConsensusConfig {
    fn default() -> Self {
        Self {
            mining_interval_ms: 4000,
            maximum_tiny_blocks_per_slot: 8,
            maximum_miners_count: 21,
            tolerable_missed_time_slots: 30,
            term_period_seconds: 604_800, // one week
            maximum_main_chain_round_jump: 1440,
            reconstruction_budget_ms: 1000,
        }
    }
}

impl ConsensusConfig {
    /// Check internal consistency.
    ///
    /// Rejects a miner ceiling whose worst-case reconstruction cost would
    /// exceed the per-block budget; a too-large ceiling would otherwise
    /// let round termination silently overrun its mining window.
    pub fn validate(&self) -> ConsensusResult<()> {
        if self.mining_interval_ms <= 0 {
            return Err(ConsensusError::InvalidConfig(
                "mining_interval_ms must be positive".into(),
            ));
        }
        if self.maximum_tiny_blocks_per_slot == 0 {
            return Err(ConsensusError::InvalidConfig(
                "maximum_tiny_blocks_per_slot must be at least 1".into(),
            ));
        }
        if self.maximum_miners_count == 0 {
            return Err(ConsensusError::InvalidConfig(
                "maximum_miners_count must be at least 1".into(),
            ));
        }
        if self.term_period_seconds <= 0 {
            return Err(ConsensusError::InvalidConfig(
                "term_period_seconds must be positive".into(),
            ));
        }
        let worst_case = reconstruction_cost_micros(default_threshold(self.maximum_miners_count))
            .saturating_mul(self.maximum_miners_count as u64);
        if worst_case > self.reconstruction_budget_ms.saturating_mul(1000) {
            return Err(ConsensusError::InvalidConfig(format!(
                "reconstruction worst case {worst_case}us exceeds the {}ms budget",
                self.reconstruction_budget_ms
            )));
        }
        Ok(())
    }
}
