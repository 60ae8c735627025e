//! Driven ports (Outbound dependencies)

use crate::events::ConsensusEvent;
use async_trait::async_trait;
use shared_types::{Pubkey, Timestamp};

/// Election authority: the external contract that ranks candidates by
/// stake-weighted votes.
#[async_trait]
pub trait ElectionProvider: Send + Sync {
    /// Top `count` candidates by votes, for seating a new term.
    async fn get_victories(&self, count: usize) -> Result<Vec<Pubkey>, String>;

    /// Ranked standby candidates, for mid-term replacement of an evil
    /// miner.
    async fn get_backup_candidates(&self, count: usize) -> Result<Vec<Pubkey>, String>;
}

/// Event bus for choreography with the rest of the node.
#[async_trait]
pub trait EventBus: Send + Sync {
    async fn publish(&self, event: ConsensusEvent) -> Result<(), String>;
}

/// Wall-clock abstraction, injected so tests drive time explicitly.
pub trait TimeSource: Send + Sync {
    fn now(&self) -> Timestamp;
}

/// Production time source backed by the system clock.
pub struct SystemTimeSource;

impl TimeSource for SystemTimeSource {
    fn now(&self) -> Timestamp {
        let millis = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_millis() as i64)
            .unwrap_or(0);
        Timestamp::from_millis(millis)
    }
}
