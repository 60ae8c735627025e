//! Mutable state of the consensus service.
//!
//! Rounds are append-only history with a short retention window: the
//! current round plus its predecessor, which is all the reveal and LIB
//! machinery ever reads. Term history is append-only for the process
//! lifetime; the banned set shrinks only through an explicit unban.

use crate::config::ConsensusConfig;
use crate::domain::{ConsensusError, ConsensusResult, Round};
use parking_lot::RwLock;
use shared_types::{Pubkey, Timestamp};
use std::collections::{BTreeMap, BTreeSet};

/// Number of committed rounds kept in memory.
const ROUND_RETENTION: usize = 2;

#[derive(Default)]
struct StoreInner {
    rounds: BTreeMap<u64, Round>,
    current_round_number: Option<u64>,
    blockchain_start_time: Option<Timestamp>,
    banned: BTreeSet<Pubkey>,
    /// `(term_number, first_round_number)` pairs, append-only.
    term_history: Vec<(u64, u64)>,
    /// Highest main-chain round number this side chain has confirmed.
    main_chain_round_number: u64,
    /// Miner list reported alongside the latest main-chain round.
    main_chain_miners: Vec<Pubkey>,
}

/// Round storage and chain-level bookkeeping.
pub struct RoundStore {
    inner: RwLock<StoreInner>,
}

impl RoundStore {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(StoreInner::default()),
        }
    }

    /// Seed the store with the first round of the chain. The first slot's
    /// expected time doubles as the blockchain start time.
    pub fn initialize(&self, first_round: Round, start_time: Timestamp) {
        let mut inner = self.inner.write();
        inner.blockchain_start_time = Some(start_time);
        inner
            .term_history
            .push((first_round.term_number, first_round.round_number));
        inner.current_round_number = Some(first_round.round_number);
        inner.rounds.insert(first_round.round_number, first_round);
    }

    pub fn is_initialized(&self) -> bool {
        self.inner.read().current_round_number.is_some()
    }

    pub fn blockchain_start_time(&self) -> ConsensusResult<Timestamp> {
        self.inner
            .read()
            .blockchain_start_time
            .ok_or(ConsensusError::NoCurrentRound)
    }

    pub fn current_round(&self) -> ConsensusResult<Round> {
        let inner = self.inner.read();
        let number = inner.current_round_number.ok_or(ConsensusError::NoCurrentRound)?;
        inner
            .rounds
            .get(&number)
            .cloned()
            .ok_or(ConsensusError::UnknownRound { round_number: number })
    }

    /// The round preceding the current one, while still retained.
    pub fn previous_round(&self) -> Option<Round> {
        let inner = self.inner.read();
        let number = inner.current_round_number?;
        inner.rounds.get(&number.checked_sub(1)?).cloned()
    }

    pub fn round(&self, round_number: u64) -> ConsensusResult<Round> {
        self.inner
            .read()
            .rounds
            .get(&round_number)
            .cloned()
            .ok_or(ConsensusError::UnknownRound { round_number })
    }

    /// Replace the current round in place after an in-round update.
    pub fn update_current_round(&self, round: Round) -> ConsensusResult<()> {
        let mut inner = self.inner.write();
        let number = inner.current_round_number.ok_or(ConsensusError::NoCurrentRound)?;
        if round.round_number != number {
            return Err(ConsensusError::WrongRoundNumber {
                expected: number,
                actual: round.round_number,
            });
        }
        inner.rounds.insert(number, round);
        Ok(())
    }

    /// Commit a freshly terminated round, advance the current pointer and
    /// drop anything outside the retention window.
    pub fn commit_round(&self, round: Round) {
        let mut inner = self.inner.write();
        let number = round.round_number;
        if inner
            .term_history
            .last()
            .map(|(term, _)| *term < round.term_number)
            .unwrap_or(true)
        {
            inner.term_history.push((round.term_number, number));
        }
        inner.rounds.insert(number, round);
        inner.current_round_number = Some(number);
        while inner.rounds.len() > ROUND_RETENTION {
            let oldest = *inner.rounds.keys().next().unwrap();
            inner.rounds.remove(&oldest);
        }
    }

    pub fn ban(&self, pubkey: Pubkey) {
        self.inner.write().banned.insert(pubkey);
    }

    /// Lift a ban, making the miner eligible for future rounds again.
    pub fn unban(&self, pubkey: &Pubkey) {
        self.inner.write().banned.remove(pubkey);
    }

    pub fn banned(&self) -> BTreeSet<Pubkey> {
        self.inner.read().banned.clone()
    }

    /// First round number of `term_number`, if recorded.
    pub fn first_round_of_term(&self, term_number: u64) -> Option<u64> {
        self.inner
            .read()
            .term_history
            .iter()
            .find(|(term, _)| *term == term_number)
            .map(|(_, round)| *round)
    }

    pub fn main_chain_round_number(&self) -> u64 {
        self.inner.read().main_chain_round_number
    }

    pub fn main_chain_miners(&self) -> Vec<Pubkey> {
        self.inner.read().main_chain_miners.clone()
    }

    /// Record a main-chain round reported over cross-chain
    /// communication. Must move strictly forward and by a bounded jump.
    pub fn update_main_chain_round(
        &self,
        provided: u64,
        miners: Vec<Pubkey>,
        config: &ConsensusConfig,
    ) -> ConsensusResult<()> {
        let mut inner = self.inner.write();
        let stored = inner.main_chain_round_number;
        if provided <= stored {
            return Err(ConsensusError::MainChainRoundNotMonotonic { stored, provided });
        }
        let max_jump = config.maximum_main_chain_round_jump;
        if provided - stored > max_jump && stored != 0 {
            return Err(ConsensusError::MainChainRoundJumpTooLarge {
                stored,
                provided,
                max_jump,
            });
        }
        inner.main_chain_round_number = provided;
        inner.main_chain_miners = miners;
        Ok(())
    }
}

impl Default for RoundStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::generate_first_round;

    fn key(tag: u8) -> Pubkey {
        Pubkey::parse(&format!("{tag:02x}")).unwrap()
    }

    fn seeded_store() -> RoundStore {
        let store = RoundStore::new();
        let miners = vec![key(1), key(2), key(3)];
        let round = generate_first_round(
            &miners,
            Timestamp::from_millis(1_000),
            &ConsensusConfig::default(),
        )
        .unwrap();
        store.initialize(round, Timestamp::from_millis(1_000));
        store
    }

    #[test]
    fn test_uninitialized_store_has_no_round() {
        let store = RoundStore::new();
        assert!(!store.is_initialized());
        assert!(matches!(
            store.current_round(),
            Err(ConsensusError::NoCurrentRound)
        ));
    }

    #[test]
    fn test_retention_window_keeps_two_rounds() {
        let store = seeded_store();
        for n in 2..=5u64 {
            let mut next = store.current_round().unwrap();
            next.round_number = n;
            store.commit_round(next);
        }
        assert_eq!(store.current_round().unwrap().round_number, 5);
        assert_eq!(store.previous_round().unwrap().round_number, 4);
        assert!(matches!(
            store.round(3),
            Err(ConsensusError::UnknownRound { round_number: 3 })
        ));
    }

    #[test]
    fn test_update_current_round_checks_number() {
        let store = seeded_store();
        let mut stale = store.current_round().unwrap();
        stale.round_number = 9;
        assert!(matches!(
            store.update_current_round(stale),
            Err(ConsensusError::WrongRoundNumber { expected: 1, actual: 9 })
        ));
    }

    #[test]
    fn test_term_history_records_first_round_of_term() {
        let store = seeded_store();
        let mut next = store.current_round().unwrap();
        next.round_number = 2;
        next.term_number = 2;
        store.commit_round(next);
        let mut after = store.current_round().unwrap();
        after.round_number = 3;
        store.commit_round(after);

        assert_eq!(store.first_round_of_term(1), Some(1));
        assert_eq!(store.first_round_of_term(2), Some(2));
        assert_eq!(store.first_round_of_term(3), None);
    }

    #[test]
    fn test_ban_is_reversible() {
        let store = seeded_store();
        store.ban(key(2));
        assert!(store.banned().contains(&key(2)));
        store.unban(&key(2));
        assert!(store.banned().is_empty());
    }

    #[test]
    fn test_main_chain_round_must_advance() {
        let store = seeded_store();
        let config = ConsensusConfig::default();
        store.update_main_chain_round(10, vec![key(1)], &config).unwrap();
        assert!(matches!(
            store.update_main_chain_round(10, vec![key(1)], &config),
            Err(ConsensusError::MainChainRoundNotMonotonic { stored: 10, provided: 10 })
        ));
        assert!(matches!(
            store.update_main_chain_round(10_000, vec![key(1)], &config),
            Err(ConsensusError::MainChainRoundJumpTooLarge { .. })
        ));
        store
            .update_main_chain_round(11, vec![key(1), key(2)], &config)
            .unwrap();
        assert_eq!(store.main_chain_round_number(), 11);
        assert_eq!(store.main_chain_miners(), vec![key(1), key(2)]);
    }
}
