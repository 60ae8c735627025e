//! Consensus Service - core business logic
//!
//! Wires the pure domain functions to the round store and the outbound
//! ports. One instance serves a single chain: the node asks it what to
//! mine (`get_consensus_command`), obtains the block payload
//! (`get_consensus_extra_data`), validates peers' payloads, and applies
//! the accepted one (`process`, the only state-mutating entry point).

use crate::config::ConsensusConfig;
use crate::domain::{
    arrange_extra_block_time, arrange_normal_time, calculate_lib, filter_backup_candidates,
    find_evil_miners, generate_first_round, generate_next_round, generate_next_term,
    get_behaviour, order_from_signature, reconcile_final_orders, replace_miner, reveal_in_values,
    ConsensusBehaviour, ConsensusCommand, ConsensusError, ConsensusResult, RevealedInValue,
    Round, RoundProposal, TriggerInformation,
};
use crate::events::{
    ConsensusEvent, IrreversibleBlockFoundEvent, MinerListChangedEvent,
    MinerReplacedEvent, MiningInformationUpdatedEvent,
};
use crate::metrics;
use crate::ports::{ConsensusApi, ElectionProvider, EventBus, SystemTimeSource, TimeSource};
use crate::state::RoundStore;
use crate::validation::{validate_committed_round, validate_proposal, ValidationContext};
use async_trait::async_trait;
use shared_crypto::keccak256;
use shared_types::{Hash, Pubkey, Timestamp};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Consensus service over a round store and outbound collaborators.
pub struct ConsensusService<E, L>
where
    E: EventBus,
    L: ElectionProvider,
{
    event_bus: Arc<E>,
    election: Arc<L>,
    store: Arc<RoundStore>,
    config: ConsensusConfig,
    time_source: Box<dyn TimeSource>,
}

/// Dependencies for ConsensusService
pub struct ConsensusDependencies<E, L> {
    pub event_bus: Arc<E>,
    pub election: Arc<L>,
    pub config: ConsensusConfig,
}

impl<E, L> ConsensusService<E, L>
where
    E: EventBus,
    L: ElectionProvider,
{
    pub fn new(deps: ConsensusDependencies<E, L>) -> ConsensusResult<Self> {
        deps.config.validate()?;
        Ok(Self {
            event_bus: deps.event_bus,
            election: deps.election,
            store: Arc::new(RoundStore::new()),
            config: deps.config,
            time_source: Box::new(SystemTimeSource),
        })
    }

    /// Set custom time source (for testing)
    pub fn with_time_source(mut self, time_source: Box<dyn TimeSource>) -> Self {
        self.time_source = time_source;
        self
    }

    pub fn store(&self) -> &RoundStore {
        &self.store
    }

    /// Seed the chain with its first round. The schedule anchors at the
    /// injected clock's current time.
    pub async fn initialize(&self, miners: &[Pubkey]) -> ConsensusResult<()> {
        let start_time = self.time_source.now();
        let first = generate_first_round(miners, start_time, &self.config)?;
        info!(
            miners = miners.len(),
            start_millis = start_time.as_millis(),
            "initializing first round"
        );
        self.store.initialize(first, start_time);
        self.publish(ConsensusEvent::MinerListChanged(MinerListChangedEvent {
            term_number: 1,
            miners: miners.to_vec(),
        }))
        .await
    }

    /// Reveal previous-round in-values from collected secret shares,
    /// recovering silent miners' preimages where enough shares exist.
    pub fn reveal_previous_in_values(
        &self,
        shares: &BTreeMap<Pubkey, Vec<(u64, Vec<u8>)>>,
    ) -> ConsensusResult<BTreeMap<Pubkey, RevealedInValue>> {
        let current = self.store.current_round()?;
        let previous = self.store.previous_round().ok_or(ConsensusError::UnknownRound {
            round_number: current.round_number.saturating_sub(1),
        })?;
        let revealed = reveal_in_values(&current, &previous, shares, &self.config)?;
        for value in revealed.values() {
            if matches!(value, RevealedInValue::Recovered(_)) {
                metrics::record_secret_reconstructed();
            }
        }
        Ok(revealed)
    }

    async fn publish(&self, event: ConsensusEvent) -> ConsensusResult<()> {
        self.event_bus
            .publish(event)
            .await
            .map_err(ConsensusError::EventBusError)
    }

    /// Fetch and filter the election winners for a term transition.
    async fn elected_miners(&self) -> ConsensusResult<Vec<Pubkey>> {
        let victories = self
            .election
            .get_victories(self.config.maximum_miners_count)
            .await
            .map_err(ConsensusError::ElectionError)?;
        let banned = self.store.banned();
        let miners: Vec<Pubkey> = victories
            .into_iter()
            .filter(|pk| !banned.contains(pk))
            .collect();
        if miners.is_empty() {
            return Err(ConsensusError::EmptyMinerList);
        }
        Ok(miners)
    }

    /// Swap out miners that crossed the missed-slot tolerance, when the
    /// election authority can provide backups. Without backups the evil
    /// miner keeps its seat; banning happens at processing time.
    async fn apply_evil_miner_replacement(&self, next: &mut Round) -> ConsensusResult<()> {
        let evil = find_evil_miners(next, self.config.tolerable_missed_time_slots);
        if evil.is_empty() {
            return Ok(());
        }
        let candidates = self
            .election
            .get_backup_candidates(evil.len())
            .await
            .map_err(ConsensusError::ElectionError)?;
        let banned = self.store.banned();
        let backups = filter_backup_candidates(&candidates, next, &banned);
        for (evil_pk, backup) in evil.iter().zip(backups.iter()) {
            warn!(evil = %evil_pk, backup = %backup, "replacing evil miner");
            replace_miner(next, evil_pk, backup)?;
        }
        Ok(())
    }

    /// Build the round payload for an in-round block: the sender's fresh
    /// commitment, signature, optional reveal, and any LIB advance the
    /// new implied heights support.
    fn build_update_value_round(
        &self,
        current: &Round,
        trigger: &TriggerInformation,
        block_time: Timestamp,
    ) -> ConsensusResult<Round> {
        let in_value = trigger
            .in_value
            .ok_or_else(|| ConsensusError::CommitmentMissing(trigger.pubkey.clone()))?;
        let previous = self.store.previous_round();
        // Round 1 has no predecessor; the current round's fallback
        // material anchors the signature instead.
        let signature_source = previous.as_ref().unwrap_or(current);
        let signature: Hash = signature_source.calculate_signature(&in_value);
        let supposed = order_from_signature(&signature, current.miners_count());

        let mut proposed = current.clone();
        {
            let miner = proposed
                .miners
                .get_mut(&trigger.pubkey)
                .ok_or_else(|| ConsensusError::NotAMiner(trigger.pubkey.clone()))?;
            miner.in_value = Some(in_value);
            miner.out_value = Some(keccak256(&in_value));
            miner.signature = Some(signature);
            miner.previous_in_value = trigger.previous_in_value;
            miner.supposed_order_of_next_round = supposed;
            miner.final_order_of_next_round = supposed;
            if let Some(height) = trigger.implied_irreversible_block_height {
                // Never lowered; the validator rejects regressions anyway.
                miner.implied_irreversible_block_height =
                    miner.implied_irreversible_block_height.max(height);
            }
            miner.record_block(block_time);
        }
        if let Some(previous) = previous.as_ref() {
            if let Some(lib) = calculate_lib(&proposed, previous) {
                proposed.confirmed_irreversible_block_height = lib.height;
                proposed.confirmed_irreversible_block_round_number = lib.round_number;
            }
        }
        Ok(proposed)
    }

    async fn validation_context_parts(
        &self,
        behaviour: ConsensusBehaviour,
    ) -> ConsensusResult<(Round, Option<Round>, Option<Vec<Pubkey>>)> {
        let base = self.store.current_round()?;
        let previous = self.store.previous_round();
        let expected_miners = if behaviour == ConsensusBehaviour::NextTerm {
            Some(self.elected_miners().await?)
        } else {
            None
        };
        Ok((base, previous, expected_miners))
    }

    async fn run_validation(&self, proposal: &RoundProposal) -> ConsensusResult<()> {
        let (base, previous, expected_miners) =
            self.validation_context_parts(proposal.behaviour).await?;
        let banned = self.store.banned();
        let result = validate_proposal(&ValidationContext {
            base_round: &base,
            previous_round: previous.as_ref(),
            proposal,
            expected_miners: expected_miners.as_deref(),
            banned: &banned,
            config: &self.config,
        });
        match &result {
            Ok(()) => metrics::record_proposal_accepted(),
            Err(reason) => {
                metrics::record_proposal_rejected(reason.label());
                if reason.is_rejection() {
                    debug!(sender = %proposal.sender_pubkey, %reason, "proposal rejected");
                } else {
                    warn!(sender = %proposal.sender_pubkey, %reason, "transition aborted");
                }
            }
        }
        result
    }

    async fn publish_replacements(&self, base: &Round, committed: &Round) -> ConsensusResult<()> {
        if !committed.is_miner_list_just_changed {
            return Ok(());
        }
        for (pubkey, miner) in &base.miners {
            if committed.miners.contains_key(pubkey) {
                continue;
            }
            // The replacement inherits the removed miner's order.
            let Some(backup) = committed.miner_at_order(miner.order) else {
                continue;
            };
            self.store.ban(pubkey.clone());
            self.publish(ConsensusEvent::MinerReplaced(MinerReplacedEvent {
                evil_miner: pubkey.clone(),
                backup: backup.pubkey.clone(),
                round_number: committed.round_number,
            }))
            .await?;
        }
        Ok(())
    }
}

#[async_trait]
impl<E, L> ConsensusApi for ConsensusService<E, L>
where
    E: EventBus,
    L: ElectionProvider,
{
    async fn get_consensus_command(
        &self,
        pubkey: Pubkey,
        block_time: Timestamp,
    ) -> ConsensusResult<ConsensusCommand> {
        let round = self.store.current_round()?;
        let start = self.store.blockchain_start_time()?;
        let behaviour = get_behaviour(&round, &pubkey, block_time, start, &self.config);
        let interval = self.config.mining_interval_ms;
        let (arranged_mining_time, limit_millis) = match behaviour {
            ConsensusBehaviour::UpdateValue => (
                arrange_normal_time(&round, &pubkey, block_time, interval),
                interval,
            ),
            ConsensusBehaviour::TinyBlock => {
                // A tiny block granted for the pre-round-start bonus
                // window must fire inside that window, not at the
                // sender's regular slot.
                let in_bonus_window = round.extra_block_producer_of_previous_round == pubkey
                    && round
                        .round_start_time(interval)
                        .is_some_and(|round_start| block_time < round_start);
                let arranged = if in_bonus_window {
                    block_time
                } else {
                    arrange_normal_time(&round, &pubkey, block_time, interval)
                };
                (arranged, interval)
            }
            ConsensusBehaviour::NextRound | ConsensusBehaviour::NextTerm => (
                arrange_extra_block_time(&round, block_time, interval),
                interval,
            ),
            ConsensusBehaviour::Nothing => (block_time, 0),
        };
        debug!(%pubkey, %behaviour, arranged = arranged_mining_time.as_millis(), "command");
        Ok(ConsensusCommand {
            behaviour,
            arranged_mining_time,
            limit_millis,
        })
    }

    async fn get_consensus_extra_data(
        &self,
        trigger: TriggerInformation,
        block_time: Timestamp,
    ) -> ConsensusResult<RoundProposal> {
        let current = self.store.current_round()?;
        let round = match trigger.behaviour {
            ConsensusBehaviour::UpdateValue => {
                self.build_update_value_round(&current, &trigger, block_time)?
            }
            ConsensusBehaviour::TinyBlock => {
                let mut proposed = current.clone();
                let miner = proposed
                    .miners
                    .get_mut(&trigger.pubkey)
                    .ok_or_else(|| ConsensusError::NotAMiner(trigger.pubkey.clone()))?;
                miner.produced_tiny_blocks += 1;
                miner.record_block(block_time);
                proposed
            }
            ConsensusBehaviour::NextRound => {
                let mut next =
                    generate_next_round(&current, &trigger.pubkey, block_time, &self.config)?;
                self.apply_evil_miner_replacement(&mut next).await?;
                next
            }
            ConsensusBehaviour::NextTerm => {
                let miners = self.elected_miners().await?;
                generate_next_term(&current, &trigger.pubkey, block_time, &miners, &self.config)?
            }
            ConsensusBehaviour::Nothing => {
                return Err(ConsensusError::UnproposableBehaviour("Nothing"))
            }
        };
        Ok(RoundProposal {
            sender_pubkey: trigger.pubkey,
            behaviour: trigger.behaviour,
            round,
            block_time,
        })
    }

    async fn validate_before_execution(&self, proposal: &RoundProposal) -> ConsensusResult<()> {
        self.run_validation(proposal).await
    }

    async fn validate_after_execution(&self, proposal: &RoundProposal) -> ConsensusResult<()> {
        let committed = self.store.round(proposal.round.round_number)?;
        validate_committed_round(&committed, &proposal.round)
    }

    async fn process(&self, proposal: RoundProposal) -> ConsensusResult<()> {
        self.run_validation(&proposal).await?;
        let base = self.store.current_round()?;

        match proposal.behaviour {
            ConsensusBehaviour::UpdateValue | ConsensusBehaviour::TinyBlock => {
                let lib_advanced = proposal.round.confirmed_irreversible_block_height
                    > base.confirmed_irreversible_block_height;
                self.store.update_current_round(proposal.round.clone())?;
                if lib_advanced {
                    let height = proposal.round.confirmed_irreversible_block_height;
                    info!(height, "irreversible block found");
                    metrics::record_irreversible_height(height);
                    self.publish(ConsensusEvent::IrreversibleBlockFound(
                        IrreversibleBlockFoundEvent {
                            height,
                            round_number: proposal.round.confirmed_irreversible_block_round_number,
                        },
                    ))
                    .await?;
                }
            }
            ConsensusBehaviour::NextRound | ConsensusBehaviour::NextTerm => {
                // Single end-of-round reconciliation: fix the final orders
                // in the terminating round before it becomes history.
                let mut terminated = base.clone();
                reconcile_final_orders(&mut terminated)?;
                self.store.update_current_round(terminated)?;

                self.store.commit_round(proposal.round.clone());
                if proposal.behaviour == ConsensusBehaviour::NextTerm {
                    metrics::record_term_changed();
                    info!(
                        term = proposal.round.term_number,
                        round = proposal.round.round_number,
                        "term changed"
                    );
                    self.publish(ConsensusEvent::MinerListChanged(MinerListChangedEvent {
                        term_number: proposal.round.term_number,
                        miners: proposal.round.miners.keys().cloned().collect(),
                    }))
                    .await?;
                } else {
                    metrics::record_round_generated();
                    self.publish_replacements(&base, &proposal.round).await?;
                }
            }
            ConsensusBehaviour::Nothing => {
                return Err(ConsensusError::UnproposableBehaviour("Nothing"))
            }
        }

        self.publish(ConsensusEvent::MiningInformationUpdated(
            MiningInformationUpdatedEvent {
                pubkey: proposal.sender_pubkey.clone(),
                behaviour: proposal.behaviour,
                round_number: proposal.round.round_number,
                block_time: proposal.block_time,
            },
        ))
        .await
    }

    async fn record_main_chain_round(
        &self,
        round_number: u64,
        miners: Vec<Pubkey>,
    ) -> ConsensusResult<()> {
        self.store
            .update_main_chain_round(round_number, miners, &self.config)?;
        debug!(round_number, "main-chain round recorded");
        Ok(())
    }

    async fn current_behaviour(
        &self,
        pubkey: Pubkey,
        block_time: Timestamp,
    ) -> ConsensusResult<ConsensusBehaviour> {
        let round = self.store.current_round()?;
        let start = self.store.blockchain_start_time()?;
        Ok(get_behaviour(&round, &pubkey, block_time, start, &self.config))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::InMemoryEventBus;

    fn key(tag: u8) -> Pubkey {
        Pubkey::parse(&format!("{tag:02x}")).unwrap()
    }

    struct FixedElection {
        victories: Vec<Pubkey>,
        backups: Vec<Pubkey>,
    }

    #[async_trait]
    impl ElectionProvider for FixedElection {
        async fn get_victories(&self, count: usize) -> Result<Vec<Pubkey>, String> {
            Ok(self.victories.iter().take(count).cloned().collect())
        }

        async fn get_backup_candidates(&self, count: usize) -> Result<Vec<Pubkey>, String> {
            Ok(self.backups.iter().take(count).cloned().collect())
        }
    }

    struct FixedTime(Timestamp);

    impl TimeSource for FixedTime {
        fn now(&self) -> Timestamp {
            self.0
        }
    }

    fn miners() -> Vec<Pubkey> {
        vec![key(1), key(2), key(3)]
    }

    fn service(
        victories: Vec<Pubkey>,
    ) -> (
        ConsensusService<InMemoryEventBus, FixedElection>,
        Arc<InMemoryEventBus>,
    ) {
        let bus = Arc::new(InMemoryEventBus::new());
        let election = Arc::new(FixedElection {
            victories,
            backups: vec![key(10), key(11)],
        });
        let svc = ConsensusService::new(ConsensusDependencies {
            event_bus: bus.clone(),
            election,
            config: ConsensusConfig::default(),
        })
        .unwrap()
        .with_time_source(Box::new(FixedTime(Timestamp::from_millis(0))));
        (svc, bus)
    }

    async fn submit(
        svc: &ConsensusService<InMemoryEventBus, FixedElection>,
        pubkey: Pubkey,
        behaviour: ConsensusBehaviour,
        in_value: Option<Hash>,
        block_time: Timestamp,
    ) -> ConsensusResult<RoundProposal> {
        let proposal = svc
            .get_consensus_extra_data(
                TriggerInformation {
                    pubkey,
                    behaviour,
                    in_value,
                    previous_in_value: None,
                    implied_irreversible_block_height: None,
                },
                block_time,
            )
            .await?;
        svc.validate_before_execution(&proposal).await?;
        svc.process(proposal.clone()).await?;
        svc.validate_after_execution(&proposal).await?;
        Ok(proposal)
    }

    #[tokio::test]
    async fn test_initialize_publishes_miner_list() {
        let (svc, bus) = service(miners());
        svc.initialize(&miners()).await.unwrap();
        assert!(svc.store().is_initialized());
        let events = bus.get_events();
        assert!(matches!(
            &events[0],
            ConsensusEvent::MinerListChanged(e) if e.term_number == 1 && e.miners.len() == 3
        ));
    }

    #[tokio::test]
    async fn test_full_round_lifecycle() {
        let (svc, _bus) = service(miners());
        svc.initialize(&miners()).await.unwrap();

        let round = svc.store().current_round().unwrap();
        assert_eq!(round.round_number, 1);

        // Each miner produces its primary block in slot order.
        for pubkey in round.miners.keys() {
            let miner = &round.miners[pubkey];
            let slot = miner.expected_mining_time.unwrap();
            let command = svc.get_consensus_command(pubkey.clone(), slot).await.unwrap();
            assert_eq!(command.behaviour, ConsensusBehaviour::UpdateValue);
            assert_eq!(command.arranged_mining_time, slot);

            submit(
                &svc,
                pubkey.clone(),
                ConsensusBehaviour::UpdateValue,
                Some(rand::random::<[u8; 32]>()),
                slot,
            )
            .await
            .unwrap();
        }

        let produced = svc.store().current_round().unwrap();
        assert_eq!(produced.produced_count(), 3);

        // The designated extra producer terminates at the extra slot.
        let terminator = produced.extra_block_producer().unwrap().pubkey.clone();
        let extra_time = produced
            .extra_block_mining_time(ConsensusConfig::default().mining_interval_ms)
            .unwrap();
        let command = svc
            .get_consensus_command(terminator.clone(), extra_time)
            .await
            .unwrap();
        assert_eq!(command.behaviour, ConsensusBehaviour::NextRound);

        submit(
            &svc,
            terminator,
            ConsensusBehaviour::NextRound,
            None,
            extra_time,
        )
        .await
        .unwrap();

        let next = svc.store().current_round().unwrap();
        assert_eq!(next.round_number, 2);
        assert_eq!(next.term_number, 1);
        // Orders are a permutation of 1..=3.
        let mut orders: Vec<u32> = next.miners.values().map(|m| m.order).collect();
        orders.sort_unstable();
        assert_eq!(orders, vec![1, 2, 3]);
        // Previous round kept its reconciled final orders.
        let previous = svc.store().previous_round().unwrap();
        let mut finals: Vec<u32> = previous
            .miners
            .values()
            .map(|m| m.final_order_of_next_round)
            .collect();
        finals.sort_unstable();
        finals.dedup();
        assert_eq!(finals.len(), 3);
    }

    #[tokio::test]
    async fn test_unauthorized_terminator_rejected() {
        let (svc, _bus) = service(miners());
        svc.initialize(&miners()).await.unwrap();
        let round = svc.store().current_round().unwrap();
        for pubkey in round.miners.keys() {
            let slot = round.miners[pubkey].expected_mining_time.unwrap();
            submit(
                &svc,
                pubkey.clone(),
                ConsensusBehaviour::UpdateValue,
                Some([round.miners[pubkey].order as u8; 32]),
                slot,
            )
            .await
            .unwrap();
        }
        let produced = svc.store().current_round().unwrap();
        let terminator = produced.extra_block_producer().unwrap().pubkey.clone();
        let outsider = produced
            .miners
            .keys()
            .find(|pk| **pk != terminator)
            .unwrap()
            .clone();
        let extra_time = produced
            .extra_block_mining_time(ConsensusConfig::default().mining_interval_ms)
            .unwrap();
        let result = submit(
            &svc,
            outsider,
            ConsensusBehaviour::NextRound,
            None,
            extra_time,
        )
        .await;
        assert!(matches!(
            result,
            Err(ConsensusError::UnauthorizedRoundTerminator(_))
        ));
        assert_eq!(svc.store().current_round().unwrap().round_number, 1);
    }

    #[tokio::test]
    async fn test_bonus_window_tiny_block_fires_immediately() {
        use crate::domain::MinerInRound;

        let (svc, _bus) = service(miners());
        svc.initialize(&miners()).await.unwrap();

        // Round 2: key(1) terminated round 1 and produced its primary
        // block during the bonus window; slots open at 36s, round start
        // is 32s.
        let mut round = Round {
            round_number: 2,
            term_number: 1,
            extra_block_producer_of_previous_round: key(1),
            ..Default::default()
        };
        for order in 1..=3u32 {
            let pubkey = key(order as u8);
            round.miners.insert(
                pubkey.clone(),
                MinerInRound::new(
                    pubkey,
                    order,
                    Timestamp::from_millis(32_000 + order as i64 * 4000),
                ),
            );
        }
        {
            let boot = round.miners.get_mut(&key(1)).unwrap();
            boot.out_value = Some([5u8; 32]);
            boot.signature = Some([6u8; 32]);
        }
        svc.store().commit_round(round);

        let now = Timestamp::from_millis(30_000);
        let command = svc.get_consensus_command(key(1), now).await.unwrap();
        assert_eq!(command.behaviour, ConsensusBehaviour::TinyBlock);
        assert_eq!(command.arranged_mining_time, now);
    }

    #[tokio::test]
    async fn test_nothing_command_for_stranger() {
        let (svc, _bus) = service(miners());
        svc.initialize(&miners()).await.unwrap();
        let command = svc
            .get_consensus_command(key(42), Timestamp::from_millis(4000))
            .await
            .unwrap();
        assert_eq!(command.behaviour, ConsensusBehaviour::Nothing);
        assert_eq!(command.limit_millis, 0);
    }

    #[tokio::test]
    async fn test_main_chain_round_bookkeeping() {
        let (svc, _bus) = service(miners());
        svc.initialize(&miners()).await.unwrap();
        svc.record_main_chain_round(5, miners()).await.unwrap();
        assert!(matches!(
            svc.record_main_chain_round(4, miners()).await,
            Err(ConsensusError::MainChainRoundNotMonotonic { .. })
        ));
        assert_eq!(svc.store().main_chain_round_number(), 5);
    }
}
