//! Randomness revealer: reconstructs prior-round commitment preimages
//! from threshold secret shares.
//!
//! A reconstructed value is never passed off as a miner's own reveal; it
//! is tagged `Recovered` so downstream consumers can distinguish a
//! genuine reveal from a quorum-assisted one.

use crate::config::ConsensusConfig;
use crate::domain::error::{ConsensusError, ConsensusResult};
use crate::domain::round::Round;
use shared_crypto::{decode_secret, default_threshold, keccak256, reconstruction_cost_micros};
use shared_types::{Hash, Pubkey, HASH_LENGTH};
use std::collections::BTreeMap;

/// A revealed in-value with its provenance.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RevealedInValue {
    /// The miner revealed its own preimage.
    Genuine(Hash),
    /// Reconstructed from other miners' shares after the owner went
    /// silent; usable for randomness, not as the owner's reveal.
    Recovered(Hash),
}

impl RevealedInValue {
    /// The underlying value regardless of provenance.
    pub fn value(&self) -> Hash {
        match self {
            Self::Genuine(v) | Self::Recovered(v) => *v,
        }
    }
}

/// Verify the worst-case reconstruction cost for `miners_count`
/// producers fits the per-block budget.
///
/// Round-terminating transitions call this before any reconstruction is
/// attempted; exceeding the budget must reject the transition rather
/// than overrun the mining window.
pub fn check_reconstruction_budget(
    miners_count: usize,
    config: &ConsensusConfig,
) -> ConsensusResult<()> {
    let cost_micros = reconstruction_cost_micros(default_threshold(miners_count))
        .saturating_mul(miners_count as u64);
    let budget_micros = config.reconstruction_budget_ms.saturating_mul(1000);
    if cost_micros > budget_micros {
        return Err(ConsensusError::ReconstructionOverBudget {
            cost_micros,
            budget_micros,
        });
    }
    Ok(())
}

/// Reveal the previous round's in-values for every miner possible.
///
/// Miners whose own reveal is present in `current` yield `Genuine`
/// values. For silent miners, `shares` (evaluation point, share bytes)
/// collected from the other producers are interpolated; a reconstruction
/// is accepted only if it hashes back to the silent miner's stored
/// commitment, otherwise that miner is skipped.
pub fn reveal_in_values(
    current: &Round,
    previous: &Round,
    shares: &BTreeMap<Pubkey, Vec<(u64, Vec<u8>)>>,
    config: &ConsensusConfig,
) -> ConsensusResult<BTreeMap<Pubkey, RevealedInValue>> {
    check_reconstruction_budget(previous.miners_count(), config)?;
    let threshold = default_threshold(previous.miners_count());

    let mut revealed = BTreeMap::new();
    for (pubkey, prev_miner) in &previous.miners {
        let Some(commitment) = prev_miner.out_value else {
            continue;
        };

        if let Some(reveal) = current.miner(pubkey).and_then(|m| m.previous_in_value) {
            if keccak256(&reveal) == commitment {
                revealed.insert(pubkey.clone(), RevealedInValue::Genuine(reveal));
            }
            continue;
        }

        let Some(miner_shares) = shares.get(pubkey) else {
            continue;
        };
        let Ok(bytes) = decode_secret(miner_shares, threshold, HASH_LENGTH) else {
            continue;
        };
        if bytes.len() != HASH_LENGTH {
            continue;
        }
        let mut candidate = [0u8; HASH_LENGTH];
        candidate.copy_from_slice(&bytes);
        if keccak256(&candidate) == commitment {
            revealed.insert(pubkey.clone(), RevealedInValue::Recovered(candidate));
        }
    }
    Ok(revealed)
}
