//! # Consensus Metrics
//!
//! Prometheus metrics for monitoring consensus progress.
//!
//! ## Usage
//!
//! Enable with the `metrics` feature:
//! ```toml
//! oc-consensus = { path = "...", features = ["metrics"] }
//! ```
//!
//! ## Metrics Exported
//!
//! - `consensus_proposals_accepted_total` - Counter of proposals that passed validation
//! - `consensus_proposals_rejected_total` - Counter of rejected proposals (by reason)
//! - `consensus_rounds_generated_total` - Counter of round transitions
//! - `consensus_terms_changed_total` - Counter of term transitions
//! - `consensus_secrets_reconstructed_total` - Counter of in-values recovered from shares
//! - `consensus_irreversible_height` - Gauge of the confirmed irreversible height

#[cfg(feature = "metrics")]
use lazy_static::lazy_static;

#[cfg(feature = "metrics")]
use prometheus::{
    register_counter_vec, register_int_counter, register_int_gauge, CounterVec, IntCounter,
    IntGauge,
};

#[cfg(feature = "metrics")]
lazy_static! {
    /// Proposals that passed the full validation pipeline
    pub static ref PROPOSALS_ACCEPTED: IntCounter = register_int_counter!(
        "consensus_proposals_accepted_total",
        "Total number of proposals that passed validation"
    )
    .expect("Failed to create PROPOSALS_ACCEPTED metric");

    /// Rejected proposals, labeled by rejection reason
    pub static ref PROPOSALS_REJECTED: CounterVec = register_counter_vec!(
        "consensus_proposals_rejected_total",
        "Total number of proposals rejected",
        &["reason"]
    )
    .expect("Failed to create PROPOSALS_REJECTED metric");

    /// Round transitions applied
    pub static ref ROUNDS_GENERATED: IntCounter = register_int_counter!(
        "consensus_rounds_generated_total",
        "Total number of round transitions"
    )
    .expect("Failed to create ROUNDS_GENERATED metric");

    /// Term transitions applied
    pub static ref TERMS_CHANGED: IntCounter = register_int_counter!(
        "consensus_terms_changed_total",
        "Total number of term transitions"
    )
    .expect("Failed to create TERMS_CHANGED metric");

    /// In-values recovered from secret shares on behalf of silent miners
    pub static ref SECRETS_RECONSTRUCTED: IntCounter = register_int_counter!(
        "consensus_secrets_reconstructed_total",
        "Total number of in-values reconstructed from shares"
    )
    .expect("Failed to create SECRETS_RECONSTRUCTED metric");

    /// Confirmed irreversible block height
    pub static ref IRREVERSIBLE_HEIGHT: IntGauge = register_int_gauge!(
        "consensus_irreversible_height",
        "Confirmed irreversible block height"
    )
    .expect("Failed to create IRREVERSIBLE_HEIGHT metric");
}

/// Record a proposal that passed validation
#[cfg(feature = "metrics")]
pub fn record_proposal_accepted() {
    PROPOSALS_ACCEPTED.inc();
}

/// Record a rejected proposal with reason
#[cfg(feature = "metrics")]
pub fn record_proposal_rejected(reason: &str) {
    PROPOSALS_REJECTED.with_label_values(&[reason]).inc();
}

/// Record a round transition
#[cfg(feature = "metrics")]
pub fn record_round_generated() {
    ROUNDS_GENERATED.inc();
}

/// Record a term transition
#[cfg(feature = "metrics")]
pub fn record_term_changed() {
    TERMS_CHANGED.inc();
}

/// Record a reconstructed in-value
#[cfg(feature = "metrics")]
pub fn record_secret_reconstructed() {
    SECRETS_RECONSTRUCTED.inc();
}

/// Record the confirmed irreversible height
#[cfg(feature = "metrics")]
pub fn record_irreversible_height(height: u64) {
    IRREVERSIBLE_HEIGHT.set(height as i64);
}

// No-op implementations when metrics feature is disabled
#[cfg(not(feature = "metrics"))]
pub fn record_proposal_accepted() {}

#[cfg(not(feature = "metrics"))]
pub fn record_proposal_rejected(_reason: &str) {}

#[cfg(not(feature = "metrics"))]
pub fn record_round_generated() {}

#[cfg(not(feature = "metrics"))]
pub fn record_term_changed() {}

#[cfg(not(feature = "metrics"))]
pub fn record_secret_reconstructed() {}

#[cfg(not(feature = "metrics"))]
pub fn record_irreversible_height(_height: u64) {}
