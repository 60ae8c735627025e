//! # oc-consensus
//!
//! Round/term DPoS consensus core for Orbit-Chain.
//!
//! ## Architecture
//!
//! Time is divided into rounds; a round gives every active miner one
//! time slot plus one extra-block slot for the miner that terminates the
//! round. Consecutive rounds sharing one elected miner set form a term.
//! The engine decides per miner what to do at a given instant, builds the
//! round payload a block carries, validates peers' payloads through a
//! behaviour-indexed pipeline, and tracks the last irreversible block
//! through a commitment/reveal quorum.
//!
//! ```text
//! node scheduler ──get_consensus_command──→ [Service]
//!                ──get_consensus_extra_data→    │ domain: behaviour, round
//!                ──validate_before/after───→    │ generation, validation,
//!                ──process─────────────────→    │ LIB, secret sharing
//!                                               ↓
//!                                        [Event Bus] ──→ rest of the node
//! ```
//!
//! The domain layer is pure and synchronous; all I/O happens at the
//! service boundary through the outbound ports (`ElectionProvider`,
//! `EventBus`, `TimeSource`).
//!
//! ## Usage
//!
//! ```rust,ignore
//! use oc_consensus::{ConsensusDependencies, ConsensusService};
//! use oc_consensus::config::ConsensusConfig;
//!
//! let service = ConsensusService::new(ConsensusDependencies {
//!     event_bus,
//!     election,
//!     config: ConsensusConfig::default(),
//! })?;
//! service.initialize(&miners).await?;
//!
//! let command = service.get_consensus_command(my_pubkey, now).await?;
//! ```

pub mod adapters;
pub mod config;
pub mod domain;
pub mod events;
pub mod metrics;
pub mod ports;
pub mod service;
pub mod state;
pub mod validation;

pub use config::ConsensusConfig;
pub use domain::{ConsensusBehaviour, ConsensusError, ConsensusResult, Round, RoundProposal};
pub use service::{ConsensusDependencies, ConsensusService};
pub use state::RoundStore;
