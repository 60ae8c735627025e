//! # Shared Types Crate
//!
//! Value primitives shared across the Orbit-Chain workspace.
//!
//! ## Design Principles
//!
//! - **Single Source of Truth**: every type exchanged between the consensus
//!   core and its collaborators is defined here.
//! - **Plain Values**: no behaviour beyond construction, comparison and
//!   arithmetic; domain logic lives in the consuming crates.

pub mod entities;
pub mod errors;

pub use entities::{Hash, Pubkey, Timestamp, HASH_LENGTH};
pub use errors::TypeError;
