//! # Shared Crypto - Consensus Cryptographic Primitives
//!
//! ## Components
//!
//! | Module | Algorithm | Use Case |
//! |--------|-----------|----------|
//! | `hashing` | Keccak-256 | Commitments, signatures, fingerprints |
//! | `secret_sharing` | Shamir over GF(2^521 - 1) | Randomness reveal |
//!
//! ## Security Properties
//!
//! - **Keccak-256**: collision-resistant commitment binding
//! - **Shamir**: information-theoretic hiding below the share threshold;
//!   reconstruction cost is O(threshold^2) and bounded analytically

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod errors;
pub mod hashing;
pub mod secret_sharing;

pub use errors::CryptoError;
pub use hashing::{keccak256, keccak256_many};
pub use secret_sharing::{
    decode_secret, default_threshold, encode_secret, reconstruction_cost_micros,
};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
