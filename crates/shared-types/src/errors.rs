//! Shared type errors.

use thiserror::Error;

/// Errors from parsing shared value types.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    /// Public key string was empty
    #[error("Public key must not be empty")]
    EmptyPubkey,

    /// Public key string was not valid hex
    #[error("Invalid hex public key: {value}")]
    InvalidPubkeyHex {
        /// The offending input
        value: String,
    },
}
