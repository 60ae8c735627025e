//! Crypto error types.

use thiserror::Error;

/// Cryptographic operation errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CryptoError {
    /// Threshold outside 1..=total_parts
    #[error("Invalid threshold {threshold} for {total_parts} parts")]
    InvalidThreshold {
        /// Requested share threshold
        threshold: usize,
        /// Total shares requested
        total_parts: usize,
    },

    /// Not enough shares supplied for reconstruction
    #[error("Insufficient shares: need {needed}, got {got}")]
    InsufficientShares {
        /// Threshold required for reconstruction
        needed: usize,
        /// Shares actually supplied
        got: usize,
    },

    /// A supplied share was empty
    #[error("Share for x = {x} is empty")]
    EmptyShare {
        /// The share's evaluation point
        x: u64,
    },

    /// Two shares claim the same evaluation point
    #[error("Duplicate share at x = {x}")]
    DuplicateShare {
        /// The duplicated evaluation point
        x: u64,
    },

    /// Secret does not fit the field
    #[error("Secret of {bytes} bytes exceeds the field size")]
    SecretTooLarge {
        /// Length of the rejected secret
        bytes: usize,
    },
}
