//! # Keccak-256 Hashing
//!
//! One-shot and multi-input helpers over `sha3`. All consensus commitments
//! (out-values, signatures, round fingerprints) are Keccak-256 digests.

use sha3::{Digest, Keccak256};
use shared_types::Hash;

/// Hash data with Keccak-256 (one-shot).
pub fn keccak256(data: &[u8]) -> Hash {
    let mut hasher = Keccak256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// Hash multiple inputs as one stream.
pub fn keccak256_many(inputs: &[&[u8]]) -> Hash {
    let mut hasher = Keccak256::new();
    for input in inputs {
        hasher.update(input);
    }
    hasher.finalize().into()
}
