//! Core value entities shared across subsystems.

use crate::errors::TypeError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Length of a hash in bytes.
pub const HASH_LENGTH: usize = 32;

/// 256-bit hash output.
pub type Hash = [u8; HASH_LENGTH];

/// Hex-encoded block producer public key.
///
/// Producers are identified everywhere by the lowercase hex encoding of
/// their public key. The newtype keeps map keys self-describing and gives
/// a single place to validate inbound encodings.
#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Pubkey(String);

impl Pubkey {
    /// Parse a hex-encoded public key, normalizing to lowercase.
    pub fn parse(hex_str: &str) -> Result<Self, TypeError> {
        if hex_str.is_empty() {
            return Err(TypeError::EmptyPubkey);
        }
        if hex_str.len() % 2 != 0 || !hex_str.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(TypeError::InvalidPubkeyHex {
                value: hex_str.to_string(),
            });
        }
        Ok(Self(hex_str.to_ascii_lowercase()))
    }

    /// Borrow the hex string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Decode to raw bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        // Valid hex by construction.
        hex::decode(&self.0).unwrap_or_default()
    }
}

impl fmt::Display for Pubkey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Abbreviate for logs; full key available via as_str().
        if self.0.len() > 12 {
            write!(f, "{}..{}", &self.0[..6], &self.0[self.0.len() - 6..])
        } else {
            write!(f, "{}", self.0)
        }
    }
}

/// Unix timestamp with millisecond resolution.
///
/// Mining schedules are computed in milliseconds; round fingerprints use
/// whole seconds. Ordered and serde-transparent.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Timestamp(i64);

impl Timestamp {
    /// Construct from unix milliseconds.
    pub fn from_millis(millis: i64) -> Self {
        Self(millis)
    }

    /// Construct from unix seconds.
    pub fn from_seconds(seconds: i64) -> Self {
        Self(seconds.saturating_mul(1000))
    }

    /// Unix milliseconds.
    pub fn as_millis(&self) -> i64 {
        self.0
    }

    /// Whole unix seconds (truncated).
    pub fn seconds(&self) -> i64 {
        self.0.div_euclid(1000)
    }

    /// Offset by a signed number of milliseconds.
    pub fn add_millis(&self, millis: i64) -> Self {
        Self(self.0.saturating_add(millis))
    }

    /// Milliseconds elapsed from `earlier` to `self` (negative if earlier).
    pub fn millis_since(&self, earlier: Timestamp) -> i64 {
        self.0.saturating_sub(earlier.0)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}ms", self.0)
    }
}
