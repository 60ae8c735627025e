//! # Threshold Secret Sharing
//!
//! Shamir (threshold, N) sharing over the Mersenne prime field
//! GF(2^521 - 1). A producer splits its commitment preimage into N shares;
//! any `threshold` of them reconstruct the value through Lagrange
//! interpolation at x = 0.
//!
//! Reconstruction is O(threshold^2) field multiplications. The cost is
//! bounded analytically (`reconstruction_cost_micros`) from the configured
//! producer-count ceiling rather than by instruction counting, since the
//! bignum arithmetic lives outside any instrumented runtime.

use crate::errors::CryptoError;
use lazy_static::lazy_static;
use num_bigint::BigUint;
use rand::RngCore;

lazy_static! {
    /// Field modulus: the Mersenne prime 2^521 - 1.
    ///
    /// Large enough that any 256-bit secret embeds without reduction.
    static ref FIELD_PRIME: BigUint = (BigUint::from(1u8) << 521u32) - 1u8;
}

/// Maximum secret size that embeds into the field without reduction.
const MAX_SECRET_BYTES: usize = 64;

/// Conservative per-field-multiplication cost estimate in microseconds.
const FIELD_MUL_MICROS: u64 = 2;

/// Share threshold used by consensus: floor(2N/3), at least one.
pub fn default_threshold(total_parts: usize) -> usize {
    (total_parts * 2 / 3).max(1)
}

/// Analytic upper bound on reconstruction cost for one secret.
///
/// Lagrange interpolation over `threshold` points performs on the order of
/// `3 * threshold^2` field multiplications plus `threshold` modular
/// inversions (each one modpow, ~`521` multiplications).
pub fn reconstruction_cost_micros(threshold: usize) -> u64 {
    let t = threshold as u64;
    (3 * t * t + t * 521) * FIELD_MUL_MICROS
}

/// Split `secret` into `total_parts` shares, any `threshold` of which
/// reconstruct it.
///
/// Share `i` (1-based) is the evaluation of a random degree
/// `threshold - 1` polynomial with constant term `secret`.
pub fn encode_secret(
    secret: &[u8],
    threshold: usize,
    total_parts: usize,
) -> Result<Vec<Vec<u8>>, CryptoError> {
    if threshold == 0 || threshold > total_parts {
        return Err(CryptoError::InvalidThreshold {
            threshold,
            total_parts,
        });
    }
    if secret.len() > MAX_SECRET_BYTES {
        return Err(CryptoError::SecretTooLarge {
            bytes: secret.len(),
        });
    }

    let mut coefficients = Vec::with_capacity(threshold);
    coefficients.push(BigUint::from_bytes_be(secret));
    let mut rng = rand::thread_rng();
    for _ in 1..threshold {
        coefficients.push(random_field_element(&mut rng));
    }

    let shares = (1..=total_parts as u64)
        .map(|x| evaluate_polynomial(&coefficients, x).to_bytes_be())
        .collect();
    Ok(shares)
}

/// Reconstruct a secret from `(x, share)` pairs.
///
/// `secret_length` restores leading zero bytes lost in the big-endian
/// field encoding.
pub fn decode_secret(
    shares: &[(u64, Vec<u8>)],
    threshold: usize,
    secret_length: usize,
) -> Result<Vec<u8>, CryptoError> {
    if shares.len() < threshold {
        return Err(CryptoError::InsufficientShares {
            needed: threshold,
            got: shares.len(),
        });
    }

    let mut points = Vec::with_capacity(threshold);
    for (x, bytes) in shares.iter().take(threshold) {
        if bytes.is_empty() {
            return Err(CryptoError::EmptyShare { x: *x });
        }
        if points.iter().any(|(seen, _)| seen == x) {
            return Err(CryptoError::DuplicateShare { x: *x });
        }
        points.push((*x, BigUint::from_bytes_be(bytes)));
    }

    let value = lagrange_interpolate_at_zero(&points);
    let mut bytes = value.to_bytes_be();
    if bytes.len() < secret_length {
        let mut padded = vec![0u8; secret_length - bytes.len()];
        padded.append(&mut bytes);
        bytes = padded;
    }
    Ok(bytes)
}

fn random_field_element(rng: &mut impl RngCore) -> BigUint {
    // 80 bytes of entropy so the reduction bias is negligible.
    let mut buf = [0u8; 80];
    rng.fill_bytes(&mut buf);
    BigUint::from_bytes_be(&buf) % &*FIELD_PRIME
}

/// Horner evaluation of the share polynomial at `x`.
fn evaluate_polynomial(coefficients: &[BigUint], x: u64) -> BigUint {
    let prime = &*FIELD_PRIME;
    let x = BigUint::from(x);
    let mut acc = BigUint::from(0u8);
    for coefficient in coefficients.iter().rev() {
        acc = (acc * &x + coefficient) % prime;
    }
    acc
}

fn lagrange_interpolate_at_zero(points: &[(u64, BigUint)]) -> BigUint {
    let prime = &*FIELD_PRIME;
    let mut acc = BigUint::from(0u8);
    for (i, (xi, yi)) in points.iter().enumerate() {
        let xi = BigUint::from(*xi);
        let mut numerator = BigUint::from(1u8);
        let mut denominator = BigUint::from(1u8);
        for (j, (xj, _)) in points.iter().enumerate() {
            if i == j {
                continue;
            }
            let xj = BigUint::from(*xj);
            numerator = numerator * &xj % prime;
            // (xj - xi) mod p without signed arithmetic.
            denominator = denominator * ((&xj + prime - &xi) % prime) % prime;
        }
        let term = yi * numerator % prime * mod_inverse(&denominator) % prime;
        acc = (acc + term) % prime;
    }
    acc
}

/// Modular inverse by Fermat: a^(p-2) mod p, p prime.
fn mod_inverse(a: &BigUint) -> BigUint {
    let prime = &*FIELD_PRIME;
    a.modpow(&(prime - 2u8), prime)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip_exact_threshold() {
        let secret = b"the round randomness preimage!!!";
        let shares = encode_secret(secret, 3, 5).unwrap();
        assert_eq!(shares.len(), 5);

        let subset: Vec<(u64, Vec<u8>)> = vec![
            (2, shares[1].clone()),
            (4, shares[3].clone()),
            (5, shares[4].clone()),
        ];
        let recovered = decode_secret(&subset, 3, secret.len()).unwrap();
        assert_eq!(recovered, secret);
    }

    #[test]
    fn test_leading_zero_secret_restored() {
        let mut secret = vec![0u8; 4];
        secret.extend_from_slice(b"zeros");
        let shares = encode_secret(&secret, 2, 3).unwrap();
        let subset: Vec<(u64, Vec<u8>)> = vec![(1, shares[0].clone()), (3, shares[2].clone())];
        let recovered = decode_secret(&subset, 2, secret.len()).unwrap();
        assert_eq!(recovered, secret);
    }

    #[test]
    fn test_below_threshold_rejected() {
        let shares = encode_secret(b"secret", 3, 5).unwrap();
        let subset: Vec<(u64, Vec<u8>)> = vec![(1, shares[0].clone()), (2, shares[1].clone())];
        let result = decode_secret(&subset, 3, 6);
        assert_eq!(
            result,
            Err(CryptoError::InsufficientShares { needed: 3, got: 2 })
        );
    }

    #[test]
    fn test_duplicate_share_rejected() {
        let shares = encode_secret(b"secret", 2, 3).unwrap();
        let subset: Vec<(u64, Vec<u8>)> = vec![(1, shares[0].clone()), (1, shares[0].clone())];
        assert_eq!(
            decode_secret(&subset, 2, 6),
            Err(CryptoError::DuplicateShare { x: 1 })
        );
    }

    #[test]
    fn test_invalid_threshold_rejected() {
        assert!(matches!(
            encode_secret(b"s", 0, 5),
            Err(CryptoError::InvalidThreshold { .. })
        ));
        assert!(matches!(
            encode_secret(b"s", 6, 5),
            Err(CryptoError::InvalidThreshold { .. })
        ));
    }

    #[test]
    fn test_oversized_secret_rejected() {
        let big = vec![0xffu8; MAX_SECRET_BYTES + 1];
        assert!(matches!(
            encode_secret(&big, 2, 3),
            Err(CryptoError::SecretTooLarge { .. })
        ));
    }

    #[test]
    fn test_default_threshold() {
        assert_eq!(default_threshold(1), 1);
        assert_eq!(default_threshold(3), 2);
        assert_eq!(default_threshold(5), 3);
        assert_eq!(default_threshold(21), 14);
    }

    #[test]
    fn test_cost_estimate_monotonic() {
        assert!(reconstruction_cost_micros(14) > reconstruction_cost_micros(3));
        // Worst case at a 100-producer ceiling stays far below a second.
        assert!(reconstruction_cost_micros(default_threshold(100)) < 1_000_000);
    }
}
