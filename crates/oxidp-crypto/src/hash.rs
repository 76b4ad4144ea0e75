//! Hash helpers and OIDC token hashes.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use sha2::{Digest, Sha256, Sha384, Sha512};
use subtle::ConstantTimeEq;

use crate::algorithm::{HashAlgorithm, SigningAlgorithm};

/// Computes a SHA-256 hash.
#[must_use]
pub fn sha256(data: &[u8]) -> Vec<u8> {
    Sha256::digest(data).to_vec()
}

/// Computes a SHA-384 hash.
#[must_use]
pub fn sha384(data: &[u8]) -> Vec<u8> {
    Sha384::digest(data).to_vec()
}

/// Computes a SHA-512 hash.
#[must_use]
pub fn sha512(data: &[u8]) -> Vec<u8> {
    Sha512::digest(data).to_vec()
}

/// Computes a hash with the function of the given signing-algorithm family.
#[must_use]
pub fn hash_for(alg: SigningAlgorithm, data: &[u8]) -> Vec<u8> {
    match alg.hash_algorithm() {
        HashAlgorithm::Sha256 => sha256(data),
        HashAlgorithm::Sha384 => sha384(data),
        HashAlgorithm::Sha512 => sha512(data),
    }
}

/// Computes an OIDC token hash (`c_hash`, `at_hash`, `s_hash`).
///
/// The hash function follows the ID Token signing algorithm family; the
/// value is the base64url (no padding) encoding of the left-most 128 bits
/// of the digest.
#[must_use]
pub fn token_hash(alg: SigningAlgorithm, value: &str) -> String {
    let digest = hash_for(alg, value.as_bytes());
    URL_SAFE_NO_PAD.encode(&digest[..16])
}

/// Compares two secrets in constant time.
///
/// Inputs of different lengths compare unequal without leaking where they
/// diverge.
#[must_use]
pub fn constant_time_eq(a: &str, b: &str) -> bool {
    a.as_bytes().ct_eq(b.as_bytes()).into()
}
