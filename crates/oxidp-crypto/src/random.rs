//! Cryptographically secure random generation for protocol artifacts.
//!
//! Authorization codes and token identifiers use UUIDv4; request ids, PAR
//! handles, client ids and session ids use 21-character url-safe unique ids.

use rand::distributions::{Alphanumeric, DistString};
use rand::Rng;
use uuid::Uuid;

/// Alphabet of url-safe unique ids (the nanoid default alphabet).
const UNIQUE_ID_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789_-";

/// Length of url-safe unique ids.
const UNIQUE_ID_LEN: usize = 21;

/// Generates `len` cryptographically secure random bytes.
#[must_use]
pub fn random_bytes(len: usize) -> Vec<u8> {
    let mut rng = rand::thread_rng();
    let mut bytes = vec![0u8; len];
    rng.fill(&mut bytes[..]);
    bytes
}

/// Generates a random alphanumeric string of `len` characters.
#[must_use]
pub fn random_alphanumeric(len: usize) -> String {
    Alphanumeric.sample_string(&mut rand::thread_rng(), len)
}

/// Generates a random string over url-safe alphabet characters.
///
/// 21 characters over a 64-symbol alphabet carry 126 bits of entropy,
/// within the collision bounds required of one-time handles.
#[must_use]
pub fn unique_id() -> String {
    let mut rng = rand::thread_rng();
    (0..UNIQUE_ID_LEN)
        .map(|_| {
            let idx = rng.gen_range(0..UNIQUE_ID_ALPHABET.len());
            UNIQUE_ID_ALPHABET[idx] as char
        })
        .collect()
}

/// Generates a random UUIDv4 in its canonical hyphenated form.
#[must_use]
pub fn uuid_v4() -> String {
    Uuid::new_v4().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unique_id_shape() {
        let id = unique_id();
        assert_eq!(id.len(), UNIQUE_ID_LEN);
        assert!(id
            .bytes()
            .all(|b| UNIQUE_ID_ALPHABET.contains(&b)));
    }

    #[test]
    fn unique_ids_differ() {
        assert_ne!(unique_id(), unique_id());
        assert_ne!(uuid_v4(), uuid_v4());
    }

    #[test]
    fn alphanumeric_length() {
        assert_eq!(random_alphanumeric(32).len(), 32);
        assert_eq!(random_bytes(16).len(), 16);
    }
}
