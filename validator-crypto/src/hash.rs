//! Stable content hashing for blobs and chunks.

use sha3::{Digest, Sha3_256};

/// Computes the SHA3-256 digest of `bytes`, rendered as lowercase hex.
///
/// Used as the stable identifier for a blob (`data_hash`) and, with a round
/// seed mixed in, as the message opened by a [`crate::commitment`] Pedersen
/// commitment.
pub fn hash_data(bytes: &[u8]) -> String {
    let digest = Sha3_256::digest(bytes);
    hex::encode(digest)
}

/// Computes the raw 32-byte SHA3-256 digest of `bytes`.
pub fn hash_data_bytes(bytes: &[u8]) -> [u8; 32] {
    let digest = Sha3_256::digest(bytes);
    let mut out = [0u8; 32];
    out.copy_from_slice(&digest);
    out
}

/// Computes `SHA3-256(seed || data)`, the message a Store/Challenge/Retrieve
/// opening must hash to under a particular round seed.
///
/// This is the "seed binding" defense described in the protocol: a miner
/// that does not hold `data` cannot compute this digest for a seed chosen
/// after it last interacted with the validator.
pub fn hash_seeded(seed: &[u8; 32], data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha3_256::new();
    hasher.update(seed);
    hasher.update(data);
    let digest = hasher.finalize();
    let mut out = [0u8; 32];
    out.copy_from_slice(&digest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_data_is_deterministic_and_hex() {
        let a = hash_data(b"hello world");
        let b = hash_data(b"hello world");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn hash_data_differs_for_different_input() {
        assert_ne!(hash_data(b"a"), hash_data(b"b"));
    }

    #[test]
    fn hash_seeded_binds_to_seed() {
        let data = b"chunk bytes";
        let seed1 = [1u8; 32];
        let seed2 = [2u8; 32];
        assert_ne!(hash_seeded(&seed1, data), hash_seeded(&seed2, data));
    }
}
