//! Verification of miner responses against the request that produced them.
//!
//! Every check here recomputes the expected Pedersen opening from
//! `H(seed || data)` rather than trusting a value the miner sent, so a
//! miner cannot swap in an opening for data it no longer holds. A miner
//! that returns an empty payload is treated as [`Outcome::NoData`] rather
//! than a verification failure, since "miner doesn't have it" and "miner
//! sent a forged proof" are tracked separately upstream.

use base64::Engine;
use validator_crypto::commitment::{commit, open, CryptoError, Crs, CurvePoint, Opening, Scalar256};
use validator_crypto::hash::hash_seeded;
use validator_crypto::merkle::{MerkleProof, MerkleTree};

use crate::messages::{
    chunk_bytes, decode_merkle_proof, ChallengeRequest, ChallengeResponse, RetrieveRequest, RetrieveResponse,
    StoreRequest, StoreResponse,
};
use crate::seed::Seed;

/// Result of checking a miner's response against its request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Outcome {
    /// The proof checked out.
    Verified,
    /// The proof was present but did not check out, with a human-readable
    /// reason for the reputation layer to log.
    Failed(String),
    /// The miner returned no payload at all.
    NoData,
}

fn decode_b64(s: &str) -> Result<Vec<u8>, String> {
    base64::engine::general_purpose::STANDARD
        .decode(s)
        .map_err(|e| format!("invalid base64: {e}"))
}

fn crypto_err(e: CryptoError) -> String {
    format!("invalid curve encoding: {e}")
}

fn opens_with_recomputed_message(
    crs: &Crs,
    commitment: &CurvePoint,
    randomness_hex: &str,
    seed: &Seed,
    data: &[u8],
) -> Result<bool, String> {
    let randomness = Scalar256::from_hex(randomness_hex).map_err(crypto_err)?;
    let message = Scalar256::from_digest(&hash_seeded(&seed.0, data));
    let opening = Opening { message, randomness };
    Ok(open(crs, commitment, &opening))
}

/// Verifies a [`StoreResponse`] against the [`StoreRequest`] that produced
/// it and the seed the validator issued for this round.
pub fn verify_store_with_seed(request: &StoreRequest, response: &StoreResponse, seed: &Seed) -> Outcome {
    if response.merkle_root_hex.is_empty() || response.commitment_hex.is_empty() {
        return Outcome::NoData;
    }

    let data = match decode_b64(&request.encrypted_data_b64) {
        Ok(d) => d,
        Err(e) => return Outcome::Failed(e),
    };

    let expected_root = MerkleTree::build(chunk_bytes(&data, request.chunk_size)).root();
    match expected_root {
        Some(root) if hex::encode(root) == response.merkle_root_hex => {}
        _ => return Outcome::Failed("merkle root does not match the chunked blob".to_string()),
    }

    let g = match CurvePoint::from_hex(&request.g_hex) {
        Ok(p) => p,
        Err(e) => return Outcome::Failed(crypto_err(e)),
    };
    let h = match CurvePoint::from_hex(&request.h_hex) {
        Ok(p) => p,
        Err(e) => return Outcome::Failed(crypto_err(e)),
    };
    let commitment = match CurvePoint::from_hex(&response.commitment_hex) {
        Ok(p) => p,
        Err(e) => return Outcome::Failed(crypto_err(e)),
    };
    let crs = Crs { g, h };

    match opens_with_recomputed_message(&crs, &commitment, &response.randomness_hex, seed, &data) {
        Ok(true) => Outcome::Verified,
        Ok(false) => Outcome::Failed("commitment does not open to the stored blob".to_string()),
        Err(e) => Outcome::Failed(e),
    }
}

/// Verifies a [`ChallengeResponse`] against its request, the round seed, and
/// the Merkle root recorded at store time.
pub fn verify_challenge_with_seed(
    request: &ChallengeRequest,
    response: &ChallengeResponse,
    seed: &Seed,
    merkle_root: &[u8; 32],
) -> Outcome {
    if response.chunk_data_b64.is_empty() || response.commitment_hex.is_empty() {
        return Outcome::NoData;
    }

    let chunk = match decode_b64(&response.chunk_data_b64) {
        Ok(d) => d,
        Err(e) => return Outcome::Failed(e),
    };

    let leaf_hash = validator_crypto::hash::hash_data_bytes(&chunk);
    let proof = match decode_merkle_proof(&response.merkle_proof) {
        Ok(p) => p,
        Err(e) => return Outcome::Failed(format!("invalid merkle proof encoding: {e}")),
    };
    if !proof_verifies(&proof, &leaf_hash, merkle_root) {
        return Outcome::Failed("merkle proof does not match the stored root".to_string());
    }

    let g = match CurvePoint::from_hex(&request.g_hex) {
        Ok(p) => p,
        Err(e) => return Outcome::Failed(crypto_err(e)),
    };
    let h = match CurvePoint::from_hex(&request.h_hex) {
        Ok(p) => p,
        Err(e) => return Outcome::Failed(crypto_err(e)),
    };
    let commitment = match CurvePoint::from_hex(&response.commitment_hex) {
        Ok(p) => p,
        Err(e) => return Outcome::Failed(crypto_err(e)),
    };
    let crs = Crs { g, h };

    match opens_with_recomputed_message(&crs, &commitment, &response.randomness_hex, seed, &chunk) {
        Ok(true) => Outcome::Verified,
        Ok(false) => Outcome::Failed("commitment does not open to the challenged chunk".to_string()),
        Err(e) => Outcome::Failed(e),
    }
}

fn proof_verifies(proof: &MerkleProof, leaf: &[u8; 32], root: &[u8; 32]) -> bool {
    proof.verify(leaf, root)
}

/// Verifies a [`RetrieveResponse`] against its request and the round seed.
pub fn verify_retrieve_with_seed(
    request: &RetrieveRequest,
    response: &RetrieveResponse,
    seed: &Seed,
    g: &CurvePoint,
    h: &CurvePoint,
) -> Outcome {
    if response.encrypted_data_b64.is_empty() || response.commitment_hex.is_empty() {
        return Outcome::NoData;
    }

    let data = match decode_b64(&response.encrypted_data_b64) {
        Ok(d) => d,
        Err(e) => return Outcome::Failed(e),
    };

    let actual_hash = validator_crypto::hash::hash_data(&data);
    if actual_hash != request.data_hash {
        return Outcome::Failed("retrieved data does not match the recorded content hash".to_string());
    }

    let commitment = match CurvePoint::from_hex(&response.commitment_hex) {
        Ok(p) => p,
        Err(e) => return Outcome::Failed(crypto_err(e)),
    };
    let crs = Crs { g: *g, h: *h };

    match opens_with_recomputed_message(&crs, &commitment, &response.randomness_hex, seed, &data) {
        Ok(true) => Outcome::Verified,
        Ok(false) => Outcome::Failed("commitment does not open to the retrieved blob".to_string()),
        Err(e) => Outcome::Failed(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use validator_crypto::merkle::MerkleTree;

    fn rng() -> rand::rngs::StdRng {
        rand::rngs::StdRng::seed_from_u64(7)
    }

    fn b64(data: &[u8]) -> String {
        base64::engine::general_purpose::STANDARD.encode(data)
    }

    #[test]
    fn store_round_trip_verifies() {
        let seed = Seed::generate(&mut rng());
        let data = b"encrypted-blob-bytes".to_vec();
        let crs = Crs::for_round(&seed.0);
        let chunk_size = 7;

        let message = Scalar256::from_digest(&hash_seeded(&seed.0, &data));
        let randomness = Scalar256::random(&mut rng());
        let commitment = commit(&crs, message, randomness);
        let root = MerkleTree::build(chunk_bytes(&data, chunk_size)).root().unwrap();

        let request = StoreRequest::new(&data, crs.g.to_hex(), crs.h.to_hex(), seed, chunk_size);
        let response = StoreResponse {
            request: request.clone(),
            commitment_hex: commitment.to_hex(),
            randomness_hex: randomness.to_hex(),
            merkle_root_hex: hex::encode(root),
            opening_message_hex: message.to_hex(),
        };

        assert_eq!(verify_store_with_seed(&request, &response, &seed), Outcome::Verified);
    }

    #[test]
    fn store_fails_when_merkle_root_does_not_match_chunked_blob() {
        let seed = Seed::generate(&mut rng());
        let data = b"encrypted-blob-bytes".to_vec();
        let crs = Crs::for_round(&seed.0);
        let chunk_size = 7;

        let message = Scalar256::from_digest(&hash_seeded(&seed.0, &data));
        let randomness = Scalar256::random(&mut rng());
        let commitment = commit(&crs, message, randomness);

        let request = StoreRequest::new(&data, crs.g.to_hex(), crs.h.to_hex(), seed, chunk_size);
        let response = StoreResponse {
            request: request.clone(),
            commitment_hex: commitment.to_hex(),
            randomness_hex: randomness.to_hex(),
            merkle_root_hex: "ab".repeat(32),
            opening_message_hex: message.to_hex(),
        };

        assert_eq!(
            verify_store_with_seed(&request, &response, &seed),
            Outcome::Failed("merkle root does not match the chunked blob".to_string())
        );
    }

    #[test]
    fn store_fails_when_commitment_does_not_open() {
        let seed = Seed::generate(&mut rng());
        let data = b"some blob".to_vec();
        let crs = Crs::for_round(&seed.0);
        let chunk_size = 4;
        let request = StoreRequest::new(&data, crs.g.to_hex(), crs.h.to_hex(), seed, chunk_size);
        let root = MerkleTree::build(chunk_bytes(&data, chunk_size)).root().unwrap();
        let response = StoreResponse {
            request: request.clone(),
            commitment_hex: crs.g.to_hex(),
            randomness_hex: Scalar256::random(&mut rng()).to_hex(),
            merkle_root_hex: hex::encode(root),
            opening_message_hex: "00".repeat(32),
        };
        matches!(verify_store_with_seed(&request, &response, &seed), Outcome::Failed(_));
    }

    #[test]
    fn store_with_empty_root_is_no_data() {
        let seed = Seed::generate(&mut rng());
        let data = b"x".to_vec();
        let crs = Crs::for_round(&seed.0);
        let request = StoreRequest::new(&data, crs.g.to_hex(), crs.h.to_hex(), seed, 4);
        let response = StoreResponse {
            request: request.clone(),
            commitment_hex: String::new(),
            randomness_hex: String::new(),
            merkle_root_hex: String::new(),
            opening_message_hex: String::new(),
        };
        assert_eq!(verify_store_with_seed(&request, &response, &seed), Outcome::NoData);
    }

    #[test]
    fn challenge_round_trip_verifies() {
        let seed = Seed::generate(&mut rng());
        let chunks = vec![b"chunk-a".to_vec(), b"chunk-b".to_vec(), b"chunk-c".to_vec()];
        let tree = MerkleTree::build(chunks.clone());
        let root = tree.root().unwrap();
        let proof = tree.proof(1).unwrap();

        let crs = Crs::for_round(&seed.0);
        let chunk = chunks[1].clone();
        let message = Scalar256::from_digest(&hash_seeded(&seed.0, &chunk));
        let randomness = Scalar256::random(&mut rng());
        let commitment = commit(&crs, message, randomness);

        let request = ChallengeRequest {
            data_hash: "deadbeef".to_string(),
            chunk_size: chunk.len(),
            g_hex: crs.g.to_hex(),
            h_hex: crs.h.to_hex(),
            curve: crate::messages::CURVE_NAME.to_string(),
            challenge_index: 1,
            seed: seed.to_hex(),
        };
        let response = ChallengeResponse {
            chunk_data_b64: b64(&chunk),
            commitment_hex: commitment.to_hex(),
            randomness_hex: randomness.to_hex(),
            merkle_proof: crate::messages::encode_merkle_proof(&proof),
            opening_message_hex: message.to_hex(),
        };

        assert_eq!(
            verify_challenge_with_seed(&request, &response, &seed, &root),
            Outcome::Verified
        );
    }

    #[test]
    fn challenge_fails_on_wrong_merkle_root() {
        let seed = Seed::generate(&mut rng());
        let chunks = vec![b"chunk-a".to_vec(), b"chunk-b".to_vec()];
        let tree = MerkleTree::build(chunks.clone());
        let proof = tree.proof(0).unwrap();
        let wrong_root = [0xAAu8; 32];

        let crs = Crs::for_round(&seed.0);
        let chunk = chunks[0].clone();
        let message = Scalar256::from_digest(&hash_seeded(&seed.0, &chunk));
        let randomness = Scalar256::random(&mut rng());
        let commitment = commit(&crs, message, randomness);

        let request = ChallengeRequest {
            data_hash: "deadbeef".to_string(),
            chunk_size: chunk.len(),
            g_hex: crs.g.to_hex(),
            h_hex: crs.h.to_hex(),
            curve: crate::messages::CURVE_NAME.to_string(),
            challenge_index: 0,
            seed: seed.to_hex(),
        };
        let response = ChallengeResponse {
            chunk_data_b64: b64(&chunk),
            commitment_hex: commitment.to_hex(),
            randomness_hex: randomness.to_hex(),
            merkle_proof: crate::messages::encode_merkle_proof(&proof),
            opening_message_hex: message.to_hex(),
        };

        let outcome = verify_challenge_with_seed(&request, &response, &seed, &wrong_root);
        assert!(matches!(outcome, Outcome::Failed(_)));
    }

    #[test]
    fn retrieve_round_trip_verifies() {
        let seed = Seed::generate(&mut rng());
        let data = b"full ciphertext blob".to_vec();
        let data_hash = validator_crypto::hash::hash_data(&data);
        let crs = Crs::for_round(&seed.0);

        let message = Scalar256::from_digest(&hash_seeded(&seed.0, &data));
        let randomness = Scalar256::random(&mut rng());
        let commitment = commit(&crs, message, randomness);

        let request = RetrieveRequest::new(data_hash, seed);
        let response = RetrieveResponse {
            encrypted_data_b64: b64(&data),
            commitment_hex: commitment.to_hex(),
            randomness_hex: randomness.to_hex(),
            opening_message_hex: message.to_hex(),
        };

        assert_eq!(
            verify_retrieve_with_seed(&request, &response, &seed, &crs.g, &crs.h),
            Outcome::Verified
        );
    }

    #[test]
    fn retrieve_fails_when_content_hash_mismatches() {
        let seed = Seed::generate(&mut rng());
        let data = b"real data".to_vec();
        let crs = Crs::for_round(&seed.0);
        let message = Scalar256::from_digest(&hash_seeded(&seed.0, &data));
        let randomness = Scalar256::random(&mut rng());
        let commitment = commit(&crs, message, randomness);

        let request = RetrieveRequest::new("wrong-hash".to_string(), seed);
        let response = RetrieveResponse {
            encrypted_data_b64: b64(&data),
            commitment_hex: commitment.to_hex(),
            randomness_hex: randomness.to_hex(),
            opening_message_hex: message.to_hex(),
        };

        let outcome = verify_retrieve_with_seed(&request, &response, &seed, &crs.g, &crs.h);
        assert!(matches!(outcome, Outcome::Failed(_)));
    }

    #[test]
    fn retrieve_with_empty_payload_is_no_data() {
        let seed = Seed::generate(&mut rng());
        let crs = Crs::for_round(&seed.0);
        let request = RetrieveRequest::new("deadbeef".to_string(), seed);
        let response = RetrieveResponse {
            encrypted_data_b64: String::new(),
            commitment_hex: String::new(),
            randomness_hex: String::new(),
            opening_message_hex: String::new(),
        };
        assert_eq!(
            verify_retrieve_with_seed(&request, &response, &seed, &crs.g, &crs.h),
            Outcome::NoData
        );
    }
}
