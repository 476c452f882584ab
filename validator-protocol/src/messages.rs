//! Wire message shapes for Store, Challenge, and Retrieve.
//!
//! Field names and hex/base64 encodings here are the public contract
//! between a validator and a miner and must not change: `encrypted_data`
//! (base64), `g`/`h`/`commitment`/`merkle_root` (uncompressed SEC1 point
//! hex with a `04` prefix), `seed` (64 hex chars), `curve` (e.g. `"P-256"`),
//! and `merkle_proof` (an array of `{"left": hex}` / `{"right": hex}`).

use serde::{Deserialize, Serialize};
use validator_crypto::merkle::ProofNode;
use validator_crypto::MerkleProof;

use crate::seed::Seed;

/// Name of the curve this protocol build targets.
pub const CURVE_NAME: &str = "P-256";

/// One step of a wire-encoded Merkle proof.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WireProofNode {
    Left(String),
    Right(String),
}

impl WireProofNode {
    pub fn from_proof_node(node: &ProofNode) -> Self {
        match node {
            ProofNode::Left(h) => WireProofNode::Left(hex::encode(h)),
            ProofNode::Right(h) => WireProofNode::Right(hex::encode(h)),
        }
    }

    pub fn to_proof_node(&self) -> Result<ProofNode, hex::FromHexError> {
        let (hex_str, ctor): (&str, fn([u8; 32]) -> ProofNode) = match self {
            WireProofNode::Left(h) => (h, ProofNode::Left),
            WireProofNode::Right(h) => (h, ProofNode::Right),
        };
        let bytes = hex::decode(hex_str)?;
        let mut arr = [0u8; 32];
        if bytes.len() != 32 {
            return Err(hex::FromHexError::InvalidStringLength);
        }
        arr.copy_from_slice(&bytes);
        Ok(ctor(arr))
    }
}

/// Converts a [`MerkleProof`] into its wire representation.
pub fn encode_merkle_proof(proof: &MerkleProof) -> Vec<WireProofNode> {
    proof.0.iter().map(WireProofNode::from_proof_node).collect()
}

/// Decodes a wire-format Merkle proof back into a [`MerkleProof`].
pub fn decode_merkle_proof(wire: &[WireProofNode]) -> Result<MerkleProof, hex::FromHexError> {
    let nodes = wire
        .iter()
        .map(WireProofNode::to_proof_node)
        .collect::<Result<Vec<_>, _>>()?;
    Ok(MerkleProof(nodes))
}

/// Splits `data` into `chunk_size`-byte pieces, the leaf ordering both Store
/// and Challenge build their Merkle tree over. A `chunk_size` of zero or
/// empty `data` yields no chunks rather than panicking on `.chunks(0)`.
pub fn chunk_bytes(data: &[u8], chunk_size: usize) -> Vec<&[u8]> {
    if chunk_size == 0 || data.is_empty() {
        return Vec::new();
    }
    data.chunks(chunk_size).collect()
}

/// `Store` request: asks a miner to take custody of an encrypted blob.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StoreRequest {
    pub encrypted_data_b64: String,
    pub curve: String,
    pub g_hex: String,
    pub h_hex: String,
    pub seed: String,
    pub chunk_size: usize,
}

/// `Store` response: the miner's commitment over the blob and its opening.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StoreResponse {
    pub request: StoreRequest,
    pub commitment_hex: String,
    pub randomness_hex: String,
    pub merkle_root_hex: String,
    pub opening_message_hex: String,
}

/// `Challenge` request: asks a miner to open a commitment to one chunk of a
/// previously stored blob.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChallengeRequest {
    pub data_hash: String,
    pub chunk_size: usize,
    pub g_hex: String,
    pub h_hex: String,
    pub curve: String,
    pub challenge_index: usize,
    pub seed: String,
}

/// `Challenge` response: the requested chunk, its commitment, and a Merkle
/// proof against the previously stored root.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChallengeResponse {
    pub chunk_data_b64: String,
    pub commitment_hex: String,
    pub randomness_hex: String,
    pub merkle_proof: Vec<WireProofNode>,
    pub opening_message_hex: String,
}

/// `Retrieve` request: asks a miner for the full ciphertext of a blob.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetrieveRequest {
    pub data_hash: String,
    pub seed: String,
}

/// `Retrieve` response: the full ciphertext plus a fresh opening.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetrieveResponse {
    pub encrypted_data_b64: String,
    pub commitment_hex: String,
    pub randomness_hex: String,
    pub opening_message_hex: String,
}

impl StoreRequest {
    pub fn new(encrypted_data: &[u8], g_hex: String, h_hex: String, seed: Seed, chunk_size: usize) -> Self {
        use base64::Engine;
        StoreRequest {
            encrypted_data_b64: base64::engine::general_purpose::STANDARD.encode(encrypted_data),
            curve: CURVE_NAME.to_string(),
            g_hex,
            h_hex,
            seed: seed.to_hex(),
            chunk_size,
        }
    }
}

impl RetrieveRequest {
    pub fn new(data_hash: impl Into<String>, seed: Seed) -> Self {
        RetrieveRequest {
            data_hash: data_hash.into(),
            seed: seed.to_hex(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_proof_node_json_shape_matches_protocol_contract() {
        let node = WireProofNode::Left("ab".repeat(32));
        let json = serde_json::to_string(&node).unwrap();
        assert_eq!(json, format!("{{\"left\":\"{}\"}}", "ab".repeat(32)));
    }

    #[test]
    fn store_request_round_trips_through_json() {
        let req = StoreRequest {
            encrypted_data_b64: "AAAA".to_string(),
            curve: CURVE_NAME.to_string(),
            g_hex: "04".to_string(),
            h_hex: "04".to_string(),
            seed: "00".repeat(32),
            chunk_size: 1024,
        };
        let json = serde_json::to_string(&req).unwrap();
        let decoded: StoreRequest = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded.curve, CURVE_NAME);
        assert_eq!(decoded.seed.len(), 64);
    }
}
