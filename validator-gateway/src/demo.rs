//! In-memory chain client, metagraph, and miner fabric used to drive the
//! step loop without a real chain or network transport, mirroring the
//! teacher's demo node (`RocksDbBlockStore` + an empty `TxPool`): enough to
//! exercise every round end-to-end, not a production transport.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::SeedableRng;

use validator_core::chain_client::{ChainClient, MetagraphSnapshot};
use validator_core::error::OrchestratorError;
use validator_core::fabric::MinerFabric;
use validator_core::selector::Metagraph;
use validator_core::types::{DataHash, Hotkey, Uid};
use validator_crypto::commitment::{commit, Crs, CurvePoint, Scalar256};
use validator_crypto::hash::hash_seeded;
use validator_crypto::merkle::MerkleTree;
use validator_protocol::messages::{chunk_bytes, encode_merkle_proof};
use validator_protocol::{
    ChallengeRequest, ChallengeResponse, RetrieveRequest, RetrieveResponse, Seed, StoreRequest, StoreResponse,
};

fn decode_b64(s: &str) -> Vec<u8> {
    use base64::Engine;
    base64::engine::general_purpose::STANDARD.decode(s).unwrap_or_default()
}

fn encode_b64(data: &[u8]) -> String {
    use base64::Engine;
    base64::engine::general_purpose::STANDARD.encode(data)
}

/// A self-advancing block counter standing in for a real chain.
pub struct DemoChainClient {
    block: AtomicU64,
    hotkeys: Vec<Hotkey>,
}

impl DemoChainClient {
    pub fn new(hotkeys: Vec<Hotkey>) -> Self {
        DemoChainClient { block: AtomicU64::new(0), hotkeys }
    }
}

#[async_trait]
impl ChainClient for DemoChainClient {
    async fn get_current_block(&self) -> Result<u64, OrchestratorError> {
        Ok(self.block.fetch_add(1, Ordering::SeqCst))
    }

    async fn set_weights(&self, uids: &[Uid], weights: &[f64], netuid: u16, version_key: u64) -> Result<(), OrchestratorError> {
        tracing::info!(netuid, version_key, ?uids, ?weights, "submitted weights (demo sink)");
        Ok(())
    }

    async fn is_hotkey_registered_on_subnet(&self, hotkey: &Hotkey, _netuid: u16) -> Result<bool, OrchestratorError> {
        Ok(self.hotkeys.contains(hotkey))
    }

    async fn metagraph_snapshot(&self) -> Result<MetagraphSnapshot, OrchestratorError> {
        Ok(MetagraphSnapshot {
            axons: self.hotkeys.iter().map(|h| format!("{h}.local:8091")).collect(),
            n: self.hotkeys.len(),
            hotkeys: self.hotkeys.clone(),
        })
    }
}

/// A fixed-size, always-reachable metagraph standing in for a chain
/// subscription.
pub struct DemoMetagraph {
    hotkeys: Vec<Hotkey>,
    self_uid: Uid,
}

impl DemoMetagraph {
    pub fn new(hotkeys: Vec<Hotkey>, self_uid: Uid) -> Self {
        DemoMetagraph { hotkeys, self_uid }
    }
}

impl Metagraph for DemoMetagraph {
    fn n(&self) -> usize {
        self.hotkeys.len()
    }
    fn uid_of(&self, hotkey: &Hotkey) -> Option<Uid> {
        self.hotkeys.iter().position(|h| h == hotkey).map(|i| i as Uid)
    }
    fn hotkey_of(&self, uid: Uid) -> Option<Hotkey> {
        self.hotkeys.get(uid as usize).cloned()
    }
    fn is_reachable(&self, uid: Uid) -> bool {
        (uid as usize) < self.hotkeys.len()
    }
    fn self_uid(&self) -> Uid {
        self.self_uid
    }
}

struct StoredBlob {
    ciphertext: Vec<u8>,
    merkle_root: [u8; 32],
    chunk_size: usize,
}

/// An honest in-memory miner population: every peer stores whatever it is
/// asked to and answers Challenge/Retrieve truthfully. There is no
/// adversarial behavior here — this binary exists to exercise the step
/// loop, not to fuzz the verifier (see `validator-protocol`'s tests for
/// that).
pub struct DemoMinerFabric {
    miners: Mutex<HashMap<Uid, HashMap<DataHash, StoredBlob>>>,
    rng_seed: AtomicU64,
}

impl DemoMinerFabric {
    pub fn new() -> Self {
        DemoMinerFabric { miners: Mutex::new(HashMap::new()), rng_seed: AtomicU64::new(1) }
    }

    fn rng(&self) -> StdRng {
        StdRng::seed_from_u64(self.rng_seed.fetch_add(1, Ordering::SeqCst))
    }

    /// Picks any blob a `uid` is holding, for the Challenge round's lookup
    /// closure.
    pub fn any_blob_with_root(&self, uid: Uid) -> Option<(DataHash, [u8; 32], usize)> {
        let miners = self.miners.lock().unwrap();
        miners.get(&uid)?.iter().next().map(|(hash, blob)| {
            let num_chunks = chunk_bytes(&blob.ciphertext, blob.chunk_size).len();
            (hash.clone(), blob.merkle_root, num_chunks)
        })
    }

    /// Picks any blob a `uid` is holding, for the Retrieve/Rebalance round's
    /// lookup closures.
    pub fn any_blob(&self, uid: Uid) -> Option<DataHash> {
        let miners = self.miners.lock().unwrap();
        miners.get(&uid)?.keys().next().cloned()
    }
}

#[async_trait]
impl MinerFabric for DemoMinerFabric {
    async fn store(&self, uid: Uid, request: StoreRequest) -> Option<StoreResponse> {
        let data = decode_b64(&request.encrypted_data_b64);
        let seed = Seed::from_hex(&request.seed).ok()?;
        let g = CurvePoint::from_hex(&request.g_hex).ok()?;
        let h = CurvePoint::from_hex(&request.h_hex).ok()?;
        let crs = Crs { g, h };

        let message = Scalar256::from_digest(&hash_seeded(&seed.0, &data));
        let randomness = Scalar256::random(&mut self.rng());
        let commitment = commit(&crs, message, randomness);
        let tree = MerkleTree::build(chunk_bytes(&data, request.chunk_size));
        let root = tree.root().unwrap_or([0u8; 32]);

        self.miners.lock().unwrap().entry(uid).or_default().insert(
            request_data_hash(&data),
            StoredBlob { ciphertext: data, merkle_root: root, chunk_size: request.chunk_size },
        );

        Some(StoreResponse {
            request,
            commitment_hex: commitment.to_hex(),
            randomness_hex: randomness.to_hex(),
            merkle_root_hex: hex::encode(root),
            opening_message_hex: message.to_hex(),
        })
    }

    async fn challenge(&self, uid: Uid, request: ChallengeRequest) -> Option<ChallengeResponse> {
        let (ciphertext, chunk_size) = {
            let miners = self.miners.lock().unwrap();
            let blob = miners.get(&uid)?.get(&request.data_hash)?;
            (blob.ciphertext.clone(), blob.chunk_size)
        };
        let seed = Seed::from_hex(&request.seed).ok()?;
        let g = CurvePoint::from_hex(&request.g_hex).ok()?;
        let h = CurvePoint::from_hex(&request.h_hex).ok()?;
        let crs = Crs { g, h };

        let tree = MerkleTree::build(chunk_bytes(&ciphertext, chunk_size));
        let chunk = chunk_bytes(&ciphertext, chunk_size).get(request.challenge_index)?.to_vec();
        let proof = tree.proof(request.challenge_index)?;

        let message = Scalar256::from_digest(&hash_seeded(&seed.0, &chunk));
        let randomness = Scalar256::random(&mut self.rng());
        let commitment = commit(&crs, message, randomness);

        Some(ChallengeResponse {
            chunk_data_b64: encode_b64(&chunk),
            commitment_hex: commitment.to_hex(),
            randomness_hex: randomness.to_hex(),
            merkle_proof: encode_merkle_proof(&proof),
            opening_message_hex: message.to_hex(),
        })
    }

    async fn retrieve(&self, uid: Uid, request: RetrieveRequest) -> Option<RetrieveResponse> {
        let data = {
            let miners = self.miners.lock().unwrap();
            miners.get(&uid)?.get(&request.data_hash)?.ciphertext.clone()
        };
        let seed = Seed::from_hex(&request.seed).ok()?;
        let crs = Crs::for_round(&seed.0);

        let message = Scalar256::from_digest(&hash_seeded(&seed.0, &data));
        let randomness = Scalar256::random(&mut self.rng());
        let commitment = commit(&crs, message, randomness);

        Some(RetrieveResponse {
            encrypted_data_b64: encode_b64(&data),
            commitment_hex: commitment.to_hex(),
            randomness_hex: randomness.to_hex(),
            opening_message_hex: message.to_hex(),
        })
    }
}

fn request_data_hash(data: &[u8]) -> DataHash {
    validator_crypto::hash::hash_data(data)
}
