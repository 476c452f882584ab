//! Core data model shared across the metadata, reputation, and orchestrator
//! modules: miner identity, blob metadata, chunk mapping, and event records.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A miner's durable public-key identity, rendered as an SS58-like address.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Hotkey(pub String);

impl std::fmt::Display for Hotkey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Dense, epoch-local integer index assigned to a miner by the chain.
///
/// The `uid ↔ hotkey` mapping may change across epochs; callers must
/// re-resolve it per round via a [`crate::selector::Metagraph`] snapshot.
pub type Uid = u16;

/// Hex-encoded SHA3-256 of a blob's ciphertext; unique per blob.
pub type DataHash = String;

/// Opaque record of how a blob was encrypted by its owner, carried as
/// metadata bookkeeping only — this crate never performs encryption or
/// decryption.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptionPayload {
    pub nonce: Vec<u8>,
    pub tag: Vec<u8>,
}

/// Per-`(hotkey, data_hash)` metadata the validator owns.
///
/// Created at first successful Store, mutated at every subsequent verified
/// interaction. Under normal operation only `prev_seed` changes after
/// creation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlobMetadata {
    pub data_hash: DataHash,
    pub size: u64,
    pub encryption_payload: EncryptionPayload,
    /// Seed from the most recent successful interaction with this blob.
    ///
    /// Invariant: after any successful Store/Challenge/Retrieve under seed
    /// `s`, `prev_seed == Some(s)`. A verifier that accepts a proof bound to
    /// an older seed than this is incorrect.
    pub prev_seed: Option<[u8; 32]>,
    /// TTL in seconds; `0` means no expiry.
    pub ttl_seconds: u64,
}

impl BlobMetadata {
    pub fn new(data_hash: DataHash, size: u64, encryption_payload: EncryptionPayload, ttl_seconds: u64) -> Self {
        BlobMetadata {
            data_hash,
            size,
            encryption_payload,
            prev_seed: None,
            ttl_seconds,
        }
    }
}

/// One entry in an ordered chunk mapping for a blob stored across multiple
/// miners.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkEntry {
    pub chunk_index: usize,
    pub chunk_hash: String,
    pub hotkey: Hotkey,
}

/// Reliability tiers, ordered from least to most trusted.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Tier {
    /// Fewer than `min_attempts` observations; no reward multiplier boost.
    Provisional,
    Bronze,
    Silver,
    Gold,
    Platinum,
}

impl Tier {
    /// Multiplier applied to raw rewards for miners in this tier.
    pub fn factor(self) -> f64 {
        match self {
            Tier::Provisional => 1.0,
            Tier::Bronze => 0.25,
            Tier::Silver => 0.75,
            Tier::Gold => 1.25,
            Tier::Platinum => 2.0,
        }
    }

    /// Storage capacity granted to a miner in this tier, in bytes. Higher
    /// tiers earn more capacity on top of more reward, so Store rounds route
    /// redundancy toward miners that have proven reliable.
    pub fn capacity_bytes(self) -> u64 {
        const GIB: u64 = 1024 * 1024 * 1024;
        match self {
            Tier::Provisional => GIB,
            Tier::Bronze => 2 * GIB,
            Tier::Silver => 5 * GIB,
            Tier::Gold => 10 * GIB,
            Tier::Platinum => 20 * GIB,
        }
    }
}

/// Task types the reputation engine tracks independently per miner.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum TaskType {
    Store,
    Challenge,
    Retrieve,
}

/// A round's structured log: per-task outcomes plus the reward vector
/// produced, used for observability only and never consulted for
/// correctness.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EventRecord {
    pub task: TaskType,
    pub per_uid_success: BTreeMap<Uid, bool>,
    pub per_uid_latency_ms: BTreeMap<Uid, u64>,
    pub rewards: BTreeMap<Uid, f64>,
    pub best_uid: Option<Uid>,
    pub step_duration_ms: u64,
    pub block: u64,
}

/// Wandb-shaped end-of-step statistics: total network storage and the full
/// chunk-hash ↔ hotkey map, supplementing [`EventRecord`] per original
/// source's step logging.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StepSnapshot {
    pub step: u64,
    pub block: u64,
    pub total_network_storage_bytes: u64,
    pub chunk_hash_to_hotkey: BTreeMap<String, Hotkey>,
    pub events: Vec<EventRecord>,
}
