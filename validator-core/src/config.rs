//! Top-level configuration for a validator node.
//!
//! Aggregates configuration for crypto curve choice, protocol timeouts and
//! sample sizes, reputation thresholds, the metadata backend, the metrics
//! exporter, and persisted-state location. Loading from a config file, CLI
//! flags, or environment variables is an external collaborator's job; this
//! struct is the contract such a loader populates.

use std::net::SocketAddr;
use std::time::Duration;

/// Which named elliptic curve the Pedersen commitment layer uses.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Curve {
    P256,
}

impl Default for Curve {
    fn default() -> Self {
        Curve::P256
    }
}

/// Configuration for the crypto primitives layer (C1).
#[derive(Clone, Debug)]
pub struct CryptoConfig {
    pub curve: Curve,
}

impl Default for CryptoConfig {
    fn default() -> Self {
        Self { curve: Curve::P256 }
    }
}

/// Whether a round's chunk size is randomized or pinned.
///
/// `override_chunk_size == 0` means randomize in
/// `[min_chunk_size, min_chunk_size * chunk_factor]`; any non-zero value is
/// used as-is.
#[derive(Clone, Debug)]
pub struct ProtocolConfig {
    pub netuid: u16,
    pub store_timeout: Duration,
    pub challenge_timeout: Duration,
    pub retrieve_timeout: Duration,
    pub store_redundancy: usize,
    pub challenge_sample_size: usize,
    pub min_chunk_size: usize,
    pub chunk_factor: usize,
    pub override_chunk_size: usize,
    pub blocks_per_step: u64,
    pub data_ttl: u64,
    pub concurrent_forwards: usize,
    pub round_robin_gate: RoundRobinGate,
    pub max_store_retries: usize,
}

/// Gate that lets only the round-robin-selected validator for a step run it,
/// avoiding duplicate work across the validator set. Configurable because
/// the source this protocol was distilled from disabled the equivalent
/// check (`while False:`); this crate defaults to the intended design.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RoundRobinGate {
    pub enabled: bool,
}

impl Default for RoundRobinGate {
    fn default() -> Self {
        RoundRobinGate { enabled: true }
    }
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            netuid: 1,
            store_timeout: Duration::from_secs(30),
            challenge_timeout: Duration::from_secs(15),
            retrieve_timeout: Duration::from_secs(30),
            store_redundancy: 3,
            challenge_sample_size: 10,
            min_chunk_size: 256 * 1024,
            chunk_factor: 4,
            override_chunk_size: 0,
            blocks_per_step: 10,
            data_ttl: 60 * 60 * 24 * 30,
            concurrent_forwards: 1,
            round_robin_gate: RoundRobinGate::default(),
            max_store_retries: 3,
        }
    }
}

/// Tier thresholds and EMA parameters for the reputation/reward engines
/// (C4/C5).
#[derive(Clone, Debug)]
pub struct ReputationConfig {
    pub min_attempts: u32,
    pub ema_alpha: f64,
    pub decay_rate: f64,
    pub blocks_per_weight: u64,
}

impl Default for ReputationConfig {
    fn default() -> Self {
        Self {
            min_attempts: 10,
            ema_alpha: 0.05,
            decay_rate: 1.0,
            blocks_per_weight: 100,
        }
    }
}

/// Which metadata-store backend to construct.
#[derive(Clone, Debug)]
pub enum MetadataBackend {
    InMemory,
    Redis { host: String, port: u16, index: u8 },
}

impl Default for MetadataBackend {
    fn default() -> Self {
        MetadataBackend::InMemory
    }
}

#[derive(Clone, Debug, Default)]
pub struct MetadataConfig {
    pub backend: MetadataBackend,
}

/// Configuration for the Prometheus metrics exporter.
#[derive(Clone, Debug)]
pub struct MetricsConfig {
    pub enabled: bool,
    pub listen_addr: SocketAddr,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        let addr: SocketAddr = "127.0.0.1:9899"
            .parse()
            .expect("hard-coded metrics listen address should parse");
        Self {
            enabled: true,
            listen_addr: addr,
        }
    }
}

/// Where the persisted validator-state snapshot lives on disk.
#[derive(Clone, Debug)]
pub struct PersistenceConfig {
    pub state_path: String,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            state_path: "validator_state.json".to_string(),
        }
    }
}

/// Top-level configuration for a validator node.
///
/// This aggregates all sub-configs needed to wire up a node: crypto curve
/// choice, protocol timeouts/sample sizes, reputation/reward tuning, the
/// metadata backend, the metrics exporter, and persisted-state location.
#[derive(Clone, Debug, Default)]
pub struct ValidatorConfig {
    pub crypto: CryptoConfig,
    pub protocol: ProtocolConfig,
    pub reputation: ReputationConfig,
    pub metadata: MetadataConfig,
    pub metrics: MetricsConfig,
    pub persistence: PersistenceConfig,
}
