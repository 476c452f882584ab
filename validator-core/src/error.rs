//! Error taxonomy for the validator core.
//!
//! Mirrors the "kind / recovered where" table in the protocol's error
//! handling design: nothing in a wave can crash a step, and nothing in a
//! step can crash the process except [`ValidatorError::NotRegistered`] and
//! [`ValidatorError::ConfigInvalid`].

use thiserror::Error;

#[derive(Debug, Error)]
pub enum MetadataError {
    #[error("metadata store unavailable: {0}")]
    Unavailable(String),
    #[error("no metadata found for hotkey {hotkey} / data_hash {data_hash}")]
    NotFound { hotkey: String, data_hash: String },
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Kept for symmetry with the other per-component error enums even though
/// every reputation-engine path today is infallible (pure projections over
/// in-memory counters).
#[derive(Debug, Error)]
pub enum ReputationError {
    #[error("unknown hotkey: {0}")]
    UnknownHotkey(String),
}

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("transport timeout for uid {0}")]
    TransportTimeout(u16),
    #[error("verification failed: {0}")]
    VerificationFailed(String),
    #[error("miner has no data")]
    MinerHasNoData,
    #[error("metadata store unavailable: {0}")]
    MetadataStoreUnavailable(#[from] MetadataError),
    #[error("chain client unavailable: {0}")]
    ChainUnavailable(String),
    #[error("this validator is not registered on the subnet")]
    NotRegistered,
}

/// Top-level error every external entry point returns.
#[derive(Debug, Error)]
pub enum ValidatorError {
    #[error(transparent)]
    Crypto(#[from] validator_crypto::CryptoError),
    #[error("protocol error: {0}")]
    Protocol(String),
    #[error(transparent)]
    Metadata(#[from] MetadataError),
    #[error(transparent)]
    Reputation(#[from] ReputationError),
    #[error(transparent)]
    Orchestrator(#[from] OrchestratorError),
    #[error("this validator is not registered on the subnet")]
    NotRegistered,
    #[error("invalid configuration: {0}")]
    ConfigInvalid(String),
}
