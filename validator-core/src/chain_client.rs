//! The chain client interface (consumed): wallet/keypair management and
//! chain RPC are out of scope for this crate (per spec.md §1) and are
//! represented only by this trait.

use async_trait::async_trait;

use crate::error::OrchestratorError;
use crate::types::{Hotkey, Uid};

/// Dense snapshot of the subnet's registered miners, as returned by the
/// chain client.
#[derive(Clone, Debug)]
pub struct MetagraphSnapshot {
    pub hotkeys: Vec<Hotkey>,
    pub axons: Vec<String>,
    pub n: usize,
}

/// External collaborator providing chain reads/writes. Out of scope per
/// spec.md §1; this crate only consumes it.
#[async_trait]
pub trait ChainClient: Send + Sync {
    async fn get_current_block(&self) -> Result<u64, OrchestratorError>;

    async fn set_weights(
        &self,
        uids: &[Uid],
        weights: &[f64],
        netuid: u16,
        version_key: u64,
    ) -> Result<(), OrchestratorError>;

    async fn is_hotkey_registered_on_subnet(&self, hotkey: &Hotkey, netuid: u16) -> Result<bool, OrchestratorError>;

    async fn metagraph_snapshot(&self) -> Result<MetagraphSnapshot, OrchestratorError>;
}
