//! The RPC fabric interface (consumed): the network transport between
//! validator and miners is out of scope for this crate (per spec.md §1) and
//! is represented only by this trait.

use async_trait::async_trait;

use validator_protocol::{ChallengeRequest, ChallengeResponse, RetrieveRequest, RetrieveResponse, StoreRequest, StoreResponse};

use crate::types::Uid;

/// External collaborator dispatching wire messages to a miner's axon and
/// returning its response. Out of scope per spec.md §1; this crate only
/// consumes it. Implementations are responsible for converting a transport
/// timeout into `None` rather than propagating an error, so wave
/// aggregation stays uniform.
#[async_trait]
pub trait MinerFabric: Send + Sync {
    async fn store(&self, uid: Uid, request: StoreRequest) -> Option<StoreResponse>;
    async fn challenge(&self, uid: Uid, request: ChallengeRequest) -> Option<ChallengeResponse>;
    async fn retrieve(&self, uid: Uid, request: RetrieveRequest) -> Option<RetrieveResponse>;
}
