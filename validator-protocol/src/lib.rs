//! Wire protocol for Store, Challenge, and Retrieve rounds between a
//! validator and a miner, plus the verification logic a validator runs
//! against a miner's response.
//!
//! - [`seed`]: per-request nonces that bind a proof to one round.
//! - [`messages`]: the request/response wire shapes.
//! - [`verify`]: checks a response against its request and reports an
//!   [`verify::Outcome`].

pub mod messages;
pub mod seed;
pub mod verify;

pub use messages::{
    ChallengeRequest, ChallengeResponse, RetrieveRequest, RetrieveResponse, StoreRequest,
    StoreResponse, WireProofNode, CURVE_NAME,
};
pub use seed::Seed;
pub use verify::{verify_challenge_with_seed, verify_retrieve_with_seed, verify_store_with_seed, Outcome};
