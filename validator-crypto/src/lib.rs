//! Cryptographic primitives for the storage-subnet proof protocol.
//!
//! This crate provides the three building blocks the wire protocol is built
//! on top of:
//!
//! - [`commitment`]: Pedersen commitments over a named elliptic curve, with a
//!   common reference string (CRS) re-derived per round so miners cannot
//!   precompute openings.
//! - [`hash`]: the stable content-hash used to identify blobs and chunks.
//! - [`merkle`]: a binary Merkle tree over chunk-commitment hashes, with
//!   inclusion proofs, single-leaf updates, and a portable serialized form.

pub mod commitment;
pub mod hash;
pub mod merkle;

pub use commitment::{Crs, CryptoError, Opening, Scalar256};
pub use hash::hash_data;
pub use merkle::{MerkleProof, MerkleTree, ProofNode};
