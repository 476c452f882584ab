//! Binary Merkle tree over chunk-commitment hashes.
//!
//! Leaves that end up unpaired on an odd-length level carry straight up to
//! the next level unchanged (the "carry rule"). Proofs are order-sensitive:
//! concatenation is `sibling || current` when the sibling sits on the left,
//! and `current || sibling` otherwise.

use serde::{Deserialize, Serialize};
use sha3::{Digest, Sha3_256};

fn hash_leaf(bytes: &[u8]) -> [u8; 32] {
    let digest = Sha3_256::digest(bytes);
    let mut out = [0u8; 32];
    out.copy_from_slice(&digest);
    out
}

fn hash_pair(left: &[u8; 32], right: &[u8; 32]) -> [u8; 32] {
    let mut hasher = Sha3_256::new();
    hasher.update(left);
    hasher.update(right);
    let digest = hasher.finalize();
    let mut out = [0u8; 32];
    out.copy_from_slice(&digest);
    out
}

/// One step of a Merkle inclusion proof: the sibling hash and which side of
/// the current node it sits on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProofNode {
    Left([u8; 32]),
    Right([u8; 32]),
}

impl ProofNode {
    pub fn sibling_hex(&self) -> String {
        match self {
            ProofNode::Left(h) | ProofNode::Right(h) => hex::encode(h),
        }
    }
}

/// A Merkle inclusion proof: an ordered list of sibling hashes from a leaf
/// up to the root.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MerkleProof(pub Vec<ProofNode>);

impl MerkleProof {
    /// Recomputes the root implied by `leaf` and this proof, and compares it
    /// against `root`.
    pub fn verify(&self, leaf: &[u8; 32], root: &[u8; 32]) -> bool {
        let mut acc = *leaf;
        for node in &self.0 {
            acc = match node {
                ProofNode::Left(sibling) => hash_pair(sibling, &acc),
                ProofNode::Right(sibling) => hash_pair(&acc, sibling),
            };
        }
        &acc == root
    }
}

/// Binary Merkle tree over leaf hashes.
///
/// `levels[0]` is the leaf level; `levels.last()` is the single-node root
/// level. Built bottom-up via [`MerkleTree::build`].
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MerkleTree {
    levels: Vec<Vec<[u8; 32]>>,
}

impl MerkleTree {
    /// Builds a tree from raw leaf bytes, hashing each leaf with SHA3-256.
    pub fn build(leaves: impl IntoIterator<Item = impl AsRef<[u8]>>) -> Self {
        let leaf_hashes: Vec<[u8; 32]> = leaves.into_iter().map(|l| hash_leaf(l.as_ref())).collect();
        Self::build_from_hashes(leaf_hashes)
    }

    /// Builds a tree directly from pre-hashed leaves (e.g. commitment point
    /// hashes), without re-hashing them.
    pub fn build_from_hashes(leaf_hashes: Vec<[u8; 32]>) -> Self {
        if leaf_hashes.is_empty() {
            return MerkleTree { levels: Vec::new() };
        }

        let mut levels = vec![leaf_hashes];
        while levels.last().unwrap().len() > 1 {
            let current = levels.last().unwrap();
            let mut next = Vec::with_capacity((current.len() + 1) / 2);
            let mut i = 0;
            while i + 1 < current.len() {
                next.push(hash_pair(&current[i], &current[i + 1]));
                i += 2;
            }
            if i < current.len() {
                // Odd leaf out: carries up unpaired.
                next.push(current[i]);
            }
            levels.push(next);
        }
        MerkleTree { levels }
    }

    pub fn leaf_count(&self) -> usize {
        self.levels.first().map(Vec::len).unwrap_or(0)
    }

    pub fn leaf(&self, index: usize) -> Option<&[u8; 32]> {
        self.levels.first()?.get(index)
    }

    /// Returns the Merkle root, if the tree is non-empty.
    pub fn root(&self) -> Option<[u8; 32]> {
        self.levels.last().and_then(|level| level.first()).copied()
    }

    pub fn root_hex(&self) -> Option<String> {
        self.root().map(hex::encode)
    }

    /// Builds an inclusion proof for the leaf at `index`.
    pub fn proof(&self, index: usize) -> Option<MerkleProof> {
        if index >= self.leaf_count() {
            return None;
        }

        let mut nodes = Vec::new();
        let mut idx = index;
        for level in &self.levels[..self.levels.len().saturating_sub(1)] {
            let level_len = level.len();
            if idx == level_len - 1 && level_len % 2 == 1 {
                // This leaf carried up unpaired; no sibling at this level.
                idx /= 2;
                continue;
            }
            let is_right = idx % 2 == 1;
            let sibling_index = if is_right { idx - 1 } else { idx + 1 };
            let sibling = level[sibling_index];
            nodes.push(if is_right {
                ProofNode::Left(sibling)
            } else {
                ProofNode::Right(sibling)
            });
            idx /= 2;
        }
        Some(MerkleProof(nodes))
    }

    /// Updates the leaf at `index` and recomputes every ancestor hash.
    pub fn update_leaf(&mut self, index: usize, new_leaf: [u8; 32]) -> bool {
        if self.levels.is_empty() || index >= self.levels[0].len() {
            return false;
        }
        self.levels[0][index] = new_leaf;
        let mut idx = index;
        for level_idx in 0..self.levels.len().saturating_sub(1) {
            let parent_idx = idx / 2;
            let level_len = self.levels[level_idx].len();
            let left = self.levels[level_idx][parent_idx * 2];
            let parent_hash = if parent_idx * 2 + 1 < level_len {
                let right = self.levels[level_idx][parent_idx * 2 + 1];
                hash_pair(&left, &right)
            } else {
                // Odd leaf carried up unpaired.
                left
            };
            self.levels[level_idx + 1][parent_idx] = parent_hash;
            idx = parent_idx;
        }
        true
    }

    /// Serializes the tree to a portable JSON form.
    pub fn serialize(&self) -> String {
        serde_json::to_string(self).expect("MerkleTree serializes to JSON")
    }

    /// Deserializes a tree from the form produced by [`MerkleTree::serialize`].
    pub fn deserialize(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}
