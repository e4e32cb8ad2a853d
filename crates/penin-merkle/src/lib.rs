//! Binary Merkle tree over ledger event hashes
//!
//! The ledger commits to its full event sequence with a single root. Leaves
//! and internal nodes are hashed under distinct domains so a leaf can never
//! be confused with an internal node.

use penin_enc::{domain_hash, domains, Digest32};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MerkleError {
    #[error("Empty tree cannot compute root")]
    EmptyTree,
    #[error("Leaf index out of bounds: {index} >= {len}")]
    IndexOutOfBounds { index: usize, len: usize },
}

fn internal_hash(left: &Digest32, right: &Digest32) -> Digest32 {
    let mut combined = [0u8; 64];
    combined[..32].copy_from_slice(left);
    combined[32..].copy_from_slice(right);
    domain_hash(domains::MERKLE_INTERNAL, &combined)
}

/// Inclusion proof for one leaf
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MerkleProof {
    pub leaf_index: usize,
    pub leaf_hash: Digest32,
    /// Sibling hashes bottom-up, with the side the sibling sits on
    pub siblings: Vec<(Digest32, bool)>,
}

impl MerkleProof {
    /// Verify this proof against a root
    pub fn verify(&self, root: &Digest32) -> bool {
        let mut current = self.leaf_hash;
        for (sibling, sibling_is_right) in &self.siblings {
            current = if *sibling_is_right {
                internal_hash(&current, sibling)
            } else {
                internal_hash(sibling, &current)
            };
        }
        current == *root
    }
}

/// Binary Merkle tree with odd levels padded by duplicating the last node
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MerkleTree {
    leaf_count: usize,
    /// Level 0 is the (padded) leaves; the last level holds the root
    levels: Vec<Vec<Digest32>>,
}

impl MerkleTree {
    /// Build a tree from already-hashed 32-byte leaves, in sequence order
    pub fn from_hashes(hashes: Vec<Digest32>) -> Result<Self, MerkleError> {
        if hashes.is_empty() {
            return Err(MerkleError::EmptyTree);
        }
        let leaf_count = hashes.len();

        let mut leaves: Vec<Digest32> = hashes
            .iter()
            .map(|h| domain_hash(domains::MERKLE_LEAF, h))
            .collect();
        if leaves.len() % 2 == 1 && leaves.len() > 1 {
            leaves.push(*leaves.last().unwrap());
        }

        let mut levels = vec![leaves.clone()];
        let mut current = leaves;
        while current.len() > 1 {
            let mut next = Vec::with_capacity(current.len() / 2 + 1);
            for pair in current.chunks(2) {
                let left = pair[0];
                let right = pair.get(1).copied().unwrap_or(left);
                next.push(internal_hash(&left, &right));
            }
            if next.len() % 2 == 1 && next.len() > 1 {
                next.push(*next.last().unwrap());
            }
            levels.push(next.clone());
            current = next;
        }

        Ok(Self { leaf_count, levels })
    }

    /// Build a tree from raw data items, hashing each as a leaf payload
    pub fn from_data(items: Vec<Vec<u8>>) -> Result<Self, MerkleError> {
        let hashes = items
            .iter()
            .map(|d| domain_hash(domains::MERKLE_LEAF, d))
            .collect();
        Self::from_hashes(hashes)
    }

    /// Root hash
    pub fn root(&self) -> Digest32 {
        // Construction guarantees at least one level with one node.
        self.levels.last().unwrap()[0]
    }

    /// Root as 64 lowercase hex chars
    pub fn root_hex(&self) -> String {
        hex::encode(self.root())
    }

    /// Inclusion proof for the leaf at `index` (pre-padding numbering)
    pub fn proof(&self, index: usize) -> Result<MerkleProof, MerkleError> {
        if index >= self.leaf_count {
            return Err(MerkleError::IndexOutOfBounds {
                index,
                len: self.leaf_count,
            });
        }

        let leaf_hash = self.levels[0][index];
        let mut siblings = Vec::new();
        let mut position = index;
        for level in &self.levels[..self.levels.len() - 1] {
            let sibling_index = if position % 2 == 0 {
                position + 1
            } else {
                position - 1
            };
            if sibling_index < level.len() {
                siblings.push((level[sibling_index], position % 2 == 0));
            }
            position /= 2;
        }

        Ok(MerkleProof {
            leaf_index: index,
            leaf_hash,
            siblings,
        })
    }

    /// Number of real leaves (excluding padding)
    pub fn len(&self) -> usize {
        self.leaf_count
    }

    pub fn is_empty(&self) -> bool {
        self.leaf_count == 0
    }
}
