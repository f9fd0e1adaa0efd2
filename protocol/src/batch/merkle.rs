//! # Merkle Batcher
//!
//! Binary BLAKE3 tree over the transaction hashes of a sealed batch.
//!
//! - Leaves are `H_leaf(tx_hash)` and inner nodes `H_node(left ‖ right)`,
//!   each under its own `derive_key` context, so a leaf can never be passed
//!   off as an inner node.
//! - A level with an odd count pairs its last node with itself. A single
//!   leaf is paired with itself too, so every tree has depth
//!   `max(1, ⌈log₂ n⌉)` and every proof has exactly that many siblings.
//! - The published root is `H_root(leaf_count ‖ top)`. Binding the count
//!   stops a proof for a padded tree from verifying against a shorter one.
//!
//! Sealing is deterministic: the same leaves in the same order always give
//! the same root.

use serde::{Deserialize, Serialize};

use crate::config::{DOMAIN_MERKLE_LEAF, DOMAIN_MERKLE_NODE, DOMAIN_MERKLE_ROOT};
use crate::crypto::hash::{domain_separated_hash, domain_separated_hash_multi};
use crate::error::{CoreError, CoreResult};
use crate::types::Digest;

fn hash_leaf(leaf: &Digest) -> Digest {
    Digest::new(domain_separated_hash(DOMAIN_MERKLE_LEAF, leaf.as_bytes()))
}

fn hash_node(left: &Digest, right: &Digest) -> Digest {
    Digest::new(domain_separated_hash_multi(
        DOMAIN_MERKLE_NODE,
        &[left.as_bytes(), right.as_bytes()],
    ))
}

fn hash_root(leaf_count: u64, top: &Digest) -> Digest {
    Digest::new(domain_separated_hash_multi(
        DOMAIN_MERKLE_ROOT,
        &[&leaf_count.to_be_bytes(), top.as_bytes()],
    ))
}

/// Tree depth for `leaf_count` leaves (`leaf_count > 0`).
pub fn depth_for(leaf_count: u64) -> usize {
    if leaf_count <= 1 {
        1
    } else {
        (u64::BITS - (leaf_count - 1).leading_zeros()) as usize
    }
}

/// Sibling path from a leaf up to the top node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InclusionProof {
    pub leaf_index: u64,
    pub leaf_count: u64,
    pub siblings: Vec<Digest>,
}

/// A sealed tree. `levels[0]` holds the hashed leaves, the last level the
/// single top node.
#[derive(Debug, Clone)]
pub struct MerkleTree {
    levels: Vec<Vec<Digest>>,
    root: Digest,
}

impl MerkleTree {
    /// Build the tree over `leaves` (transaction hashes, in batch order).
    pub fn seal(leaves: &[Digest]) -> CoreResult<Self> {
        if leaves.is_empty() {
            return Err(CoreError::MalformedInput(
                "cannot seal an empty batch".into(),
            ));
        }

        let depth = depth_for(leaves.len() as u64);
        let mut levels = Vec::with_capacity(depth + 1);
        levels.push(leaves.iter().map(hash_leaf).collect::<Vec<_>>());

        for _ in 0..depth {
            let current = &levels[levels.len() - 1];
            let next = current
                .chunks(2)
                .map(|pair| match pair {
                    [left, right] => hash_node(left, right),
                    [only] => hash_node(only, only),
                    _ => unreachable!("chunks(2) yields one or two items"),
                })
                .collect::<Vec<_>>();
            levels.push(next);
        }

        let top = levels[depth][0];
        let root = hash_root(leaves.len() as u64, &top);
        Ok(Self { levels, root })
    }

    pub fn root(&self) -> Digest {
        self.root
    }

    pub fn leaf_count(&self) -> usize {
        self.levels[0].len()
    }

    pub fn depth(&self) -> usize {
        self.levels.len() - 1
    }

    pub fn levels(&self) -> &[Vec<Digest>] {
        &self.levels
    }

    /// Sibling path for the leaf at `index`.
    pub fn prove_inclusion(&self, index: usize) -> CoreResult<InclusionProof> {
        if index >= self.leaf_count() {
            return Err(CoreError::NotFound(format!(
                "leaf {index} in a tree of {}",
                self.leaf_count()
            )));
        }

        let mut siblings = Vec::with_capacity(self.depth());
        let mut idx = index;
        for level in &self.levels[..self.depth()] {
            let sibling = level.get(idx ^ 1).unwrap_or(&level[idx]);
            siblings.push(*sibling);
            idx /= 2;
        }

        Ok(InclusionProof {
            leaf_index: index as u64,
            leaf_count: self.leaf_count() as u64,
            siblings,
        })
    }
}

/// Recompute the path from `leaf` and compare against `root`.
///
/// Rejects proofs whose length differs from the depth implied by
/// `leaf_count`, and indices outside the tree.
pub fn verify_inclusion(leaf: &Digest, proof: &InclusionProof, root: &Digest) -> bool {
    if proof.leaf_count == 0 || proof.leaf_index >= proof.leaf_count {
        return false;
    }
    if proof.siblings.len() != depth_for(proof.leaf_count) {
        return false;
    }

    let mut node = hash_leaf(leaf);
    let mut idx = proof.leaf_index;
    let mut width = proof.leaf_count;
    for sibling in &proof.siblings {
        let is_last_odd = idx % 2 == 0 && idx + 1 == width;
        if is_last_odd && *sibling != node {
            return false;
        }
        node = if idx % 2 == 0 {
            hash_node(&node, sibling)
        } else {
            hash_node(sibling, &node)
        };
        idx /= 2;
        width = width.div_ceil(2);
    }

    hash_root(proof.leaf_count, &node) == *root
}
