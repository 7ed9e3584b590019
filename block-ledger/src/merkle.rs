//! Merkle tree over transaction representations
//!
//! # Design
//!
//! - Every leaf is hashed individually before the tree is built
//! - Adjacent hashes are paired left-to-right; a parent is the hash of the
//!   concatenated child digests
//! - An unpaired hash at the end of a level is carried up by hashing it
//!   alone (it is never duplicated)
//! - The root of an empty tree is the hash of the empty string

use crate::crypto::{hash_concat, hash_str};

/// One step from a leaf towards the root
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProofStep {
    /// Sibling sits on the left
    Left(String),
    /// Sibling sits on the right
    Right(String),
    /// Node had no sibling and was re-hashed alone
    Lone,
}

/// Merkle proof (path from leaf to root)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MerkleProof {
    /// Leaf hash being proven
    pub leaf_hash: String,
    /// Steps along the path to root
    pub steps: Vec<ProofStep>,
    /// Root hash
    pub root_hash: String,
}

impl MerkleProof {
    /// Verify proof against its root hash
    pub fn verify(&self) -> bool {
        let mut current = self.leaf_hash.clone();

        for step in &self.steps {
            current = match step {
                ProofStep::Left(sibling) => hash_concat(&[sibling, &current]),
                ProofStep::Right(sibling) => hash_concat(&[&current, sibling]),
                ProofStep::Lone => hash_str(&current),
            };
        }

        current == self.root_hash
    }

    /// Check that this proof covers the given leaf content
    pub fn proves(&self, item: &str) -> bool {
        self.leaf_hash == hash_str(item) && self.verify()
    }
}

/// Append-only Merkle tree
#[derive(Debug, Clone, Default)]
pub struct MerkleTree {
    /// Leaf hashes (indexed by position)
    leaves: Vec<String>,
    /// Cached root hash
    cached_root: Option<String>,
}

impl MerkleTree {
    /// Create empty tree
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a tree from raw leaf contents
    pub fn from_items<I, S>(items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut tree = Self::new();
        for item in items {
            tree.append(item.as_ref());
        }
        tree
    }

    /// Hash and append a new leaf
    pub fn append(&mut self, item: &str) {
        self.leaves.push(hash_str(item));
        self.cached_root = None;
    }

    /// Get number of leaves
    pub fn len(&self) -> usize {
        self.leaves.len()
    }

    /// Check if tree is empty
    pub fn is_empty(&self) -> bool {
        self.leaves.is_empty()
    }

    /// Compute Merkle root
    pub fn root(&mut self) -> String {
        if let Some(root) = &self.cached_root {
            return root.clone();
        }

        let root = if self.leaves.is_empty() {
            hash_str("")
        } else {
            let mut level = self.leaves.clone();
            while level.len() > 1 {
                level = next_level(&level);
            }
            level.swap_remove(0)
        };

        self.cached_root = Some(root.clone());
        root
    }

    /// Generate Merkle proof for the leaf at `leaf_index`
    pub fn generate_proof(&mut self, leaf_index: usize) -> Option<MerkleProof> {
        let leaf_hash = self.leaves.get(leaf_index)?.clone();
        let root_hash = self.root();

        let mut steps = Vec::new();
        let mut level = self.leaves.clone();
        let mut index = leaf_index;

        while level.len() > 1 {
            let step = if index % 2 == 1 {
                ProofStep::Left(level[index - 1].clone())
            } else if index + 1 < level.len() {
                ProofStep::Right(level[index + 1].clone())
            } else {
                ProofStep::Lone
            };
            steps.push(step);

            level = next_level(&level);
            index /= 2;
        }

        Some(MerkleProof {
            leaf_hash,
            steps,
            root_hash,
        })
    }

    /// Verify that `item` sits at `leaf_index`
    pub fn verify_leaf(&mut self, leaf_index: usize, item: &str) -> bool {
        match self.generate_proof(leaf_index) {
            Some(proof) => proof.proves(item),
            None => false,
        }
    }
}

/// Root hash of an ordered list of leaf contents
pub fn root_hash<I, S>(items: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    MerkleTree::from_items(items).root()
}

fn next_level(level: &[String]) -> Vec<String> {
    level
        .chunks(2)
        .map(|pair| match pair {
            [left, right] => hash_concat(&[left, right]),
            [lone] => hash_str(lone),
            _ => unreachable!("chunks(2) yields one or two items"),
        })
        .collect()
}
