//! Merkle commitment over transaction digests
//!
//! # Design
//!
//! - Leaves are hex SHA-256 digests; a parent is `sha256_hex(left ++ right)`
//!   over the concatenated hex text
//! - An odd trailing node is carried up to the next level unchanged. It is
//!   NOT paired with itself. Roots produced here are only compatible with
//!   this odd-carry reduction, so do not "fix" it into duplicate-last.
//! - A single leaf is its own root
//! - The empty set commits to `sha256_hex("empty")`

use crate::crypto::sha256_hex;

/// Hashed in place of a root when there are no leaves
pub const EMPTY_MERKLE_SENTINEL: &str = "empty";

/// Root committed by a set with no leaves
pub fn empty_root() -> String {
    sha256_hex(EMPTY_MERKLE_SENTINEL.as_bytes())
}

/// Hash a pair of hex digests (used for internal nodes)
fn hash_pair(left: &str, right: &str) -> String {
    let mut combined = String::with_capacity(left.len() + right.len());
    combined.push_str(left);
    combined.push_str(right);
    sha256_hex(combined.as_bytes())
}

/// Reduce one level, carrying an unpaired trailing node
fn next_level(level: &[String]) -> Vec<String> {
    level
        .chunks(2)
        .map(|pair| match pair {
            [left, right] => hash_pair(left, right),
            [carried] => carried.clone(),
            _ => unreachable!("chunks(2) yields one or two items"),
        })
        .collect()
}

/// Compute the merkle root of `digests`
pub fn merkle_root(digests: &[String]) -> String {
    if digests.is_empty() {
        return empty_root();
    }

    let mut level = digests.to_vec();
    while level.len() > 1 {
        level = next_level(&level);
    }

    level.swap_remove(0)
}

/// Merkle proof (path from leaf to root)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MerkleProof {
    /// Leaf digest being proven
    pub leaf_hash: String,
    /// Sibling digests along the path to root; carried levels add none
    pub siblings: Vec<(Direction, String)>,
    /// Root digest
    pub root_hash: String,
}

/// Direction of sibling in Merkle tree
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Sibling is on the left
    Left,
    /// Sibling is on the right
    Right,
}

impl MerkleProof {
    /// Verify proof against its root
    pub fn verify(&self) -> bool {
        self.verify_against(&self.root_hash)
    }

    /// Verify proof against an externally supplied root (e.g. a block's merkle root)
    pub fn verify_against(&self, root: &str) -> bool {
        let computed = self
            .siblings
            .iter()
            .fold(self.leaf_hash.clone(), |current, (direction, sibling)| {
                match direction {
                    Direction::Left => hash_pair(sibling, &current),
                    Direction::Right => hash_pair(&current, sibling),
                }
            });

        computed == root
    }
}

/// Incremental Merkle tree
#[derive(Debug, Clone, Default)]
pub struct MerkleTree {
    /// Leaf digests (indexed by position)
    leaves: Vec<String>,
    /// Cached root digest
    cached_root: Option<String>,
}

impl MerkleTree {
    /// Create empty tree
    pub fn new() -> Self {
        Self::default()
    }

    /// Create tree from existing leaves
    pub fn from_leaves(leaves: Vec<String>) -> Self {
        Self {
            leaves,
            cached_root: None,
        }
    }

    /// Append a new leaf
    pub fn append(&mut self, leaf_hash: String) {
        self.leaves.push(leaf_hash);
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

        let root = merkle_root(&self.leaves);
        self.cached_root = Some(root.clone());
        root
    }

    /// Generate Merkle proof for a leaf at given index
    pub fn generate_proof(&mut self, leaf_index: usize) -> Option<MerkleProof> {
        let leaf_hash = self.leaves.get(leaf_index)?.clone();
        let root_hash = self.root();

        let mut siblings = Vec::new();
        let mut current_level = self.leaves.clone();
        let mut current_index = leaf_index;

        while current_level.len() > 1 {
            if current_index % 2 == 1 {
                siblings.push((Direction::Left, current_level[current_index - 1].clone()));
            } else if current_index + 1 < current_level.len() {
                siblings.push((Direction::Right, current_level[current_index + 1].clone()));
            }
            // else: carried up without a sibling

            current_level = next_level(&current_level);
            current_index /= 2;
        }

        Some(MerkleProof {
            leaf_hash,
            siblings,
            root_hash,
        })
    }

    /// Verify that a leaf exists in the tree
    pub fn verify_leaf(&mut self, leaf_index: usize, leaf_hash: &str) -> bool {
        if self.leaves.get(leaf_index).map(String::as_str) != Some(leaf_hash) {
            return false;
        }

        self.generate_proof(leaf_index)
            .map(|proof| proof.verify())
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf(data: &str) -> String {
        sha256_hex(data.as_bytes())
    }

    #[test]
    fn test_empty_root_is_sentinel_hash() {
        assert_eq!(merkle_root(&[]), sha256_hex(b"empty"));
        assert_eq!(MerkleTree::new().root(), empty_root());
    }

    #[test]
    fn test_single_leaf_is_root() {
        let d = leaf("tx");
        assert_eq!(merkle_root(&[d.clone()]), d);
    }

    #[test]
    fn test_two_leaves() {
        let (a, b) = (leaf("a"), leaf("b"));
        let expected = sha256_hex(format!("{}{}", a, b).as_bytes());
        assert_eq!(merkle_root(&[a, b]), expected);
    }

    #[test]
    fn test_odd_leaf_is_carried_not_duplicated() {
        let leaves = vec![leaf("a"), leaf("b"), leaf("c")];

        let h01 = hash_pair(&leaves[0], &leaves[1]);
        let expected = hash_pair(&h01, &leaves[2]);
        assert_eq!(merkle_root(&leaves), expected);

        let duplicated = hash_pair(&h01, &hash_pair(&leaves[2], &leaves[2]));
        assert_ne!(merkle_root(&leaves), duplicated);
    }

    #[test]
    fn test_five_leaves_carry_twice() {
        let leaves: Vec<String> = ["a", "b", "c", "d", "e"].iter().map(|s| leaf(s)).collect();

        // Level 1: [ab, cd, e]; level 2: [abcd, e]; root: hash(abcd ++ e)
        let ab = hash_pair(&leaves[0], &leaves[1]);
        let cd = hash_pair(&leaves[2], &leaves[3]);
        let abcd = hash_pair(&ab, &cd);
        assert_eq!(merkle_root(&leaves), hash_pair(&abcd, &leaves[4]));
    }

    #[test]
    fn test_proof_every_leaf() {
        for count in 1..=9 {
            let leaves: Vec<String> = (0..count).map(|i| leaf(&i.to_string())).collect();
            let mut tree = MerkleTree::from_leaves(leaves.clone());
            let root = tree.root();

            for (i, l) in leaves.iter().enumerate() {
                let proof = tree.generate_proof(i).unwrap();
                assert_eq!(&proof.leaf_hash, l);
                assert!(proof.verify_against(&root), "leaf {} of {}", i, count);
            }
        }
    }

    #[test]
    fn test_carried_leaf_proof_is_short() {
        let leaves = vec![leaf("a"), leaf("b"), leaf("c")];
        let mut tree = MerkleTree::from_leaves(leaves.clone());

        // Leaf 2 is carried at level 0, then paired on the left
        let proof = tree.generate_proof(2).unwrap();
        assert_eq!(proof.siblings.len(), 1);
        assert_eq!(proof.siblings[0].0, Direction::Left);
        assert!(proof.verify());
    }

    #[test]
    fn test_proof_verification_invalid() {
        let mut tree = MerkleTree::from_leaves(vec![leaf("a"), leaf("b")]);
        let mut proof = tree.generate_proof(0).unwrap();

        proof.root_hash = leaf("fake_root");
        assert!(!proof.verify());
    }

    #[test]
    fn test_verify_leaf() {
        let leaves = vec![leaf("a"), leaf("b"), leaf("c")];
        let mut tree = MerkleTree::new();
        for l in &leaves {
            tree.append(l.clone());
        }

        assert!(tree.verify_leaf(0, &leaves[0]));
        assert!(tree.verify_leaf(2, &leaves[2]));
        assert!(!tree.verify_leaf(3, &leaves[0]));
        assert!(!tree.verify_leaf(0, &leaves[1]));
        assert!(tree.generate_proof(3).is_none());
    }

    #[test]
    fn test_incremental_updates_invalidate_cache() {
        let mut tree = MerkleTree::new();
        tree.append(leaf("a"));
        let root1 = tree.root();

        tree.append(leaf("b"));
        let root2 = tree.root();

        assert_ne!(root1, root2);
        assert_eq!(root2, merkle_root(&[leaf("a"), leaf("b")]));
    }
}
