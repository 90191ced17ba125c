//! Binary Merkle tree over entry hashes (§4.15). Odd levels duplicate the
//! trailing node rather than leaving it unpaired.

use sha2::{Digest, Sha256};

pub type Hash = [u8; 32];

fn hash_pair(left: &Hash, right: &Hash) -> Hash {
    let mut hasher = Sha256::new();
    hasher.update(left);
    hasher.update(right);
    hasher.finalize().into()
}

/// One step of an inclusion proof: the sibling hash and whether it sits to
/// the right of the node being combined.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ProofStep {
    pub sibling: Hash,
    pub sibling_is_right: bool,
}

pub struct MerkleTree {
    levels: Vec<Vec<Hash>>,
}

impl MerkleTree {
    #[must_use]
    pub fn build(leaves: &[Hash]) -> Self {
        if leaves.is_empty() {
            return Self { levels: Vec::new() };
        }
        let mut levels = vec![leaves.to_vec()];
        while levels.last().expect("at least one level").len() > 1 {
            let prev = levels.last().expect("at least one level");
            let mut next = Vec::with_capacity(prev.len().div_ceil(2));
            let mut i = 0;
            while i < prev.len() {
                let left = prev[i];
                let right = if i + 1 < prev.len() { prev[i + 1] } else { prev[i] };
                next.push(hash_pair(&left, &right));
                i += 2;
            }
            levels.push(next);
        }
        Self { levels }
    }

    #[must_use]
    pub fn root(&self) -> Option<Hash> {
        self.levels.last().and_then(|level| level.first()).copied()
    }

    /// Inclusion proof for the leaf at `index`. `None` if `index` is out
    /// of range.
    #[must_use]
    pub fn proof(&self, index: usize) -> Option<Vec<ProofStep>> {
        if self.levels.is_empty() || index >= self.levels[0].len() {
            return None;
        }
        let mut steps = Vec::new();
        let mut idx = index;
        for level in &self.levels[..self.levels.len() - 1] {
            let sibling_idx = if idx % 2 == 0 { idx + 1 } else { idx - 1 };
            let sibling = if sibling_idx < level.len() { level[sibling_idx] } else { level[idx] };
            steps.push(ProofStep { sibling, sibling_is_right: idx % 2 == 0 });
            idx /= 2;
        }
        Some(steps)
    }
}

/// Recompute the root reachable from `leaf` by walking `proof`, and report
/// whether it matches `expected_root`.
#[must_use]
pub fn verify_inclusion(leaf: Hash, proof: &[ProofStep], expected_root: Hash) -> bool {
    let mut current = leaf;
    for step in proof {
        current = if step.sibling_is_right {
            hash_pair(&current, &step.sibling)
        } else {
            hash_pair(&step.sibling, &current)
        };
    }
    current == expected_root
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf(byte: u8) -> Hash {
        [byte; 32]
    }

    #[test]
    fn single_leaf_tree_roots_to_itself() {
        let tree = MerkleTree::build(&[leaf(1)]);
        assert_eq!(tree.root(), Some(leaf(1)));
        let proof = tree.proof(0).expect("proof");
        assert!(proof.is_empty());
        assert!(verify_inclusion(leaf(1), &proof, tree.root().expect("root")));
    }

    #[test]
    fn odd_leaf_count_duplicates_tail() {
        let leaves = vec![leaf(1), leaf(2), leaf(3)];
        let tree = MerkleTree::build(&leaves);
        let root = tree.root().expect("root");
        for (i, l) in leaves.iter().enumerate() {
            let proof = tree.proof(i).expect("proof");
            assert!(verify_inclusion(*l, &proof, root));
        }
    }

    #[test]
    fn tampered_leaf_fails_inclusion() {
        let leaves = vec![leaf(1), leaf(2), leaf(3), leaf(4)];
        let tree = MerkleTree::build(&leaves);
        let root = tree.root().expect("root");
        let proof = tree.proof(0).expect("proof");
        assert!(!verify_inclusion(leaf(99), &proof, root));
    }

    #[test]
    fn out_of_range_index_has_no_proof() {
        let tree = MerkleTree::build(&[leaf(1), leaf(2)]);
        assert!(tree.proof(5).is_none());
    }
}
