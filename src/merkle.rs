//! Merkle commitments over block transactions.
//!
//! The tree is built from transaction ids in block order. Each layer pairs
//! neighbours left to right; an odd trailing node is paired with itself.
//! Nodes live in a flat arena and link to each other through indices, so the
//! tree is freely clonable and serializable without reference juggling.

use crate::blockchain::Sha3Hash;
use crate::crypto::sha3_256;

#[derive(Debug, Clone)]
struct MerkleNode {
    hash: Sha3Hash,
    parent: Option<usize>,
    left: Option<usize>,
    right: Option<usize>,
}

impl MerkleNode {
    fn leaf(hash: Sha3Hash) -> Self {
        MerkleNode {
            hash,
            parent: None,
            left: None,
            right: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct MerkleTree {
    nodes: Vec<MerkleNode>,
    root: usize,
    leaf_count: usize,
}

impl MerkleTree {
    /// Builds the tree bottom-up from the given leaf hashes. The root of the
    /// empty input is the digest of the empty byte string.
    pub fn build(leaves: &[Sha3Hash]) -> Self {
        let mut nodes: Vec<MerkleNode> = Vec::with_capacity(leaves.len() * 2);

        if leaves.is_empty() {
            nodes.push(MerkleNode::leaf(sha3_256(&[])));
            return MerkleTree {
                nodes,
                root: 0,
                leaf_count: 0,
            };
        }

        let mut level: Vec<usize> = leaves
            .iter()
            .map(|hash| {
                nodes.push(MerkleNode::leaf(*hash));
                nodes.len() - 1
            })
            .collect();

        while level.len() > 1 {
            let mut next = Vec::with_capacity(level.len().div_ceil(2));
            for pair in level.chunks(2) {
                let left = pair[0];
                // an odd trailing node is hashed with itself
                let right = *pair.get(1).unwrap_or(&pair[0]);

                let mut data = [0u8; 64];
                data[..32].copy_from_slice(&nodes[left].hash);
                data[32..].copy_from_slice(&nodes[right].hash);

                let parent = nodes.len();
                nodes.push(MerkleNode {
                    hash: sha3_256(&data),
                    parent: None,
                    left: Some(left),
                    right: Some(right),
                });
                nodes[left].parent = Some(parent);
                nodes[right].parent = Some(parent);
                next.push(parent);
            }
            level = next;
        }

        MerkleTree {
            nodes,
            root: level[0],
            leaf_count: leaves.len(),
        }
    }

    /// Computes just the root without keeping the tree around.
    pub fn compute_root(leaves: &[Sha3Hash]) -> Sha3Hash {
        Self::build(leaves).root()
    }

    pub fn root(&self) -> Sha3Hash {
        self.nodes[self.root].hash
    }

    pub fn leaf_count(&self) -> usize {
        self.leaf_count
    }

    /// Inclusion proof for the leaf with the given hash: the sibling hashes
    /// from the leaf up to the root, with the root hash last. Returns `None`
    /// when the hash is not a leaf of this tree.
    pub fn proof_for(&self, leaf_hash: &Sha3Hash) -> Option<Vec<Sha3Hash>> {
        let leaf = (0..self.leaf_count).find(|&i| self.nodes[i].hash == *leaf_hash)?;

        let mut proof = Vec::new();
        let mut current = leaf;
        while let Some(parent) = self.nodes[current].parent {
            let node = &self.nodes[parent];
            let sibling = if node.left == Some(current) {
                node.right
            } else {
                node.left
            };
            if let Some(sibling) = sibling {
                proof.push(self.nodes[sibling].hash);
            }
            current = parent;
        }

        proof.push(self.nodes[self.root].hash);
        Some(proof)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf(tag: u8) -> Sha3Hash {
        sha3_256(&[tag])
    }

    fn combine(left: &Sha3Hash, right: &Sha3Hash) -> Sha3Hash {
        let mut data = [0u8; 64];
        data[..32].copy_from_slice(left);
        data[32..].copy_from_slice(right);
        sha3_256(&data)
    }

    #[test]
    fn test_root_is_deterministic() {
        let leaves = vec![leaf(1), leaf(2), leaf(3), leaf(4)];
        assert_eq!(
            MerkleTree::compute_root(&leaves),
            MerkleTree::compute_root(&leaves)
        );

        let reordered = vec![leaf(2), leaf(1), leaf(3), leaf(4)];
        assert_ne!(
            MerkleTree::compute_root(&leaves),
            MerkleTree::compute_root(&reordered)
        );
    }

    #[test]
    fn test_odd_leaf_is_paired_with_itself() {
        let three = vec![leaf(1), leaf(2), leaf(3)];
        let padded = vec![leaf(1), leaf(2), leaf(3), leaf(3)];
        assert_eq!(
            MerkleTree::compute_root(&three),
            MerkleTree::compute_root(&padded)
        );

        let two = vec![leaf(1), leaf(2)];
        assert_ne!(
            MerkleTree::compute_root(&three),
            MerkleTree::compute_root(&two)
        );
    }

    #[test]
    fn test_empty_input_hashes_empty_string() {
        let tree = MerkleTree::build(&[]);
        assert_eq!(tree.root(), sha3_256(&[]));
        assert_eq!(tree.leaf_count(), 0);
    }

    #[test]
    fn test_single_leaf_is_root() {
        let tree = MerkleTree::build(&[leaf(7)]);
        assert_eq!(tree.root(), leaf(7));
        assert_eq!(tree.proof_for(&leaf(7)), Some(vec![leaf(7)]));
    }

    #[test]
    fn test_proof_folds_to_root() {
        let leaves = vec![leaf(1), leaf(2), leaf(3), leaf(4)];
        let tree = MerkleTree::build(&leaves);

        let proof = tree.proof_for(&leaf(1)).unwrap();
        // two sibling levels plus the root
        assert_eq!(proof.len(), 3);
        assert_eq!(*proof.last().unwrap(), tree.root());

        // leaf 1 sits on the left spine, so folding left-to-right
        // reconstructs the root exactly
        let mut acc = leaf(1);
        for sibling in &proof[..proof.len() - 1] {
            acc = combine(&acc, sibling);
        }
        assert_eq!(acc, tree.root());
    }

    #[test]
    fn test_proof_for_unknown_leaf() {
        let tree = MerkleTree::build(&[leaf(1), leaf(2)]);
        assert_eq!(tree.proof_for(&leaf(9)), None);
    }

    #[test]
    fn test_duplicated_trailing_sibling_is_itself() {
        let leaves = vec![leaf(1), leaf(2), leaf(3)];
        let tree = MerkleTree::build(&leaves);

        let proof = tree.proof_for(&leaf(3)).unwrap();
        // first sibling of the unpaired leaf is the leaf itself
        assert_eq!(proof[0], leaf(3));

        let mut acc = leaf(3);
        acc = combine(&acc, &proof[0]);
        acc = combine(&combine(&leaf(1), &leaf(2)), &acc);
        assert_eq!(acc, tree.root());
    }
}
