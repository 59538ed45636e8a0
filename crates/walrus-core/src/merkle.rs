// Copyright (c) Walrus Foundation
// SPDX-License-Identifier: Apache-2.0

//! Binary Merkle trees over Blake2b-256 with leaf/inner-node domain separation.

use core::fmt;

use fastcrypto::hash::{Blake2b256, HashFunction};
use serde::{Deserialize, Serialize};

/// The number of bytes in a digest.
pub const DIGEST_LEN: usize = 32;

const LEAF_PREFIX: u8 = 0;
const INNER_PREFIX: u8 = 1;

/// A node of a Merkle tree.
///
/// The empty node is distinct from any digest and marks positions beyond the padded leaf range.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Node {
    /// An empty node.
    Empty,
    /// A node containing a digest.
    Digest([u8; DIGEST_LEN]),
}

impl Node {
    /// Returns the bytes representing the node.
    pub fn bytes(&self) -> [u8; DIGEST_LEN] {
        match self {
            Node::Empty => [0; DIGEST_LEN],
            Node::Digest(digest) => *digest,
        }
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Node::Empty => write!(f, "Node::Empty"),
            Node::Digest(digest) => {
                write!(f, "Node::Digest(0x")?;
                for byte in digest.iter().take(4) {
                    write!(f, "{byte:02x}")?;
                }
                write!(f, "…)")
            }
        }
    }
}

fn hash_leaf(data: &[u8]) -> Node {
    let mut hasher = Blake2b256::default();
    hasher.update([LEAF_PREFIX]);
    hasher.update(data);
    Node::Digest(hasher.finalize().digest)
}

fn hash_inner(left: &Node, right: &Node) -> Node {
    if matches!((left, right), (Node::Empty, Node::Empty)) {
        return Node::Empty;
    }
    let mut hasher = Blake2b256::default();
    hasher.update([INNER_PREFIX]);
    hasher.update(left.bytes());
    hasher.update(right.bytes());
    Node::Digest(hasher.finalize().digest)
}

/// Computes the root of the Merkle tree with the provided leaves.
///
/// Levels of odd length are padded with an empty node; an empty iterator yields
/// [`Node::Empty`].
pub fn merkle_root<I, L>(leaves: I) -> Node
where
    I: IntoIterator<Item = L>,
    L: AsRef<[u8]>,
{
    let mut level: Vec<Node> = leaves.into_iter().map(|l| hash_leaf(l.as_ref())).collect();
    if level.is_empty() {
        return Node::Empty;
    }
    while level.len() > 1 {
        level = level
            .chunks(2)
            .map(|pair| hash_inner(&pair[0], pair.get(1).unwrap_or(&Node::Empty)))
            .collect();
    }
    level[0]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_input_yields_empty_root() {
        assert_eq!(merkle_root(core::iter::empty::<&[u8]>()), Node::Empty);
    }

    #[test]
    fn root_is_deterministic() {
        let leaves = [b"one".as_slice(), b"two".as_slice(), b"three".as_slice()];
        assert_eq!(merkle_root(leaves), merkle_root(leaves));
    }

    #[test]
    fn root_depends_on_leaf_contents_and_order() {
        let root = merkle_root([b"one".as_slice(), b"two".as_slice()]);
        assert_ne!(root, merkle_root([b"two".as_slice(), b"one".as_slice()]));
        assert_ne!(root, merkle_root([b"one".as_slice(), b"owt".as_slice()]));
    }

    #[test]
    fn leaf_is_not_confused_with_inner_node() {
        // A single leaf equal to the concatenation of two hashed children must not collide with
        // the two-leaf root.
        let left = hash_leaf(b"left");
        let right = hash_leaf(b"right");
        let mut concatenated = Vec::new();
        concatenated.extend_from_slice(&left.bytes());
        concatenated.extend_from_slice(&right.bytes());
        assert_ne!(
            merkle_root([concatenated.as_slice()]),
            merkle_root([b"left".as_slice(), b"right".as_slice()])
        );
    }
}
