// Copyright © 2026 Key Transparency Contributors
// SPDX-License-Identifier: Apache-2.0

//! The sparse Merkle map algorithm itself (§3, §9 design note).
//!
//! The map has `2^256` virtual leaves, one per possible [`Index`]. Almost
//! all of them are empty. Rather than materialize the tree, every empty
//! subtree at depth `d` hashes to a precomputed constant
//! [`empty_hash(d)`](empty_hash), and [`build_root`]/[`build_proof`] only
//! recurse into buckets that actually contain an occupied leaf — the
//! "frontier" the design note describes.
//!
//! Depth is counted from the leaf (depth `0`) to the root (depth `256`).
//! Bit `i` of the index (MSB-first, `i` counted from the root) selects the
//! left (`0`) or right (`1`) child at the level `DEPTH - i`.

use kt_core::Index;
use kt_crypto::hash::{sha256, Digest};

pub const DEPTH: usize = 256;

const LEAF_DOMAIN: u8 = 0x00;
const NODE_DOMAIN: u8 = 0x01;
const EMPTY_LEAF_DOMAIN: u8 = 0x02;

/// Value stored at a leaf: either present with application bytes, or a
/// tombstone recording only that the index was once written (§3 glossary,
/// "map leaf").
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum LeafValue {
    Present(Vec<u8>),
    Absent,
}

fn leaf_hash(index: &Index, value: &LeafValue) -> Digest {
    match value {
        LeafValue::Present(bytes) => {
            let mut buf = Vec::with_capacity(1 + 32 + bytes.len());
            buf.push(LEAF_DOMAIN);
            buf.extend_from_slice(index.as_ref());
            buf.extend_from_slice(bytes);
            sha256(&buf)
        },
        LeafValue::Absent => empty_leaf_hash(),
    }
}

fn empty_leaf_hash() -> Digest {
    sha256(&[EMPTY_LEAF_DOMAIN])
}

fn node_hash(left: &Digest, right: &Digest) -> Digest {
    let mut buf = Vec::with_capacity(1 + 32 + 32);
    buf.push(NODE_DOMAIN);
    buf.extend_from_slice(left);
    buf.extend_from_slice(right);
    sha256(&buf)
}

/// `empty_hash(d)` is the hash of an empty subtree of depth `d` (`d` leaves
/// below the root of that subtree). `empty_hash(0)` is the hash of a single
/// empty leaf.
pub fn empty_hash(depth: usize) -> Digest {
    let mut h = empty_leaf_hash();
    for _ in 0..depth {
        h = node_hash(&h, &h);
    }
    h
}

fn bit_at(index: &Index, bit: usize) -> bool {
    let byte = index.as_ref()[bit / 8];
    (byte >> (7 - (bit % 8))) & 1 == 1
}

/// One step of an inclusion/exclusion proof: the sibling subtree's hash at
/// that level, or `None` when the sibling subtree is entirely empty (its
/// hash is `empty_hash(level)`, which the verifier recomputes itself —
/// never transmitted, per the design note).
pub type ProofStep = Option<Digest>;

/// Inclusion (or absence) proof for a single index against a map root.
#[derive(Clone, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct MapProof {
    /// Ordered from the leaf's sibling (bit 255) up to the root's
    /// immediate children (bit 0).
    pub steps: Vec<ProofStep>,
}

/// Sorted set of occupied `(index, value)` pairs the tree is built over.
/// Callers keep this sorted by `Index`'s natural (big-endian byte) order.
pub type Leaves<'a> = &'a [(Index, LeafValue)];

/// Computes the root hash of the subtree covering `leaves`, all of which
/// share the top `bit` bits of their index (the recursion invariant).
fn subtree_hash(leaves: Leaves<'_>, bit: usize) -> Digest {
    match leaves {
        [] => empty_hash(DEPTH - bit),
        [(index, value)] if bit == DEPTH => leaf_hash(index, value),
        _ => {
            let split = leaves.partition_point(|(index, _)| !bit_at(index, bit));
            let (left, right) = leaves.split_at(split);
            node_hash(&subtree_hash(left, bit + 1), &subtree_hash(right, bit + 1))
        },
    }
}

/// Builds the root hash of the whole map. `leaves` must be sorted by index
/// with no duplicate indices.
pub fn build_root(leaves: Leaves<'_>) -> Digest {
    subtree_hash(leaves, 0)
}

/// Builds an inclusion/exclusion proof for `target`. `leaves` must be
/// sorted by index; `target` need not be present (its absence is then
/// proved against a [`LeafValue::Absent`] leaf).
pub fn build_proof(leaves: Leaves<'_>, target: &Index) -> MapProof {
    let mut steps = Vec::with_capacity(DEPTH);
    collect_steps(leaves, 0, target, &mut steps);
    MapProof { steps }
}

fn collect_steps(leaves: Leaves<'_>, bit: usize, target: &Index, steps: &mut Vec<ProofStep>) {
    if bit == DEPTH {
        return;
    }
    let split = leaves.partition_point(|(index, _)| !bit_at(index, bit));
    let (left, right) = leaves.split_at(split);
    let (same_side, other_side) = if bit_at(target, bit) { (right, left) } else { (left, right) };
    let sibling_depth = DEPTH - bit - 1;
    let sibling_hash = other_side_hash(other_side, bit + 1, sibling_depth);
    steps.push(sibling_hash);
    collect_steps(same_side, bit + 1, target, steps);
}

fn other_side_hash(leaves: Leaves<'_>, bit: usize, depth: usize) -> ProofStep {
    if leaves.is_empty() {
        return None;
    }
    debug_assert_eq!(DEPTH - bit, depth);
    Some(subtree_hash(leaves, bit))
}

/// Recomputes the root implied by `proof` for `target` carrying `value`,
/// verifying it against `expected_root`.
pub fn verify_proof(expected_root: &Digest, target: &Index, value: &LeafValue, proof: &MapProof) -> bool {
    if proof.steps.len() != DEPTH {
        return false;
    }
    let mut current = leaf_hash(target, value);
    for bit in (0..DEPTH).rev() {
        let sibling = proof.steps[bit].unwrap_or_else(|| empty_hash(DEPTH - bit - 1));
        current = if bit_at(target, bit) { node_hash(&sibling, &current) } else { node_hash(&current, &sibling) };
    }
    &current == expected_root
}

#[cfg(test)]
mod tests {
    use super::*;

    fn idx(b: u8) -> Index {
        let mut bytes = [0u8; 32];
        bytes[0] = b;
        Index(bytes)
    }

    #[test]
    fn empty_map_root_is_all_empty_hash() {
        assert_eq!(build_root(&[]), empty_hash(DEPTH));
    }

    #[test]
    fn single_leaf_round_trips() {
        let leaves = vec![(idx(1), LeafValue::Present(b"alice".to_vec()))];
        let root = build_root(&leaves);
        let proof = build_proof(&leaves, &idx(1));
        assert!(verify_proof(&root, &idx(1), &LeafValue::Present(b"alice".to_vec()), &proof));
    }

    #[test]
    fn absence_proof_verifies_for_untouched_index() {
        let leaves = vec![(idx(1), LeafValue::Present(b"alice".to_vec()))];
        let root = build_root(&leaves);
        let proof = build_proof(&leaves, &idx(2));
        assert!(verify_proof(&root, &idx(2), &LeafValue::Absent, &proof));
        assert!(!verify_proof(&root, &idx(2), &LeafValue::Present(b"x".to_vec()), &proof));
    }

    #[test]
    fn tampered_value_fails_verification() {
        let leaves = vec![(idx(1), LeafValue::Present(b"alice".to_vec()))];
        let root = build_root(&leaves);
        let proof = build_proof(&leaves, &idx(1));
        assert!(!verify_proof(&root, &idx(1), &LeafValue::Present(b"mallory".to_vec()), &proof));
    }

    #[test]
    fn multiple_leaves_all_verify_against_same_root() {
        let leaves = vec![
            (idx(1), LeafValue::Present(b"alice".to_vec())),
            (idx(2), LeafValue::Present(b"bob".to_vec())),
            (idx(200), LeafValue::Present(b"carol".to_vec())),
        ];
        let root = build_root(&leaves);
        for (index, value) in &leaves {
            let proof = build_proof(&leaves, index);
            assert!(verify_proof(&root, index, value, &proof));
        }
    }

    #[test]
    fn root_is_order_independent_of_insertion_but_sensitive_to_membership() {
        let mut leaves = vec![
            (idx(5), LeafValue::Present(b"x".to_vec())),
            (idx(9), LeafValue::Present(b"y".to_vec())),
        ];
        leaves.sort_by(|a, b| a.0.as_ref().cmp(b.0.as_ref()));
        let root_a = build_root(&leaves);
        leaves.push((idx(3), LeafValue::Present(b"z".to_vec())));
        leaves.sort_by(|a, b| a.0.as_ref().cmp(b.0.as_ref()));
        let root_b = build_root(&leaves);
        assert_ne!(root_a, root_b);
    }

    mod prop {
        use super::*;
        use proptest::prelude::*;

        fn arb_leaves(max: usize) -> impl Strategy<Value = Vec<(Index, LeafValue)>> {
            proptest::collection::btree_map(any::<[u8; 32]>(), proptest::collection::vec(any::<u8>(), 0..16), 0..max)
                .prop_map(|map| map.into_iter().map(|(bytes, value)| (Index(bytes), LeafValue::Present(value))).collect())
        }

        proptest! {
            // §8: every occupied leaf verifies against the tree's own root
            // (no false negatives).
            #[test]
            fn every_present_leaf_verifies(leaves in arb_leaves(30)) {
                let root = build_root(&leaves);
                for (index, value) in &leaves {
                    let proof = build_proof(&leaves, index);
                    prop_assert!(verify_proof(&root, index, value, &proof));
                }
            }

            // An index never written always verifies as absent, never as
            // present with any value.
            #[test]
            fn untouched_index_is_always_absent(leaves in arb_leaves(30), probe in any::<[u8; 32]>()) {
                let probe = Index(probe);
                prop_assume!(!leaves.iter().any(|(i, _)| i == &probe));
                let root = build_root(&leaves);
                let proof = build_proof(&leaves, &probe);
                prop_assert!(verify_proof(&root, &probe, &LeafValue::Absent, &proof));
            }

            // Swapping one leaf's value changes the root (binding).
            #[test]
            fn changing_a_leaf_changes_the_root(leaves in arb_leaves(10), extra in any::<u8>()) {
                prop_assume!(!leaves.is_empty());
                let root_a = build_root(&leaves);
                let mut mutated = leaves.clone();
                let (_, value) = &mut mutated[0];
                if let LeafValue::Present(bytes) = value {
                    bytes.push(extra);
                }
                let root_b = build_root(&mutated);
                prop_assert_ne!(root_a, root_b);
            }
        }
    }
}
