// Copyright © 2026 Key Transparency Contributors
// SPDX-License-Identifier: Apache-2.0

//! RFC 6962-style append-only Merkle tree: the log's inclusion and
//! consistency proofs (§3 invariants 4-5, §6 `InclusionProof` /
//! `ConsistencyProof`).

use kt_crypto::hash::{sha256, Digest};

const LEAF_DOMAIN: u8 = 0x00;
const NODE_DOMAIN: u8 = 0x01;

pub fn leaf_hash(entry: &[u8]) -> Digest {
    let mut buf = Vec::with_capacity(1 + entry.len());
    buf.push(LEAF_DOMAIN);
    buf.extend_from_slice(entry);
    sha256(&buf)
}

fn node_hash(left: &Digest, right: &Digest) -> Digest {
    let mut buf = Vec::with_capacity(1 + 64);
    buf.push(NODE_DOMAIN);
    buf.extend_from_slice(left);
    buf.extend_from_slice(right);
    sha256(&buf)
}

/// The largest power of two strictly less than `n`. Requires `n >= 2`.
fn split_point(n: usize) -> usize {
    let mut k = 1;
    while k * 2 < n {
        k *= 2;
    }
    k
}

/// `MTH` (Merkle Tree Hash) over `leaves`, the hashes of the tree's leaf
/// entries in append order.
pub fn root_hash(leaves: &[Digest]) -> Digest {
    match leaves.len() {
        0 => sha256(&[]),
        1 => leaves[0],
        n => {
            let k = split_point(n);
            node_hash(&root_hash(&leaves[..k]), &root_hash(&leaves[k..]))
        },
    }
}

/// `PATH(m, D)`: the inclusion proof for leaf index `m` in a tree built
/// over `leaves`.
pub fn inclusion_proof(leaves: &[Digest], m: usize) -> Vec<Digest> {
    path(m, leaves)
}

fn path(m: usize, d: &[Digest]) -> Vec<Digest> {
    let n = d.len();
    if n <= 1 {
        return Vec::new();
    }
    let k = split_point(n);
    if m < k {
        let mut proof = path(m, &d[..k]);
        proof.push(root_hash(&d[k..]));
        proof
    } else {
        let mut proof = path(m - k, &d[k..]);
        proof.push(root_hash(&d[..k]));
        proof
    }
}

/// Verifies an inclusion proof for a leaf at index `m` (0-based) against a
/// tree of `n` leaves whose root is `root`.
pub fn verify_inclusion(leaf: &Digest, m: usize, n: usize, proof: &[Digest], root: &Digest) -> bool {
    if m >= n {
        return false;
    }
    &compute_root_from_path(leaf, m, n, proof) == root
}

fn compute_root_from_path(leaf: &Digest, m: usize, n: usize, proof: &[Digest]) -> Digest {
    if n == 1 {
        return *leaf;
    }
    let k = split_point(n);
    let Some((&sibling, rest)) = proof.split_first() else {
        // Proof too short: return a value that cannot match any real root
        // by construction (the all-zero digest is never a valid node hash
        // domain-tagged with 0x01/0x00 over 32 real bytes... but to stay
        // honest we just recurse into an obviously-wrong state instead of
        // asserting, so callers see a verification failure, not a panic).
        return [0xffu8; 32];
    };
    if m < k {
        node_hash(&compute_root_from_path(leaf, m, k, rest), &sibling)
    } else {
        node_hash(&sibling, &compute_root_from_path(leaf, m - k, n - k, rest))
    }
}

/// `PROOF(m, D)`: the consistency proof between a tree snapshot of size
/// `m` and the current tree over `leaves` (size `n >= m`).
pub fn consistency_proof(leaves: &[Digest], m: usize) -> Vec<Digest> {
    if m == 0 || m == leaves.len() {
        return Vec::new();
    }
    subproof(m, leaves, true)
}

fn subproof(m: usize, d: &[Digest], b: bool) -> Vec<Digest> {
    let n = d.len();
    if m == n {
        return if b { Vec::new() } else { vec![root_hash(d)] };
    }
    let k = split_point(n);
    if m <= k {
        let mut proof = subproof(m, &d[..k], b);
        proof.push(root_hash(&d[k..]));
        proof
    } else {
        let mut proof = subproof(m - k, &d[k..], false);
        proof.push(root_hash(&d[..k]));
        proof
    }
}

/// Verifies that `new_root` (over `new_size` leaves) is an append-only
/// extension of `old_root` (over `old_size` leaves), per `proof`.
///
/// Mirrors [`subproof`] exactly, walking the same recursion to rebuild
/// both the old and new root from the proof's hashes, then comparing both
/// against the values the caller already trusts. `proof` is consumed from
/// its tail inward: each level of `subproof` appends its own hash *after*
/// its recursive call's contribution, so unwinding must peel the last
/// element off first.
pub fn verify_consistency(
    old_root: &Digest,
    old_size: usize,
    new_root: &Digest,
    new_size: usize,
    proof: &[Digest],
) -> bool {
    if old_size == 0 {
        return true;
    }
    if old_size == new_size {
        return proof.is_empty() && old_root == new_root;
    }
    if old_size > new_size {
        return false;
    }
    match go(old_size, new_size, true, old_root, proof) {
        Some((computed_old, computed_new, [])) => &computed_old == old_root && &computed_new == new_root,
        _ => false,
    }
}

fn go<'p>(m: usize, n: usize, b: bool, old_root: &Digest, proof: &'p [Digest]) -> Option<(Digest, Digest, &'p [Digest])> {
    if m == n {
        return if b {
            Some((*old_root, *old_root, proof))
        } else {
            let (&subtree_root, rest) = proof.split_last()?;
            Some((subtree_root, subtree_root, rest))
        };
    }
    let k = split_point(n);
    if m <= k {
        let (&right, rest) = proof.split_last()?;
        let (old, new_left, rest) = go(m, k, b, old_root, rest)?;
        Some((old, node_hash(&new_left, &right), rest))
    } else {
        let (&left, rest) = proof.split_last()?;
        let (old_right, new_right, rest) = go(m - k, n - k, false, old_root, rest)?;
        let old = if b { node_hash(&left, &old_right) } else { old_right };
        Some((old, node_hash(&left, &new_right), rest))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaves(n: usize) -> Vec<Digest> {
        (0..n).map(|i| leaf_hash(format!("entry-{i}").as_bytes())).collect()
    }

    #[test]
    fn empty_tree_root_is_hash_of_empty_string() {
        assert_eq!(root_hash(&[]), sha256(&[]));
    }

    #[test]
    fn single_leaf_root_is_leaf_hash() {
        let d = leaves(1);
        assert_eq!(root_hash(&d), d[0]);
    }

    #[test]
    fn inclusion_proof_verifies_for_every_leaf() {
        let d = leaves(7);
        let root = root_hash(&d);
        for (m, leaf) in d.iter().enumerate() {
            let proof = inclusion_proof(&d, m);
            assert!(verify_inclusion(leaf, m, d.len(), &proof, &root), "leaf {m} failed to verify");
        }
    }

    #[test]
    fn inclusion_proof_rejects_wrong_leaf() {
        let d = leaves(5);
        let root = root_hash(&d);
        let proof = inclusion_proof(&d, 2);
        let wrong = leaf_hash(b"not-the-real-entry");
        assert!(!verify_inclusion(&wrong, 2, d.len(), &proof, &root));
    }

    #[test]
    fn consistency_proof_verifies_across_growth() {
        let full = leaves(10);
        for old_size in 1..10 {
            let old_root = root_hash(&full[..old_size]);
            for new_size in (old_size + 1)..=10 {
                let new_root = root_hash(&full[..new_size]);
                let proof = consistency_proof(&full[..new_size], old_size);
                assert!(
                    verify_consistency(&old_root, old_size, &new_root, new_size, &proof),
                    "old={old_size} new={new_size} failed"
                );
            }
        }
    }

    #[test]
    fn consistency_proof_rejects_tampered_new_root() {
        let full = leaves(6);
        let old_root = root_hash(&full[..3]);
        let proof = consistency_proof(&full[..6], 3);
        let fake_new_root = sha256(b"fake");
        assert!(!verify_consistency(&old_root, 3, &fake_new_root, 6, &proof));
    }

    mod prop {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            // §8 property 4: every leaf of a tree of any size has an
            // inclusion proof that verifies against that tree's root.
            #[test]
            fn inclusion_holds_for_every_leaf(entries in proptest::collection::vec(any::<Vec<u8>>(), 1..40)) {
                let hashes: Vec<Digest> = entries.iter().map(|e| leaf_hash(e)).collect();
                let root = root_hash(&hashes);
                for (m, leaf) in hashes.iter().enumerate() {
                    let proof = inclusion_proof(&hashes, m);
                    prop_assert!(verify_inclusion(leaf, m, hashes.len(), &proof, &root));
                }
            }

            // §3 invariant 4: any prefix of the log is consistent with the
            // full log, for every growth step.
            #[test]
            fn consistency_holds_for_every_prefix(entries in proptest::collection::vec(any::<Vec<u8>>(), 2..40)) {
                let hashes: Vec<Digest> = entries.iter().map(|e| leaf_hash(e)).collect();
                let new_root = root_hash(&hashes);
                for old_size in 1..hashes.len() {
                    let old_root = root_hash(&hashes[..old_size]);
                    let proof = consistency_proof(&hashes, old_size);
                    prop_assert!(verify_consistency(&old_root, old_size, &new_root, hashes.len(), &proof));
                }
            }
        }
    }
}
