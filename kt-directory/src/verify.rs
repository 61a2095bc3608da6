// Copyright © 2026 Key Transparency Contributors
// SPDX-License-Identifier: Apache-2.0

//! Client-side verification helpers (§9 "Supplemented features").
//!
//! These mirror exactly what a verifier must do to accept a `GetUser` /
//! `GetRevision` response: recompute the VRF index, check map inclusion,
//! check log inclusion, check log consistency, and replay a revision's
//! mutations to confirm `MapRoot(r) = Mutate*(MapRoot(r-1))` (§8 property
//! 6). They perform no I/O and make no RPC calls of their own — a caller
//! hands them the proof bytes it already fetched from the prover (§4.E).
//!
//! Library functions only; they add no new RPC surface. Grounded on the
//! verification-helper module shape of `akd_core`'s `verify` submodule.

use kt_core::{Index, MutationProof};
use kt_crypto::hash::Digest;
use kt_crypto::{VrfProof, VrfPublicKey};
use kt_log::merkle;
use kt_map::smt;
use thiserror::Error;

#[derive(Debug, Error, Eq, PartialEq)]
pub enum VerifyError {
    #[error("VRF proof does not verify")]
    Vrf,
    #[error("map inclusion proof does not verify")]
    MapInclusion,
    #[error("log inclusion proof does not verify")]
    LogInclusion,
    #[error("log consistency proof does not verify")]
    LogConsistency,
    #[error("mutation's previous-chain does not match the expected pre-image")]
    RevisionChain,
}

/// Recomputes and checks the VRF-derived index for `user_id` against
/// `proof` (§8 property 1).
pub fn verify_vrf(
    vrf_pk: &VrfPublicKey,
    directory_id: &str,
    user_id: &[u8],
    proof: &VrfProof,
) -> Result<Index, VerifyError> {
    kt_crypto::vrf::verify(vrf_pk, directory_id, user_id, proof)
        .map(Index)
        .map_err(|_| VerifyError::Vrf)
}

/// Checks that `value` at `index` is included in (or absent from) the map
/// whose root hash is `root_hash` (§8 property: map leaf inclusion).
pub fn verify_map_inclusion(
    root_hash: &Digest,
    index: &Index,
    value: &smt::LeafValue,
    proof: &smt::MapProof,
) -> Result<(), VerifyError> {
    if smt::verify_proof(root_hash, index, value, proof) {
        Ok(())
    } else {
        Err(VerifyError::MapInclusion)
    }
}

/// Checks that `leaf` sits at `leaf_index` in the log of size `tree_size`
/// whose root is `root_hash` (§8 property 4).
pub fn verify_log_inclusion(
    root_hash: &Digest,
    leaf_index: u64,
    tree_size: u64,
    leaf: &[u8],
    proof: &[Digest],
) -> Result<(), VerifyError> {
    let leaf_hash = merkle::leaf_hash(leaf);
    if merkle::verify_inclusion(&leaf_hash, leaf_index as usize, tree_size as usize, proof, root_hash) {
        Ok(())
    } else {
        Err(VerifyError::LogInclusion)
    }
}

/// Checks that the log grew append-only from `(old_root, old_size)` to
/// `(new_root, new_size)` (§3 invariant 5, §8 property 4).
pub fn verify_consistency(
    old_root: &Digest,
    old_size: u64,
    new_root: &Digest,
    new_size: u64,
    proof: &[Digest],
) -> Result<(), VerifyError> {
    if merkle::verify_consistency(old_root, old_size as usize, new_root, new_size as usize, proof) {
        Ok(())
    } else {
        Err(VerifyError::LogConsistency)
    }
}

/// Checks the self-contained half of §3 invariant 3 for each mutation in a
/// `ListMutations(r)` page: a non-initial entry's `previous` must be
/// non-zero (it is expected to equal `SHA256` of its pre-image, which the
/// caller checks separately via [`verify_map_inclusion`] against
/// `MapRoot(r-1)` using `preimage_inclusion`); an initial entry's
/// `previous` must be the zero digest.
pub fn verify_revision_chain(mutations: &[MutationProof]) -> Result<(), VerifyError> {
    for mutation_proof in mutations {
        let is_initial = mutation_proof.preimage_inclusion.is_none();
        let previous_is_zero = mutation_proof.mutation.entry.previous == kt_crypto::hash::ZERO_DIGEST;
        if is_initial != previous_is_zero {
            return Err(VerifyError::RevisionChain);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use kt_core::{AuthorizedKeys, Entry, SignedEntry};
    use kt_crypto::{hash, Committed, SecretKey, VrfSecretKey};

    #[test]
    fn verify_vrf_accepts_genuine_proof_and_rejects_tamper() {
        let sk = VrfSecretKey::new();
        let pk = sk.public();
        let (index, proof) = kt_crypto::vrf::compute(&sk, "dir-1", b"alice");
        let verified = verify_vrf(&pk, "dir-1", b"alice", &proof).unwrap();
        assert_eq!(verified.0, index);
        assert!(verify_vrf(&pk, "dir-1", b"mallory", &proof).is_err());
    }

    #[test]
    fn verify_map_inclusion_round_trips() {
        let idx = Index([3u8; 32]);
        let value = smt::LeafValue::Present(b"alice".to_vec());
        let leaves = vec![(idx, value.clone())];
        let root = smt::build_root(&leaves);
        let proof = smt::build_proof(&leaves, &idx);
        assert!(verify_map_inclusion(&root, &idx, &value, &proof).is_ok());
        assert!(verify_map_inclusion(&root, &idx, &smt::LeafValue::Absent, &proof).is_err());
    }

    #[test]
    fn verify_log_inclusion_round_trips() {
        let entries: Vec<Vec<u8>> = (0..5).map(|i| format!("entry-{i}").into_bytes()).collect();
        let hashes: Vec<_> = entries.iter().map(|e| merkle::leaf_hash(e)).collect();
        let root = merkle::root_hash(&hashes);
        let proof = merkle::inclusion_proof(&hashes, 2);
        assert!(verify_log_inclusion(&root, 2, 5, &entries[2], &proof).is_ok());
        assert!(verify_log_inclusion(&root, 2, 5, b"not-it", &proof).is_err());
    }

    #[test]
    fn verify_consistency_round_trips() {
        let hashes: Vec<_> = (0..6).map(|i| merkle::leaf_hash(format!("e{i}").as_bytes())).collect();
        let old_root = merkle::root_hash(&hashes[..3]);
        let new_root = merkle::root_hash(&hashes[..6]);
        let proof = merkle::consistency_proof(&hashes, 3);
        assert!(verify_consistency(&old_root, 3, &new_root, 6, &proof).is_ok());
        assert!(verify_consistency(&old_root, 3, &kt_crypto::sha256(b"fake"), 6, &proof).is_err());
    }

    #[test]
    fn verify_revision_chain_flags_mismatched_initial_flag() {
        let sk = SecretKey::new();
        let (committed, commitment) = Committed::seal(b"profile".to_vec());
        let _ = committed;
        let entry = Entry {
            index: Index([1u8; 32]),
            commitment,
            authorized_keys: AuthorizedKeys::new(sk.public()),
            previous: hash::ZERO_DIGEST,
        };
        let signed = SignedEntry::sign(entry, &[&sk]);
        let ok = MutationProof { mutation: signed.clone(), preimage_inclusion: None };
        assert!(verify_revision_chain(&[ok]).is_ok());

        let bad = MutationProof { mutation: signed, preimage_inclusion: Some(vec![1, 2, 3]) };
        assert!(verify_revision_chain(&[bad]).is_err());
    }
}
