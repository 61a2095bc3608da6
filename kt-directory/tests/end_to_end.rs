// Copyright © 2026 Key Transparency Contributors
// SPDX-License-Identifier: Apache-2.0

//! End-to-end scenarios over a single in-memory directory, covering the
//! seed tests named by the data model's invariants: create-and-lookup,
//! authorized rotation, unauthorized rotation rejection, concurrent
//! updates to one user, stale `previous`, and consistency/inclusion across
//! revisions.

use kt_core::{Entry, EntryUpdate, SignedEntry};
use kt_crypto::{commitment, Committed, SecretKey};
use kt_directory::verify;
use kt_log::LogBackend;
use kt_map::LeafValue;
use kt_test::Harness;

fn signed_update(
    harness: &Harness,
    user_id: &[u8],
    previous: Option<&SignedEntry>,
    old_keys: &[&SecretKey],
    new_keys: &[&SecretKey],
    profile: &[u8],
) -> (EntryUpdate, Committed) {
    harness.make_update(user_id, previous, old_keys, new_keys, profile.to_vec())
}

#[tokio::test]
async fn create_and_lookup() {
    let mut d = Harness::new("d1");
    let k_a = SecretKey::new();
    let (update, committed) = signed_update(&d, b"alice", None, &[], &[&k_a], b"A");
    d.enqueue(update).await.unwrap();
    d.tick(false).await.unwrap().expect("revision published");

    let resp = d.prover.get_user(b"alice", None).await.unwrap();
    assert_eq!(resp.revision_number, 1);

    let index = verify::verify_vrf(&d.prover.vrf_public_key, "d1", b"alice", &resp.leaf.vrf_proof).unwrap();
    verify::verify_map_inclusion(&resp.signed_map_root.root_hash, &index, &resp.leaf.value, &resp.leaf.map_inclusion)
        .unwrap();

    let opened = commitment::open(&committed, match &resp.leaf.value {
        LeafValue::Present(bytes) => &Entry::decode(bytes).unwrap().commitment,
        LeafValue::Absent => panic!("alice must have a leaf"),
    })
    .unwrap();
    assert_eq!(opened, b"A");
}

#[tokio::test]
async fn authorized_rotation_advances_the_leaf() {
    let mut d = Harness::new("d1");
    let k_a = SecretKey::new();
    let (first, _) = signed_update(&d, b"alice", None, &[], &[&k_a], b"A");
    let first_signed = first.mutation.clone();
    d.enqueue(first).await.unwrap();
    d.tick(false).await.unwrap().unwrap();

    let k_a2 = SecretKey::new();
    let (rotated, _) = signed_update(&d, b"alice", Some(&first_signed), &[&k_a], &[&k_a2], b"B");
    d.enqueue(rotated).await.unwrap();
    d.tick(false).await.unwrap().expect("rotation published");

    let resp = d.prover.get_user(b"alice", None).await.unwrap();
    assert_eq!(resp.revision_number, 2);
    let LeafValue::Present(bytes) = &resp.leaf.value else { panic!("alice must still have a leaf") };
    let entry = Entry::decode(bytes).unwrap();
    assert!(entry.authorized_keys.contains(&k_a2.public()));
    assert!(!entry.authorized_keys.contains(&k_a.public()));
}

#[tokio::test]
async fn unauthorized_rotation_is_dropped_not_applied() {
    let mut d = Harness::new("d1");
    let k_a = SecretKey::new();
    let (first, _) = signed_update(&d, b"alice", None, &[], &[&k_a], b"A");
    let first_signed = first.mutation.clone();
    d.enqueue(first).await.unwrap();
    d.tick(false).await.unwrap().unwrap();

    // Signed only by the new key, unknown to the old authorized set.
    let k_a2 = SecretKey::new();
    let (rotated, _) = signed_update(&d, b"alice", Some(&first_signed), &[], &[&k_a2], b"B");
    d.enqueue(rotated).await.unwrap();
    let outcome = d.tick(false).await.unwrap();

    match outcome {
        None => {}, // nothing applied, no revision published at all
        Some(outcome) => {
            let page = d.prover.list_mutations(outcome.revision.revision_number, 0, 10);
            assert!(page.mutations.is_empty(), "unauthorized rotation must never appear in ListMutations");
        },
    }

    let resp = d.prover.get_user(b"alice", None).await.unwrap();
    let LeafValue::Present(bytes) = &resp.leaf.value else { panic!("alice must still have a leaf") };
    let entry = Entry::decode(bytes).unwrap();
    assert!(entry.authorized_keys.contains(&k_a.public()), "leaf must be unchanged by the rejected rotation");
}

#[tokio::test]
async fn concurrent_chained_updates_to_same_user_both_apply_in_one_revision() {
    let mut d = Harness::new("d1");
    let k_a = SecretKey::new();
    let (u1, _) = signed_update(&d, b"alice", None, &[], &[&k_a], b"A");
    let u1_signed = u1.mutation.clone();

    let k_a2 = SecretKey::new();
    let (u2, _) = signed_update(&d, b"alice", Some(&u1_signed), &[&k_a], &[&k_a2], b"B");

    d.enqueue(u1).await.unwrap();
    d.enqueue(u2).await.unwrap();
    let outcome = d.tick(false).await.unwrap().expect("revision published");

    let page = d.prover.list_mutations(outcome.revision.revision_number, 0, 10);
    assert_eq!(page.mutations.len(), 2, "both chained updates apply within the same batch");
    // Second mutation chains off the first's in-batch result, so it carries
    // no pre-image inclusion proof of its own (§4.D step 3 commentary).
    assert!(page.mutations[1].preimage_inclusion.is_none());

    let resp = d.prover.get_user(b"alice", None).await.unwrap();
    let LeafValue::Present(bytes) = &resp.leaf.value else { panic!("alice must have a leaf") };
    let entry = Entry::decode(bytes).unwrap();
    assert!(entry.authorized_keys.contains(&k_a2.public()));
}

#[tokio::test]
async fn stale_previous_only_one_of_two_competing_updates_applies() {
    let mut d = Harness::new("d1");
    let k_a = SecretKey::new();
    let (first, _) = signed_update(&d, b"alice", None, &[], &[&k_a], b"A");
    let first_signed = first.mutation.clone();
    d.enqueue(first).await.unwrap();
    d.tick(false).await.unwrap().unwrap();

    let k_b = SecretKey::new();
    let k_c = SecretKey::new();
    let (u1, _) = signed_update(&d, b"alice", Some(&first_signed), &[&k_a], &[&k_b], b"B");
    let (u1_prime, _) = signed_update(&d, b"alice", Some(&first_signed), &[&k_a], &[&k_c], b"C");

    d.enqueue(u1).await.unwrap();
    d.enqueue(u1_prime).await.unwrap();
    let outcome = d.tick(false).await.unwrap().expect("revision published");

    let page = d.prover.list_mutations(outcome.revision.revision_number, 0, 10);
    assert_eq!(page.mutations.len(), 1, "only the first of two competing updates with the same previous applies");
    let dropped = d.prover.list_dropped_mutations(outcome.revision.revision_number);
    assert_eq!(dropped.len(), 1);
}

#[tokio::test]
async fn consistency_and_inclusion_hold_across_revisions() {
    let mut d = Harness::new("d1");
    for i in 0..5u8 {
        let sk = SecretKey::new();
        let (update, _) = signed_update(&d, &[i], None, &[], &[&sk], b"profile");
        d.enqueue(update).await.unwrap();
        d.tick(false).await.unwrap().expect("revision published");
    }

    // GetRevision(3, last_verified_tree_size=2) must carry a non-empty
    // consistency proof between tree sizes 2 and the current log size, and
    // a log-inclusion proof placing map_root_3 at log index 3.
    let resp = d.prover.get_revision(3, Some(2)).await.unwrap();
    let consistency_proof = resp.log_consistency.expect("consistency proof requested");
    assert_eq!(consistency_proof.len() % 32, 0, "proof is a flat run of 32-byte digests");

    let log_root = d.deps.log.latest_root(&d.deps.log_id).await.unwrap();
    assert_eq!(log_root.tree_size, 5);
    let log_inclusion = decode_digests(&resp.log_inclusion);
    let backend_proof = d.deps.log.inclusion_proof(&d.deps.log_id, 3, log_root.tree_size).await.unwrap();
    assert_eq!(log_inclusion, backend_proof, "prover's encoded inclusion proof round-trips to the backend's own");

    // Without a prior checkpoint, no consistency proof is produced.
    let latest = d.prover.get_latest_revision(None).await.unwrap();
    assert!(latest.log_consistency.is_none());
}

fn decode_digests(bytes: &[u8]) -> Vec<kt_crypto::hash::Digest> {
    bytes.chunks_exact(32).map(|c| c.try_into().unwrap()).collect()
}
