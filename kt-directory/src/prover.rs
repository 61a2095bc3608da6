// Copyright © 2026 Key Transparency Contributors
// SPDX-License-Identifier: Apache-2.0

//! §4.E Prover / Read Path.
//!
//! Every read returns, alongside the requested value, the minimal set of
//! proofs a verifier needs: the VRF proof binding `user_id` to `index`,
//! the map-inclusion proof of the leaf at some revision, the log-inclusion
//! proof that revision's root sits at the right log index, and (when the
//! caller supplies `last_verified_tree_size`) a log-consistency proof.
//! Handlers are stateless per request and fully concurrent — a read call
//! takes a snapshot of the latest revision once at the start and serves
//! the whole response from it.
//!
//! A historical revision's `SignedMapRoot` (specifically
//! `highest_fully_completed_seq`) is not recoverable from the map backend
//! alone, since [`kt_map::MapBackend::latest_root`] only ever reports the
//! *current* revision's watermark; the prover instead reads it back from
//! [`MutationLog`], which the sequencer populates at publish time.

use std::sync::Arc;

use kt_core::{Committed, Index, MutationProof, SignedMapRoot, UserId};
use kt_crypto::{VrfProof, VrfPublicKey};
use kt_map::{LeafValue, MapProof};
use tokio::sync::broadcast;

use crate::error::DirectoryError;
use crate::mutation_log::MutationLog;
use crate::sequencer::{encode_proof, DirectoryDeps, DroppedMutation};

/// `(vrf_proof, map leaf value, map inclusion proof, committed opening?)`
/// (§3 "map leaf").
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct MapLeaf {
    pub vrf_proof: VrfProof,
    pub value: LeafValue,
    pub map_inclusion: MapProof,
    pub committed: Option<Committed>,
}

#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct GetUserResponse {
    pub revision_number: u64,
    pub signed_map_root: SignedMapRoot,
    pub log_inclusion: Vec<u8>,
    pub log_consistency: Option<Vec<u8>>,
    pub leaf: MapLeaf,
}

#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct BatchGetUserResponse {
    pub revision_number: u64,
    pub signed_map_root: SignedMapRoot,
    pub log_inclusion: Vec<u8>,
    pub leaves: Vec<(UserId, Index, MapLeaf)>,
}

#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct GetRevisionResponse {
    pub map_root: SignedMapRoot,
    pub log_inclusion: Vec<u8>,
    pub log_consistency: Option<Vec<u8>>,
}

#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct ListMutationsPage {
    pub mutations: Vec<MutationProof>,
    pub next_page_token: Option<usize>,
}

/// One revision's view of a single user's entry (§3 "history over a
/// `[start, end]` revision range"): a `(MapRoot, MapLeaf)` pair.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct HistoryEntry {
    pub revision_number: u64,
    pub signed_map_root: SignedMapRoot,
    pub leaf: MapLeaf,
}

#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct ListHistoryPage {
    pub entries: Vec<HistoryEntry>,
    pub next_page_token: Option<usize>,
}

/// In-memory store of `Committed` openings, keyed by index (§3: "stored
/// alongside the leaf but not part of the map leaf's authenticated
/// value"). The sequencer never sees these — a gateway layer populates
/// this store itself when it accepts an `EntryUpdate` with an opening
/// attached, independent of whether the mutation is later applied.
#[derive(Default)]
pub struct CommittedStore {
    openings: std::sync::RwLock<std::collections::BTreeMap<Index, Committed>>,
}

impl CommittedStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&self, index: Index, committed: Committed) {
        self.openings.write().expect("committed store lock poisoned").insert(index, committed);
    }

    pub fn get(&self, index: &Index) -> Option<Committed> {
        self.openings.read().expect("committed store lock poisoned").get(index).cloned()
    }
}

/// Serves point, batch, and streaming queries against a single directory's
/// backends (§4.E). Cheap to clone; every method takes its own consistent
/// snapshot of the latest published revision.
#[derive(Clone)]
pub struct Prover {
    pub directory_id: String,
    pub vrf_public_key: VrfPublicKey,
    pub deps: DirectoryDeps,
    pub committed_store: Arc<CommittedStore>,
    pub revisions: broadcast::Sender<kt_core::Revision>,
}

impl Prover {
    fn log_consistency_from(&self, last_verified_tree_size: Option<u64>, tree_size: u64) -> Option<u64> {
        last_verified_tree_size.filter(|&from| from > 0 && from <= tree_size)
    }

    async fn map_leaf(&self, index: &Index, revision_number: u64, user_id: &[u8]) -> Result<MapLeaf, DirectoryError> {
        let (_, vrf_proof) = kt_crypto::vrf::compute(&self.deps.vrf_secret_key, &self.directory_id, user_id);
        let mut leaves =
            self.deps.map.get_leaves(&self.deps.map_id, revision_number, std::slice::from_ref(index)).await?;
        let inclusion = leaves.pop().ok_or_else(|| {
            DirectoryError::InvalidArgument("map backend returned no leaf for the requested index".into())
        })?;
        let value = match inclusion.value {
            Some(bytes) => LeafValue::Present(bytes),
            None => LeafValue::Absent,
        };
        let committed = self.committed_store.get(index);
        Ok(MapLeaf { vrf_proof, value, map_inclusion: inclusion.proof, committed })
    }

    /// `GetUser(directory, user_id, last_verified_tree_size?)` (§4.E).
    pub async fn get_user(
        &self,
        user_id: &[u8],
        last_verified_tree_size: Option<u64>,
    ) -> Result<GetUserResponse, DirectoryError> {
        let latest = self.deps.map.latest_root(&self.deps.map_id).await?;
        let (index_bytes, _) = kt_crypto::vrf::compute(&self.deps.vrf_secret_key, &self.directory_id, user_id);
        let leaf = self.map_leaf(&Index(index_bytes), latest.revision_number, user_id).await?;
        let rev = self.get_revision(latest.revision_number, last_verified_tree_size).await?;
        Ok(GetUserResponse {
            revision_number: latest.revision_number,
            signed_map_root: rev.map_root,
            log_inclusion: rev.log_inclusion,
            log_consistency: rev.log_consistency,
            leaf,
        })
    }

    /// `BatchGetUser`: many leaves read against one common, latest-at-call
    /// revision (§4.E).
    pub async fn batch_get_user(&self, user_ids: &[UserId]) -> Result<BatchGetUserResponse, DirectoryError> {
        let latest = self.deps.map.latest_root(&self.deps.map_id).await?;
        let rev = self.get_revision(latest.revision_number, None).await?;
        let mut leaves = Vec::with_capacity(user_ids.len());
        for user_id in user_ids {
            let (index_bytes, _) =
                kt_crypto::vrf::compute(&self.deps.vrf_secret_key, &self.directory_id, user_id.as_ref());
            let index = Index(index_bytes);
            let leaf = self.map_leaf(&index, latest.revision_number, user_id.as_ref()).await?;
            leaves.push((user_id.clone(), index, leaf));
        }
        Ok(BatchGetUserResponse {
            revision_number: latest.revision_number,
            signed_map_root: rev.map_root,
            log_inclusion: rev.log_inclusion,
            leaves,
        })
    }

    /// `BatchGetUserIndex`: VRF proofs only, no map read (§4.E) — lets a
    /// caller batch-resolve indices without pinning a revision.
    pub fn batch_get_user_index(&self, user_ids: &[UserId]) -> Vec<(UserId, Index, VrfProof)> {
        user_ids
            .iter()
            .map(|user_id| {
                let (index_bytes, proof) =
                    kt_crypto::vrf::compute(&self.deps.vrf_secret_key, &self.directory_id, user_id.as_ref());
                (user_id.clone(), Index(index_bytes), proof)
            })
            .collect()
    }

    /// `GetRevision(directory, revision_number, last_verified_tree_size?)`
    /// (§4.E). `OutOfRange` if `revision_number` is beyond the latest
    /// published revision.
    pub async fn get_revision(
        &self,
        revision_number: u64,
        last_verified_tree_size: Option<u64>,
    ) -> Result<GetRevisionResponse, DirectoryError> {
        let latest = self.deps.map.latest_root(&self.deps.map_id).await?;
        if revision_number > latest.revision_number {
            return Err(DirectoryError::OutOfRange);
        }
        let map_root = self.deps.mutation_log.signed_map_root(&self.directory_id, revision_number).ok_or_else(|| {
            DirectoryError::InvalidArgument(format!("no published root recorded for revision {revision_number}"))
        })?;
        let log_root = self.deps.log.latest_root(&self.deps.log_id).await?;
        let log_inclusion =
            self.deps.log.inclusion_proof(&self.deps.log_id, revision_number, log_root.tree_size).await?;
        let log_consistency = match self.log_consistency_from(last_verified_tree_size, log_root.tree_size) {
            Some(from) => {
                let proof = self.deps.log.consistency_proof(&self.deps.log_id, from, log_root.tree_size).await?;
                Some(encode_proof(&proof))
            },
            None => None,
        };
        Ok(GetRevisionResponse { map_root, log_inclusion: encode_proof(&log_inclusion), log_consistency })
    }

    /// `GetLatestRevision` (§4.E).
    pub async fn get_latest_revision(
        &self,
        last_verified_tree_size: Option<u64>,
    ) -> Result<GetRevisionResponse, DirectoryError> {
        let latest = self.deps.map.latest_root(&self.deps.map_id).await?;
        self.get_revision(latest.revision_number, last_verified_tree_size).await
    }

    /// `ListMutations(directory, revision, page_token?, page_size?)`
    /// (§4.E). Each mutation returned was actually applied at
    /// `revision_number`; dropped mutations never appear here (§9 open
    /// question resolution — visible separately via
    /// [`Self::list_dropped_mutations`]).
    pub fn list_mutations(&self, revision_number: u64, page_token: usize, page_size: usize) -> ListMutationsPage {
        let (mutations, next_page_token) =
            self.deps.mutation_log.list_applied(&self.directory_id, revision_number, page_token, page_size);
        ListMutationsPage { mutations, next_page_token }
    }

    /// Mutations the sequencer dropped at `revision_number`, exposed as an
    /// operator/audit convenience rather than a queue-facing guarantee
    /// (§9 open question: "implementers may alternatively expose a
    /// 'rejected mutations' query").
    pub fn list_dropped_mutations(&self, revision_number: u64) -> Vec<DroppedMutation> {
        self.deps.mutation_log.dropped(&self.directory_id, revision_number)
    }

    /// `ListEntryHistory(directory, user_id, start, end, page_token?,
    /// page_size?)` (§4.E): one `(MapRoot, MapLeaf)` pair per revision in
    /// `[start, end]` (clamped to the latest published revision), oldest
    /// first. Each revision's leaf is read independently, so the cost is
    /// linear in the page size rather than the full range.
    pub async fn list_entry_history(
        &self,
        user_id: &[u8],
        start_revision: u64,
        end_revision: u64,
        page_token: usize,
        page_size: usize,
    ) -> Result<ListHistoryPage, DirectoryError> {
        let latest = self.deps.map.latest_root(&self.deps.map_id).await?;
        let end = end_revision.min(latest.revision_number);
        if start_revision > end {
            return Ok(ListHistoryPage { entries: Vec::new(), next_page_token: None });
        }
        let (index_bytes, _) = kt_crypto::vrf::compute(&self.deps.vrf_secret_key, &self.directory_id, user_id);
        let index = Index(index_bytes);
        let revisions: Vec<u64> = (start_revision..=end).collect();
        let mut entries = Vec::new();
        for &revision_number in revisions.iter().skip(page_token).take(page_size) {
            let signed_map_root = self.deps.mutation_log.signed_map_root(&self.directory_id, revision_number).ok_or_else(
                || DirectoryError::InvalidArgument(format!("no published root recorded for revision {revision_number}")),
            )?;
            let leaf = self.map_leaf(&index, revision_number, user_id).await?;
            entries.push(HistoryEntry { revision_number, signed_map_root, leaf });
        }
        let consumed = page_token + entries.len();
        let next_page_token = if consumed < revisions.len() { Some(consumed) } else { None };
        Ok(ListHistoryPage { entries, next_page_token })
    }

    /// `BatchListUserRevisions` (§6): [`Self::list_entry_history`] applied
    /// to several users against the same `[start, end]` range, each capped
    /// at `page_size` entries with no further pagination — a caller
    /// needing the full range for one user should page through
    /// [`Self::list_entry_history`] directly instead.
    pub async fn batch_list_user_revisions(
        &self,
        user_ids: &[UserId],
        start_revision: u64,
        end_revision: u64,
        page_size: usize,
    ) -> Result<Vec<(UserId, Vec<HistoryEntry>)>, DirectoryError> {
        let mut results = Vec::with_capacity(user_ids.len());
        for user_id in user_ids {
            let page = self.list_entry_history(user_id.as_ref(), start_revision, end_revision, 0, page_size).await?;
            results.push((user_id.clone(), page.entries));
        }
        Ok(results)
    }

    /// Subscribes to newly published revisions (§4.E
    /// `GetRevisionStream`/`ListMutationsStream`). The returned receiver
    /// drops intermediate revisions under back-pressure (broadcast
    /// channel semantics) rather than buffering unboundedly (§9 design
    /// note); a caller that falls too far behind should resubscribe and
    /// catch up via [`Self::get_revision`].
    pub fn subscribe_revisions(&self) -> broadcast::Receiver<kt_core::Revision> {
        self.revisions.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kt_core::{AuthorizedKeys, Entry, EntryUpdate, SignedEntry};
    use kt_crypto::{hash, Committed as CryptoCommitted, SecretKey, VrfSecretKey};
    use kt_log::InMemoryLogBackend;
    use kt_map::InMemoryMapBackend;
    use kt_queue::InMemoryQueueStore;

    fn make_deps(vrf_sk: VrfSecretKey) -> DirectoryDeps {
        DirectoryDeps {
            map: Arc::new(InMemoryMapBackend::new()),
            log: Arc::new(InMemoryLogBackend::new()),
            queue: Arc::new(InMemoryQueueStore::new()),
            mutation_log: Arc::new(MutationLog::new()),
            vrf_secret_key: vrf_sk,
            map_id: "m1".into(),
            log_id: "l1".into(),
            batch_limit: crate::sequencer::DEFAULT_BATCH_LIMIT,
        }
    }

    async fn publish_one_entry(deps: &DirectoryDeps, directory_id: &str, user_id: &[u8], sk: &SecretKey) {
        let (index_bytes, _) = kt_crypto::vrf::compute(&deps.vrf_secret_key, directory_id, user_id);
        let (committed, commitment) = CryptoCommitted::seal(b"profile".to_vec());
        let entry = Entry {
            index: Index(index_bytes),
            commitment,
            authorized_keys: AuthorizedKeys::new(sk.public()),
            previous: hash::ZERO_DIGEST,
        };
        let signed = SignedEntry::sign(entry, &[sk]);
        let update = EntryUpdate { user_id: user_id.to_vec().into(), mutation: signed, committed: Some(committed) };
        deps.queue.enqueue(directory_id, update).await.unwrap();
        let mut state = crate::sequencer::SequencerState::default();
        crate::sequencer::tick_once(directory_id, deps, &mut state, false).await.unwrap();
    }

    fn make_prover(deps: DirectoryDeps, directory_id: &str, vrf_pk: VrfPublicKey) -> Prover {
        let (tx, _rx) = broadcast::channel(16);
        Prover {
            directory_id: directory_id.to_string(),
            vrf_public_key: vrf_pk,
            deps,
            committed_store: Arc::new(CommittedStore::new()),
            revisions: tx,
        }
    }

    #[tokio::test]
    async fn get_user_returns_published_leaf_with_proofs() {
        let vrf_sk = VrfSecretKey::new();
        let vrf_pk = vrf_sk.public();
        let deps = make_deps(vrf_sk);
        let sk = SecretKey::new();
        publish_one_entry(&deps, "d1", b"alice", &sk).await;

        let prover = make_prover(deps, "d1", vrf_pk);
        let resp = prover.get_user(b"alice", None).await.unwrap();
        assert_eq!(resp.revision_number, 1);
        assert!(matches!(resp.leaf.value, LeafValue::Present(_)));
        assert!(resp.leaf.committed.is_none(), "committed store is populated by the gateway, not the sequencer");
    }

    #[tokio::test]
    async fn get_user_for_unknown_user_returns_absence_proof() {
        let vrf_sk = VrfSecretKey::new();
        let vrf_pk = vrf_sk.public();
        let deps = make_deps(vrf_sk);
        let sk = SecretKey::new();
        publish_one_entry(&deps, "d1", b"alice", &sk).await;

        let prover = make_prover(deps, "d1", vrf_pk);
        let resp = prover.get_user(b"mallory", None).await.unwrap();
        assert!(matches!(resp.leaf.value, LeafValue::Absent));
    }

    #[tokio::test]
    async fn get_revision_beyond_latest_is_out_of_range() {
        let vrf_sk = VrfSecretKey::new();
        let vrf_pk = vrf_sk.public();
        let deps = make_deps(vrf_sk);
        let sk = SecretKey::new();
        publish_one_entry(&deps, "d1", b"alice", &sk).await;

        let prover = make_prover(deps, "d1", vrf_pk);
        assert!(matches!(prover.get_revision(99, None).await.unwrap_err(), DirectoryError::OutOfRange));
    }

    #[tokio::test]
    async fn list_mutations_returns_only_applied_mutations() {
        let vrf_sk = VrfSecretKey::new();
        let vrf_pk = vrf_sk.public();
        let deps = make_deps(vrf_sk);
        let sk = SecretKey::new();
        publish_one_entry(&deps, "d1", b"alice", &sk).await;

        let prover = make_prover(deps, "d1", vrf_pk);
        let page = prover.list_mutations(1, 0, 10);
        assert_eq!(page.mutations.len(), 1);
        assert_eq!(page.next_page_token, None);
        assert!(page.mutations[0].preimage_inclusion.is_none(), "first-ever entry at an index needs no pre-image proof");
    }

    #[tokio::test]
    async fn batch_get_user_index_needs_no_map_read() {
        let vrf_sk = VrfSecretKey::new();
        let vrf_pk = vrf_sk.public();
        let deps = make_deps(vrf_sk);
        let prover = make_prover(deps, "d1", vrf_pk.clone());
        let results = prover.batch_get_user_index(&[UserId::from(b"alice".to_vec()), UserId::from(b"bob".to_vec())]);
        assert_eq!(results.len(), 2);
        for (user_id, index, proof) in &results {
            let verified = kt_crypto::vrf::verify(&vrf_pk, "d1", user_id.as_ref(), proof).unwrap();
            assert_eq!(verified, index.0);
        }
    }

    #[tokio::test]
    async fn batch_get_user_reads_multiple_leaves_at_one_revision() {
        let vrf_sk = VrfSecretKey::new();
        let vrf_pk = vrf_sk.public();
        let deps = make_deps(vrf_sk);
        let sk = SecretKey::new();
        publish_one_entry(&deps, "d1", b"alice", &sk).await;

        let prover = make_prover(deps, "d1", vrf_pk);
        let resp = prover
            .batch_get_user(&[UserId::from(b"alice".to_vec()), UserId::from(b"bob".to_vec())])
            .await
            .unwrap();
        assert_eq!(resp.leaves.len(), 2);
        assert!(matches!(resp.leaves[0].2.value, LeafValue::Present(_) | LeafValue::Absent));
    }
}
