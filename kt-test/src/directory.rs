// Copyright © 2026 Key Transparency Contributors
// SPDX-License-Identifier: Apache-2.0

//! An in-memory key transparency directory wired up end-to-end, for unit
//! and integration tests that would otherwise need to hand-assemble a
//! [`DirectoryDeps`] and a [`Prover`] themselves.

use std::sync::Arc;

use kt_core::{AuthorizedKeys, Entry, EntryUpdate, Index, SignedEntry, UserId};
use kt_crypto::{hash, Committed, SecretKey, VrfSecretKey};
use kt_directory::sequencer::{self, DirectoryDeps, SequencerState, TickOutcome};
use kt_directory::{CommittedStore, DirectoryError, MutationLog, Prover};
use kt_log::InMemoryLogBackend;
use kt_map::InMemoryMapBackend;
use kt_queue::{InMemoryQueueStore, QueueStore};
use tokio::sync::broadcast;

/// A single directory's backends and sequencer state, driven directly by
/// the test rather than on a wall-clock loop (mirrors `tick_once`'s own
/// doc comment: "so it can be driven directly in tests").
pub struct Harness {
    pub directory_id: String,
    pub vrf_secret_key: VrfSecretKey,
    pub deps: DirectoryDeps,
    pub prover: Prover,
    state: SequencerState,
}

impl Harness {
    /// Spins up a fresh directory with in-memory backends and no published
    /// revisions yet.
    pub fn new(directory_id: &str) -> Self {
        let vrf_secret_key = VrfSecretKey::new();
        let deps = DirectoryDeps {
            map: Arc::new(InMemoryMapBackend::new()),
            log: Arc::new(InMemoryLogBackend::new()),
            queue: Arc::new(InMemoryQueueStore::new()),
            mutation_log: Arc::new(MutationLog::new()),
            vrf_secret_key: vrf_secret_key.clone(),
            map_id: format!("{directory_id}-map"),
            log_id: format!("{directory_id}-log"),
            batch_limit: sequencer::DEFAULT_BATCH_LIMIT,
        };
        let (revisions, _) = broadcast::channel(16);
        let prover = Prover {
            directory_id: directory_id.to_string(),
            vrf_public_key: vrf_secret_key.public(),
            deps: deps.clone(),
            committed_store: Arc::new(CommittedStore::new()),
            revisions,
        };
        Self {
            directory_id: directory_id.to_string(),
            vrf_secret_key,
            deps,
            prover,
            state: SequencerState::default(),
        }
    }

    /// Builds a signed update for `user_id`: the first entry at that index
    /// if `previous` is `None`, otherwise a rotation chained off it.
    /// `old_keys` is empty for a first entry; for a rotation it must
    /// contain a key from the previous entry's `authorized_keys`.
    pub fn make_update(
        &self,
        user_id: &[u8],
        previous: Option<&SignedEntry>,
        old_keys: &[&SecretKey],
        new_keys: &[&SecretKey],
        profile: Vec<u8>,
    ) -> (EntryUpdate, Committed) {
        let (index, _proof) = kt_crypto::vrf::compute(&self.vrf_secret_key, &self.directory_id, user_id);
        let (committed, commitment) = Committed::seal(profile);
        let authorized_keys =
            AuthorizedKeys::try_from_iter(new_keys.iter().map(|sk| sk.public())).expect("at least one new key");
        let entry = Entry {
            index: Index(index),
            commitment,
            authorized_keys,
            previous: previous.map(SignedEntry::digest).unwrap_or(hash::ZERO_DIGEST),
        };
        let signers: Vec<&SecretKey> = old_keys.iter().chain(new_keys.iter()).copied().collect();
        let signed = SignedEntry::sign(entry, &signers);
        let update = EntryUpdate { user_id: UserId::from(user_id.to_vec()), mutation: signed, committed: Some(committed.clone()) };
        (update, committed)
    }

    /// Enqueues `update` and returns its assigned sequence number.
    pub async fn enqueue(&self, update: EntryUpdate) -> Result<u64, DirectoryError> {
        Ok(self.deps.queue.enqueue(&self.directory_id, update).await?)
    }

    /// Runs one sequencer tick over everything currently queued.
    pub async fn tick(&mut self, force_empty: bool) -> Result<Option<TickOutcome>, DirectoryError> {
        let outcome = sequencer::tick_once(&self.directory_id, &self.deps, &mut self.state, force_empty).await?;
        if let Some(outcome) = &outcome {
            let _ = self.prover.revisions.send(outcome.revision.clone());
        }
        Ok(outcome)
    }
}
