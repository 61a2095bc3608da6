// Copyright © 2026 Key Transparency Contributors
// SPDX-License-Identifier: Apache-2.0

//! Glues the admin surface (directory lifecycle) and the write/read paths
//! (§4, §6) to a per-process [`kt_directory::DirectoryRegistry`], and owns
//! the sequencer task each live directory runs (grounded on
//! `node-lib::node::Node`, which plays the analogous role of holding every
//! running subsystem's task handle for the process).

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use kt_core::{Directory, DirectoryId, EntryUpdate, Index, UserId};
use kt_crypto::vrf;
use kt_directory::{
    BatchGetUserResponse, CommittedStore, CreateDirectory, DirectoryDeps, DirectoryError, DirectoryRegistry,
    DroppedMutation, GetRevisionResponse, GetUserResponse, ListMutationsPage, Prover,
};
use kt_log::InMemoryLogBackend;
use kt_map::InMemoryMapBackend;
use kt_queue::InMemoryQueueStore;
use tokio::sync::{broadcast, watch, RwLock};
use tokio::task::JoinHandle;
use tracing::info;

use crate::cfg::Cfg;

/// Everything the service keeps per live directory: the backends, the read
/// path, and the handle to stop its sequencer task.
struct DirectoryHandle {
    deps: DirectoryDeps,
    prover: Prover,
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

/// Process-wide service: one [`DirectoryRegistry`] plus a live sequencer
/// task per non-deleted directory. Cheap to clone (everything behind an
/// `Arc`); the RPC and gateway layers each hold their own clone.
#[derive(Clone)]
pub struct Service {
    registry: Arc<DirectoryRegistry>,
    directories: Arc<RwLock<BTreeMap<DirectoryId, DirectoryHandle>>>,
    cfg: Cfg,
    last_activity_millis: Arc<AtomicU64>,
}

fn now_millis() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis() as u64
}

/// Revision-publish broadcast capacity: generous enough that a subscriber
/// reading at a normal pace never drops a revision, matching the queue
/// batch limit's order of magnitude.
const REVISION_CHANNEL_CAPACITY: usize = 256;

impl Service {
    pub fn new(cfg: Cfg) -> Self {
        Self {
            registry: Arc::new(DirectoryRegistry::new()),
            directories: Arc::new(RwLock::new(BTreeMap::new())),
            cfg,
            last_activity_millis: Arc::new(AtomicU64::new(now_millis())),
        }
    }

    /// Records a request as of now, resetting the `--linger-timeout`
    /// idle clock (§ admin glue, `node.rs`'s linger task).
    pub fn touch(&self) {
        self.last_activity_millis.store(now_millis(), Ordering::Relaxed);
    }

    /// Time elapsed since the last call to [`Self::touch`].
    pub fn idle_for(&self) -> Duration {
        Duration::from_millis(now_millis().saturating_sub(self.last_activity_millis.load(Ordering::Relaxed)))
    }

    fn new_backends(&self) -> (DirectoryDeps, Arc<kt_directory::MutationLog>) {
        // `self.cfg.backend` only ever names `BackendKind::InMemory` today
        // (§ Non-goals: durable storage is out of scope), but the match
        // keeps the call site honest if a second backend kind is added.
        match self.cfg.backend {
            crate::args::BackendKind::InMemory => {
                let mutation_log = Arc::new(kt_directory::MutationLog::new());
                let deps = DirectoryDeps {
                    map: Arc::new(InMemoryMapBackend::new()),
                    log: Arc::new(InMemoryLogBackend::new()),
                    queue: Arc::new(InMemoryQueueStore::new()),
                    mutation_log: mutation_log.clone(),
                    vrf_secret_key: kt_crypto::VrfSecretKey::new(),
                    map_id: String::new(),
                    log_id: String::new(),
                    batch_limit: kt_directory::sequencer::DEFAULT_BATCH_LIMIT,
                };
                (deps, mutation_log)
            },
        }
    }

    fn spawn_sequencer(&self, meta: &Directory, deps: DirectoryDeps) -> (watch::Sender<bool>, JoinHandle<()>, Prover) {
        let (publish_tx, _rx) = broadcast::channel(REVISION_CHANNEL_CAPACITY);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let prover = Prover {
            directory_id: meta.directory_id.clone(),
            vrf_public_key: meta.vrf_public_key.clone(),
            deps: deps.clone(),
            committed_store: Arc::new(CommittedStore::new()),
            revisions: publish_tx.clone(),
        };
        let task = tokio::spawn(kt_directory::sequencer::routine(
            meta.directory_id.clone(),
            deps,
            meta.min_interval,
            meta.max_interval,
            meta.skip_empty_revisions,
            publish_tx,
            shutdown_rx,
        ));
        (shutdown_tx, task, prover)
    }

    /// `CreateDirectory` (§6 admin surface): provisions fresh backends,
    /// registers the directory, and starts its sequencer.
    pub async fn create_directory(
        &self,
        directory_id: DirectoryId,
        min_interval: Option<Duration>,
        max_interval: Option<Duration>,
        skip_empty_revisions: Option<bool>,
    ) -> Result<Directory, DirectoryError> {
        let (mut deps, _mutation_log) = self.new_backends();
        deps.map_id = format!("{directory_id}-map");
        deps.log_id = format!("{directory_id}-log");

        let meta = self.registry.create(CreateDirectory {
            directory_id: directory_id.clone(),
            map_id: deps.map_id.clone(),
            log_id: deps.log_id.clone(),
            min_interval: min_interval.unwrap_or(self.cfg.directory_defaults.min_interval),
            max_interval: max_interval.unwrap_or(self.cfg.directory_defaults.max_interval),
            skip_empty_revisions: skip_empty_revisions.unwrap_or(self.cfg.directory_defaults.skip_empty_revisions),
        })?;
        deps.vrf_secret_key = self.registry.vrf_secret_key(&directory_id)?;

        let (shutdown, task, prover) = self.spawn_sequencer(&meta, deps.clone());
        self.directories.write().await.insert(directory_id, DirectoryHandle { deps, prover, shutdown, task });
        info!(directory_id = %meta.directory_id, "directory created");
        Ok(meta)
    }

    pub fn get_directory(&self, directory_id: &str) -> Result<Directory, DirectoryError> {
        self.registry.get(directory_id)
    }

    pub fn list_directories(&self) -> Vec<Directory> {
        self.registry.list()
    }

    /// `DeleteDirectory` (§6): stops the sequencer so it claims no new
    /// work, but keeps the backends registered so reads still succeed
    /// (§4.E continues serving history for a soft-deleted directory).
    pub async fn delete_directory(&self, directory_id: &str) -> Result<(), DirectoryError> {
        self.registry.delete(directory_id)?;
        if let Some(handle) = self.directories.read().await.get(directory_id) {
            let _ = handle.shutdown.send(true);
        }
        Ok(())
    }

    /// `UndeleteDirectory` (§6): reverses the soft-delete and starts a
    /// fresh sequencer task reusing the existing backends.
    pub async fn undelete_directory(&self, directory_id: &str) -> Result<Directory, DirectoryError> {
        let meta = self.registry.undelete(directory_id)?;
        let mut directories = self.directories.write().await;
        if let Some(old) = directories.remove(directory_id) {
            old.task.abort();
            let (shutdown, task, prover) = self.spawn_sequencer(&meta, old.deps.clone());
            directories.insert(directory_id.to_string(), DirectoryHandle { deps: old.deps, prover, shutdown, task });
        }
        Ok(meta)
    }

    /// `GarbageCollect` (§6): reclaims registry entries and backend task
    /// handles for directories past their soft-delete grace period.
    pub async fn garbage_collect(&self, grace_period: Duration) -> Vec<DirectoryId> {
        let removed = self.registry.garbage_collect(grace_period);
        let mut directories = self.directories.write().await;
        for id in &removed {
            if let Some(handle) = directories.remove(id) {
                let _ = handle.shutdown.send(true);
                handle.task.abort();
            }
        }
        removed
    }

    async fn prover(&self, directory_id: &str) -> Result<Prover, DirectoryError> {
        self.directories
            .read()
            .await
            .get(directory_id)
            .map(|h| h.prover.clone())
            .ok_or_else(|| DirectoryError::NotFound(directory_id.to_string()))
    }

    async fn deps(&self, directory_id: &str) -> Result<DirectoryDeps, DirectoryError> {
        self.directories
            .read()
            .await
            .get(directory_id)
            .map(|h| h.deps.clone())
            .ok_or_else(|| DirectoryError::NotFound(directory_id.to_string()))
    }

    /// `QueueEntryUpdate` (§4.C, §6): validates the update against a
    /// candidate view of the current leaf, then enqueues it. The
    /// sequencer re-validates against the authoritative leaf at apply
    /// time, so a race here only costs the caller a dropped mutation, not
    /// a consistency violation.
    pub async fn queue_entry_update(&self, directory_id: &str, update: EntryUpdate) -> Result<u64, DirectoryError> {
        let deps = self.deps(directory_id).await?;
        let candidate = kt_directory::current_leaf(&deps, &update.mutation.entry.index).await?;
        kt_core::validate(&update, candidate.as_ref(), &deps.vrf_secret_key, directory_id)?;
        if let Some(committed) = update.committed.clone() {
            let prover = self.prover(directory_id).await?;
            prover.committed_store.put(update.mutation.entry.index, committed);
        }
        let seq = deps.queue.enqueue(directory_id, update).await?;
        Ok(seq)
    }

    /// `BatchQueueUserUpdate` (§6): applies [`Self::queue_entry_update`] to
    /// each update independently; one rejection does not block the rest.
    pub async fn batch_queue_user_update(
        &self,
        directory_id: &str,
        updates: Vec<EntryUpdate>,
    ) -> Vec<Result<u64, DirectoryError>> {
        let mut results = Vec::with_capacity(updates.len());
        for update in updates {
            results.push(self.queue_entry_update(directory_id, update).await);
        }
        results
    }

    pub async fn get_user(
        &self,
        directory_id: &str,
        user_id: &[u8],
        last_verified_tree_size: Option<u64>,
    ) -> Result<GetUserResponse, DirectoryError> {
        self.prover(directory_id).await?.get_user(user_id, last_verified_tree_size).await
    }

    pub async fn batch_get_user(
        &self,
        directory_id: &str,
        user_ids: &[UserId],
    ) -> Result<BatchGetUserResponse, DirectoryError> {
        self.prover(directory_id).await?.batch_get_user(user_ids).await
    }

    pub async fn batch_get_user_index(
        &self,
        directory_id: &str,
        user_ids: &[UserId],
    ) -> Result<Vec<(UserId, Index, kt_crypto::VrfProof)>, DirectoryError> {
        Ok(self.prover(directory_id).await?.batch_get_user_index(user_ids))
    }

    pub async fn get_revision(
        &self,
        directory_id: &str,
        revision_number: u64,
        last_verified_tree_size: Option<u64>,
    ) -> Result<GetRevisionResponse, DirectoryError> {
        self.prover(directory_id).await?.get_revision(revision_number, last_verified_tree_size).await
    }

    pub async fn get_latest_revision(
        &self,
        directory_id: &str,
        last_verified_tree_size: Option<u64>,
    ) -> Result<GetRevisionResponse, DirectoryError> {
        self.prover(directory_id).await?.get_latest_revision(last_verified_tree_size).await
    }

    pub async fn list_mutations(
        &self,
        directory_id: &str,
        revision_number: u64,
        page_token: usize,
        page_size: usize,
    ) -> Result<ListMutationsPage, DirectoryError> {
        Ok(self.prover(directory_id).await?.list_mutations(revision_number, page_token, page_size))
    }

    pub async fn list_dropped_mutations(
        &self,
        directory_id: &str,
        revision_number: u64,
    ) -> Result<Vec<DroppedMutation>, DirectoryError> {
        Ok(self.prover(directory_id).await?.list_dropped_mutations(revision_number))
    }

    /// `ListEntryHistory` (§4.E).
    pub async fn list_entry_history(
        &self,
        directory_id: &str,
        user_id: &[u8],
        start_revision: u64,
        end_revision: u64,
        page_token: usize,
        page_size: usize,
    ) -> Result<kt_directory::ListHistoryPage, DirectoryError> {
        self.prover(directory_id).await?.list_entry_history(user_id, start_revision, end_revision, page_token, page_size).await
    }

    /// `BatchListUserRevisions` / `ListUserRevisions`'s batch form (§6).
    pub async fn batch_list_user_revisions(
        &self,
        directory_id: &str,
        user_ids: &[UserId],
        start_revision: u64,
        end_revision: u64,
        page_size: usize,
    ) -> Result<Vec<(UserId, Vec<kt_directory::HistoryEntry>)>, DirectoryError> {
        self.prover(directory_id).await?.batch_list_user_revisions(user_ids, start_revision, end_revision, page_size).await
    }

    pub async fn subscribe_revisions(
        &self,
        directory_id: &str,
    ) -> Result<broadcast::Receiver<kt_core::Revision>, DirectoryError> {
        Ok(self.prover(directory_id).await?.subscribe_revisions())
    }

    /// Resolves `user_id` to its map index without touching the map (§4.E
    /// `BatchGetUserIndex`'s single-user counterpart, used by the gateway
    /// to accept updates addressed by raw user id).
    pub async fn resolve_index(&self, directory_id: &str, user_id: &[u8]) -> Result<Index, DirectoryError> {
        let deps = self.deps(directory_id).await?;
        let (index_bytes, _) = vrf::compute(&deps.vrf_secret_key, directory_id, user_id);
        Ok(Index(index_bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kt_core::{AuthorizedKeys, Entry, SignedEntry};
    use kt_crypto::{hash, Committed, SecretKey};

    fn test_cfg() -> Cfg {
        Cfg {
            rpc_listen: "127.0.0.1:0".parse().unwrap(),
            gateway_listen: "127.0.0.1:0".parse().unwrap(),
            backend: crate::args::BackendKind::InMemory,
            directory_defaults: crate::cfg::DirectoryDefaults {
                min_interval: Duration::from_millis(10),
                max_interval: Duration::from_millis(100),
                skip_empty_revisions: true,
            },
            linger_timeout: None,
        }
    }

    #[tokio::test]
    async fn create_then_get_directory_round_trips() {
        let service = Service::new(test_cfg());
        let created = service.create_directory("d1".into(), None, None, None).await.unwrap();
        let fetched = service.get_directory("d1").unwrap();
        assert_eq!(created.directory_id, fetched.directory_id);
    }

    #[tokio::test]
    async fn queue_entry_update_then_read_after_tick() {
        let service = Service::new(test_cfg());
        service.create_directory("d1".into(), None, None, None).await.unwrap();

        let sk = SecretKey::new();
        let index = service.resolve_index("d1", b"alice").await.unwrap();
        let (committed, commitment) = Committed::seal(b"profile".to_vec());
        let entry = Entry { index, commitment, authorized_keys: AuthorizedKeys::new(sk.public()), previous: hash::ZERO_DIGEST };
        let signed = SignedEntry::sign(entry, &[&sk]);
        let update = EntryUpdate { user_id: b"alice".to_vec().into(), mutation: signed, committed: Some(committed) };

        let seq = service.queue_entry_update("d1", update).await.unwrap();
        assert_eq!(seq, 1);

        // Sequencer runs on its own interval; give it a beat to publish.
        tokio::time::sleep(Duration::from_millis(50)).await;
        let resp = service.get_user("d1", b"alice", None).await.unwrap();
        assert!(resp.revision_number >= 1);
    }

    #[tokio::test]
    async fn delete_keeps_directory_readable() {
        let service = Service::new(test_cfg());
        service.create_directory("d1".into(), None, None, None).await.unwrap();
        service.delete_directory("d1").await.unwrap();
        assert!(service.get_directory("d1").unwrap().is_deleted());
        assert!(service.get_user("d1", b"alice", None).await.is_ok());
    }

    #[tokio::test]
    async fn unknown_directory_is_not_found() {
        let service = Service::new(test_cfg());
        assert!(matches!(service.get_user("nope", b"alice", None).await.unwrap_err(), DirectoryError::NotFound(_)));
    }
}
