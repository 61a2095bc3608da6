// Copyright © 2026 Key Transparency Contributors
// SPDX-License-Identifier: Apache-2.0

//! `QueueStore` (§4.C): `Enqueue`, `ReadRange`, `HighWaterMark`.
//!
//! Totally ordered per directory; no coupling across directories. `seq`
//! starts at `1` so `0` can mean "nothing has been enqueued yet" without
//! an `Option`.

use std::collections::BTreeMap;
use std::sync::RwLock;

use async_trait::async_trait;
use kt_core::EntryUpdate;
use tracing::trace;

use crate::error::QueueError;

#[async_trait]
pub trait QueueStore: Send + Sync {
    /// Appends `update` and returns its assigned sequence number.
    async fn enqueue(&self, directory_id: &str, update: EntryUpdate) -> Result<u64, QueueError>;

    /// Returns up to `max_n` entries starting at `from_seq` (inclusive), in
    /// sequence order.
    async fn read_range(
        &self,
        directory_id: &str,
        from_seq: u64,
        max_n: usize,
    ) -> Result<Vec<(u64, EntryUpdate)>, QueueError>;

    /// The largest sequence number ever enqueued for `directory_id`, or
    /// `0` if the queue is empty or unknown.
    async fn high_water_mark(&self, directory_id: &str) -> u64;
}

#[derive(Default)]
struct DirectoryQueue {
    entries: BTreeMap<u64, EntryUpdate>,
    next_seq: u64,
}

/// In-memory [`QueueStore`], one [`DirectoryQueue`] per directory.
#[derive(Default)]
pub struct InMemoryQueueStore {
    directories: RwLock<BTreeMap<String, DirectoryQueue>>,
}

impl InMemoryQueueStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl QueueStore for InMemoryQueueStore {
    async fn enqueue(&self, directory_id: &str, update: EntryUpdate) -> Result<u64, QueueError> {
        let mut directories = self.directories.write().expect("queue lock poisoned");
        let queue = directories.entry(directory_id.to_string()).or_default();
        queue.next_seq += 1;
        let seq = queue.next_seq;
        queue.entries.insert(seq, update);
        trace!(directory_id, seq, "mutation enqueued");
        Ok(seq)
    }

    async fn read_range(
        &self,
        directory_id: &str,
        from_seq: u64,
        max_n: usize,
    ) -> Result<Vec<(u64, EntryUpdate)>, QueueError> {
        let directories = self.directories.read().expect("queue lock poisoned");
        let queue = directories.get(directory_id).ok_or_else(|| QueueError::UnknownDirectory(directory_id.to_string()))?;
        Ok(queue
            .entries
            .range(from_seq..)
            .take(max_n)
            .map(|(seq, update)| (*seq, update.clone()))
            .collect())
    }

    async fn high_water_mark(&self, directory_id: &str) -> u64 {
        let directories = self.directories.read().expect("queue lock poisoned");
        directories.get(directory_id).map(|q| q.next_seq).unwrap_or(0)
    }
}
