// Copyright © 2026 Key Transparency Contributors
// SPDX-License-Identifier: Apache-2.0

//! Per-revision record of which mutations the sequencer actually applied
//! (§4.E `ListMutations`).
//!
//! The map backend only stores the latest `Entry` bytes per index; it does
//! not retain the `SignedEntry` (with signatures) that the sequencer
//! accepted, nor which mutations were dropped at sequencing time (§4.D
//! step 3, §9 open question on rejected-mutation visibility). This module
//! is the sequencer's side-channel for that bookkeeping, queried by the
//! prover's `ListMutations` / `ListMutationsStream` (§4.E).
//!
//! In-memory only, mirroring the other backends in this crate; a durable
//! deployment would persist this alongside the queue.

use std::collections::BTreeMap;
use std::sync::RwLock;

use kt_core::{MutationProof, SignedMapRoot};

use crate::sequencer::DroppedMutation;

#[derive(Clone, Debug)]
pub struct RevisionMutations {
    pub signed_map_root: SignedMapRoot,
    pub applied: Vec<MutationProof>,
    pub dropped: Vec<DroppedMutation>,
}

/// In-memory, append-only per-directory table of `revision_number →
/// RevisionMutations`.
#[derive(Default)]
pub struct MutationLog {
    directories: RwLock<BTreeMap<String, BTreeMap<u64, RevisionMutations>>>,
}

impl MutationLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, directory_id: &str, revision_number: u64, record: RevisionMutations) {
        let mut directories = self.directories.write().expect("mutation log lock poisoned");
        directories.entry(directory_id.to_string()).or_default().insert(revision_number, record);
    }

    /// Applied mutations for `revision_number`, paginated by an opaque
    /// offset token (§4.E "Pagination is forward-only via an opaque
    /// `page_token`").
    pub fn list_applied(
        &self,
        directory_id: &str,
        revision_number: u64,
        page_token: usize,
        page_size: usize,
    ) -> (Vec<MutationProof>, Option<usize>) {
        let directories = self.directories.read().expect("mutation log lock poisoned");
        let Some(record) = directories.get(directory_id).and_then(|r| r.get(&revision_number)) else {
            return (Vec::new(), None);
        };
        let page: Vec<_> = record.applied.iter().skip(page_token).take(page_size).cloned().collect();
        let next = if page_token + page.len() < record.applied.len() { Some(page_token + page.len()) } else { None };
        (page, next)
    }

    pub fn dropped(&self, directory_id: &str, revision_number: u64) -> Vec<DroppedMutation> {
        let directories = self.directories.read().expect("mutation log lock poisoned");
        directories
            .get(directory_id)
            .and_then(|r| r.get(&revision_number))
            .map(|r| r.dropped.clone())
            .unwrap_or_default()
    }

    /// The certified map root the sequencer published for `revision_number`,
    /// including `highest_fully_completed_seq` — not recoverable from the
    /// map backend alone, since `MapBackend::latest_root` only knows the
    /// *current* revision's root, not a historical one's queue watermark.
    pub fn signed_map_root(&self, directory_id: &str, revision_number: u64) -> Option<SignedMapRoot> {
        let directories = self.directories.read().expect("mutation log lock poisoned");
        directories.get(directory_id).and_then(|r| r.get(&revision_number)).map(|r| r.signed_map_root.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_root(revision_number: u64) -> SignedMapRoot {
        SignedMapRoot {
            root_hash: [0u8; 32],
            signature: vec![],
            revision_number,
            highest_fully_completed_seq: 0,
        }
    }

    #[test]
    fn pagination_advances_and_terminates() {
        let log = MutationLog::new();
        let record = RevisionMutations { signed_map_root: sample_root(1), applied: vec![], dropped: vec![] };
        log.record("d1", 1, record);
        let (page, next) = log.list_applied("d1", 1, 0, 10);
        assert!(page.is_empty());
        assert_eq!(next, None);
        assert_eq!(log.signed_map_root("d1", 1).unwrap().revision_number, 1);
    }

    #[test]
    fn unknown_revision_returns_empty() {
        let log = MutationLog::new();
        let (page, next) = log.list_applied("d1", 5, 0, 10);
        assert!(page.is_empty());
        assert_eq!(next, None);
    }
}
