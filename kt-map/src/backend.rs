// Copyright © 2026 Key Transparency Contributors
// SPDX-License-Identifier: Apache-2.0

//! `MapBackend` (§6): `SetLeaves`, `GetLeaves`, `LatestRoot`.
//!
//! Grounded on the revision-snapshot shape of `Directory::publish` in the
//! `vkd_ozks` example: each call to [`MapBackend::set_leaves`] produces a
//! new, immutable revision built from the previous one plus a batch of
//! writes, never mutating a published revision in place.

use std::collections::BTreeMap;
use std::sync::RwLock;

use async_trait::async_trait;
use kt_crypto::{hash::Digest, SecretKey};
use tracing::debug;

use crate::error::MapError;
use crate::smt::{self, LeafValue, MapProof};
use crate::Index;

#[derive(Clone, Debug)]
pub struct MapLeafInclusion {
    pub index: Index,
    pub value: Option<Vec<u8>>,
    pub proof: MapProof,
}

#[derive(Clone, Debug)]
pub struct MapRoot {
    pub revision_number: u64,
    pub root_hash: Digest,
    pub signature: Vec<u8>,
}

/// Storage-agnostic interface to the sparse Merkle map (§6). Implemented
/// once in-memory here (`kt-test` wires it into end-to-end scenarios); a
/// durable backend would implement the same trait over a KV store keyed by
/// `(map_id, revision_number, index)`.
#[async_trait]
pub trait MapBackend: Send + Sync {
    /// Writes a batch of leaves as a new revision built on top of
    /// `map_id`'s latest revision, and returns its signed root.
    async fn set_leaves(
        &self,
        map_id: &str,
        writes: Vec<(Index, Vec<u8>)>,
    ) -> Result<MapRoot, MapError>;

    /// Looks up `indices` as of `revision_number`, with inclusion (or
    /// absence) proofs against that revision's root.
    async fn get_leaves(
        &self,
        map_id: &str,
        revision_number: u64,
        indices: &[Index],
    ) -> Result<Vec<MapLeafInclusion>, MapError>;

    async fn latest_root(&self, map_id: &str) -> Result<MapRoot, MapError>;
}

struct MapState {
    signing_key: SecretKey,
    /// `revisions[r]` is the full, sorted leaf set as of revision `r`.
    /// Kept as independent snapshots for proof simplicity; a production
    /// backend would instead persist only the per-revision diff and a
    /// path-compressed trie, per the design note.
    revisions: Vec<BTreeMap<Index, Vec<u8>>>,
}

/// In-memory [`MapBackend`], one [`MapState`] per `map_id`.
pub struct InMemoryMapBackend {
    maps: RwLock<BTreeMap<String, MapState>>,
}

impl InMemoryMapBackend {
    pub fn new() -> Self {
        Self { maps: RwLock::new(BTreeMap::new()) }
    }

    fn sorted_leaves(map: &BTreeMap<Index, Vec<u8>>) -> Vec<(Index, LeafValue)> {
        map.iter().map(|(index, value)| (*index, LeafValue::Present(value.clone()))).collect()
    }
}

impl Default for InMemoryMapBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MapBackend for InMemoryMapBackend {
    async fn set_leaves(&self, map_id: &str, writes: Vec<(Index, Vec<u8>)>) -> Result<MapRoot, MapError> {
        let mut maps = self.maps.write().expect("map lock poisoned");
        let state = maps.entry(map_id.to_string()).or_insert_with(|| MapState {
            signing_key: SecretKey::new(),
            revisions: vec![BTreeMap::new()],
        });
        let mut next = state.revisions.last().expect("at least the empty revision").clone();
        for (index, value) in writes {
            next.insert(index, value);
        }
        let leaves = Self::sorted_leaves(&next);
        let root_hash = smt::build_root(&leaves);
        let revision_number = state.revisions.len() as u64;
        state.revisions.push(next);
        let signature = state.signing_key.sign(&root_hash).to_bytes();
        debug!(map_id, revision_number, "map revision written");
        Ok(MapRoot { revision_number, root_hash, signature })
    }

    async fn get_leaves(
        &self,
        map_id: &str,
        revision_number: u64,
        indices: &[Index],
    ) -> Result<Vec<MapLeafInclusion>, MapError> {
        // A map that has never had `set_leaves` called is still a valid
        // map at revision 0 with no leaves (§3: "revision_number ≥ 0"), so
        // this lazily initializes just like `set_leaves` does rather than
        // treating an untouched directory as unreadable.
        let mut maps = self.maps.write().expect("map lock poisoned");
        let state = maps.entry(map_id.to_string()).or_insert_with(|| MapState {
            signing_key: SecretKey::new(),
            revisions: vec![BTreeMap::new()],
        });
        let revision = state
            .revisions
            .get(revision_number as usize)
            .ok_or(MapError::UnknownRevision(revision_number))?;
        let leaves = Self::sorted_leaves(revision);
        Ok(indices
            .iter()
            .map(|index| {
                let proof = smt::build_proof(&leaves, index);
                let value = revision.get(index).cloned();
                MapLeafInclusion { index: *index, value, proof }
            })
            .collect())
    }

    async fn latest_root(&self, map_id: &str) -> Result<MapRoot, MapError> {
        let mut maps = self.maps.write().expect("map lock poisoned");
        let state = maps.entry(map_id.to_string()).or_insert_with(|| MapState {
            signing_key: SecretKey::new(),
            revisions: vec![BTreeMap::new()],
        });
        let revision_number = (state.revisions.len() - 1) as u64;
        let revision = &state.revisions[revision_number as usize];
        let leaves = Self::sorted_leaves(revision);
        let root_hash = smt::build_root(&leaves);
        let signature = state.signing_key.sign(&root_hash).to_bytes();
        Ok(MapRoot { revision_number, root_hash, signature })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn idx(b: u8) -> Index {
        let mut bytes = [0u8; 32];
        bytes[0] = b;
        Index(bytes)
    }

    #[tokio::test]
    async fn set_then_get_round_trips_and_advances_revision() {
        let backend = InMemoryMapBackend::new();
        let r0 = backend.latest_root("m1").await.unwrap();
        assert_eq!(r0.revision_number, 0);

        let r1 = backend.set_leaves("m1", vec![(idx(1), b"alice".to_vec())]).await.unwrap();
        assert_eq!(r1.revision_number, 1);
        assert_ne!(r1.root_hash, r0.root_hash);

        let leaves = backend.get_leaves("m1", 1, &[idx(1), idx(2)]).await.unwrap();
        assert_eq!(leaves[0].value, Some(b"alice".to_vec()));
        assert_eq!(leaves[1].value, None);
    }

    #[tokio::test]
    async fn unknown_revision_errors() {
        let backend = InMemoryMapBackend::new();
        backend.set_leaves("m1", vec![(idx(1), b"alice".to_vec())]).await.unwrap();
        assert!(matches!(
            backend.get_leaves("m1", 99, &[idx(1)]).await.unwrap_err(),
            MapError::UnknownRevision(99)
        ));
    }

    #[tokio::test]
    async fn revisions_are_independent_snapshots() {
        let backend = InMemoryMapBackend::new();
        backend.set_leaves("m1", vec![(idx(1), b"v1".to_vec())]).await.unwrap();
        backend.set_leaves("m1", vec![(idx(1), b"v2".to_vec())]).await.unwrap();

        let at_r1 = backend.get_leaves("m1", 1, &[idx(1)]).await.unwrap();
        let at_r2 = backend.get_leaves("m1", 2, &[idx(1)]).await.unwrap();
        assert_eq!(at_r1[0].value, Some(b"v1".to_vec()));
        assert_eq!(at_r2[0].value, Some(b"v2".to_vec()));
    }
}
