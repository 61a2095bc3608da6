// Copyright © 2026 Key Transparency Contributors
// SPDX-License-Identifier: Apache-2.0

//! `LogBackend` (§6): `Append`, `InclusionProof`, `ConsistencyProof`,
//! `LatestRoot`.

use std::collections::BTreeMap;
use std::sync::RwLock;

use async_trait::async_trait;
use kt_crypto::{hash::Digest, SecretKey};
use tracing::debug;

use crate::error::LogError;
use crate::merkle;

#[derive(Clone, Debug)]
pub struct LogRoot {
    pub tree_size: u64,
    pub root_hash: Digest,
    pub signature: Vec<u8>,
}

#[async_trait]
pub trait LogBackend: Send + Sync {
    /// Appends `entry` to `log_id`'s log and returns the new tree's signed
    /// root (§4.D step 5: the sequencer anchors one entry per revision).
    async fn append(&self, log_id: &str, entry: Vec<u8>) -> Result<LogRoot, LogError>;

    /// Proves that the entry at `leaf_index` (0-based) is included in the
    /// tree of size `tree_size`.
    async fn inclusion_proof(&self, log_id: &str, leaf_index: u64, tree_size: u64) -> Result<Vec<Digest>, LogError>;

    /// Proves that the tree of size `first_size` is a prefix of the tree
    /// of size `second_size` (§3 invariant 4).
    async fn consistency_proof(&self, log_id: &str, first_size: u64, second_size: u64) -> Result<Vec<Digest>, LogError>;

    async fn latest_root(&self, log_id: &str) -> Result<LogRoot, LogError>;
}

struct LogState {
    signing_key: SecretKey,
    leaves: Vec<Digest>,
}

/// In-memory [`LogBackend`], one [`LogState`] per `log_id`.
pub struct InMemoryLogBackend {
    logs: RwLock<BTreeMap<String, LogState>>,
}

impl InMemoryLogBackend {
    pub fn new() -> Self {
        Self { logs: RwLock::new(BTreeMap::new()) }
    }
}

impl Default for InMemoryLogBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LogBackend for InMemoryLogBackend {
    async fn append(&self, log_id: &str, entry: Vec<u8>) -> Result<LogRoot, LogError> {
        let mut logs = self.logs.write().expect("log lock poisoned");
        let state = logs
            .entry(log_id.to_string())
            .or_insert_with(|| LogState { signing_key: SecretKey::new(), leaves: Vec::new() });
        state.leaves.push(merkle::leaf_hash(&entry));
        let root_hash = merkle::root_hash(&state.leaves);
        let tree_size = state.leaves.len() as u64;
        let signature = state.signing_key.sign(&root_hash).to_bytes();
        debug!(log_id, tree_size, "log entry appended");
        Ok(LogRoot { tree_size, root_hash, signature })
    }

    async fn inclusion_proof(&self, log_id: &str, leaf_index: u64, tree_size: u64) -> Result<Vec<Digest>, LogError> {
        let logs = self.logs.read().expect("log lock poisoned");
        let state = logs.get(log_id).ok_or_else(|| LogError::UnknownLog(log_id.to_string()))?;
        let tree_size = tree_size as usize;
        let leaf_index = leaf_index as usize;
        if tree_size > state.leaves.len() {
            return Err(LogError::TreeTooSmall { requested: tree_size as u64, actual: state.leaves.len() as u64 });
        }
        if leaf_index >= tree_size {
            return Err(LogError::LeafOutOfRange { leaf_index: leaf_index as u64, tree_size: tree_size as u64 });
        }
        Ok(merkle::inclusion_proof(&state.leaves[..tree_size], leaf_index))
    }

    async fn consistency_proof(&self, log_id: &str, first_size: u64, second_size: u64) -> Result<Vec<Digest>, LogError> {
        let logs = self.logs.read().expect("log lock poisoned");
        let state = logs.get(log_id).ok_or_else(|| LogError::UnknownLog(log_id.to_string()))?;
        let (first_size, second_size) = (first_size as usize, second_size as usize);
        if second_size > state.leaves.len() {
            return Err(LogError::TreeTooSmall { requested: second_size as u64, actual: state.leaves.len() as u64 });
        }
        if first_size > second_size {
            return Err(LogError::InvalidRange { first_size: first_size as u64, second_size: second_size as u64 });
        }
        Ok(merkle::consistency_proof(&state.leaves[..second_size], first_size))
    }

    async fn latest_root(&self, log_id: &str) -> Result<LogRoot, LogError> {
        let logs = self.logs.read().expect("log lock poisoned");
        let state = logs.get(log_id).ok_or_else(|| LogError::UnknownLog(log_id.to_string()))?;
        let root_hash = merkle::root_hash(&state.leaves);
        let tree_size = state.leaves.len() as u64;
        let signature = state.signing_key.sign(&root_hash).to_bytes();
        Ok(LogRoot { tree_size, root_hash, signature })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn append_grows_the_tree_and_changes_the_root() {
        let backend = InMemoryLogBackend::new();
        let r1 = backend.append("l1", b"entry-0".to_vec()).await.unwrap();
        assert_eq!(r1.tree_size, 1);
        let r2 = backend.append("l1", b"entry-1".to_vec()).await.unwrap();
        assert_eq!(r2.tree_size, 2);
        assert_ne!(r1.root_hash, r2.root_hash);
    }

    #[tokio::test]
    async fn inclusion_proof_verifies_against_latest_root() {
        let backend = InMemoryLogBackend::new();
        for i in 0..5 {
            backend.append("l1", format!("entry-{i}").into_bytes()).await.unwrap();
        }
        let root = backend.latest_root("l1").await.unwrap();
        let proof = backend.inclusion_proof("l1", 2, root.tree_size).await.unwrap();
        let leaf = merkle::leaf_hash(b"entry-2");
        assert!(merkle::verify_inclusion(&leaf, 2, root.tree_size as usize, &proof, &root.root_hash));
    }

    #[tokio::test]
    async fn consistency_proof_verifies_growth() {
        let backend = InMemoryLogBackend::new();
        for i in 0..3 {
            backend.append("l1", format!("entry-{i}").into_bytes()).await.unwrap();
        }
        let root_at_3 = backend.latest_root("l1").await.unwrap();
        for i in 3..6 {
            backend.append("l1", format!("entry-{i}").into_bytes()).await.unwrap();
        }
        let root_at_6 = backend.latest_root("l1").await.unwrap();
        let proof = backend.consistency_proof("l1", 3, 6).await.unwrap();
        assert!(merkle::verify_consistency(
            &root_at_3.root_hash,
            3,
            &root_at_6.root_hash,
            6,
            &proof
        ));
    }

    #[tokio::test]
    async fn leaf_out_of_range_errors() {
        let backend = InMemoryLogBackend::new();
        backend.append("l1", b"entry-0".to_vec()).await.unwrap();
        assert!(matches!(
            backend.inclusion_proof("l1", 5, 1).await.unwrap_err(),
            LogError::LeafOutOfRange { .. }
        ));
    }
}
