// Copyright © 2026 Key Transparency Contributors
// SPDX-License-Identifier: Apache-2.0

//! `Revision` and `LogRoot` (§3).

use serde::{Deserialize, Serialize};

/// A signed root of the sparse Merkle map at some revision, carrying the
/// mapper metadata the sequencer embeds when it commits a batch (§4.D
/// step 5).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SignedMapRoot {
    pub root_hash: [u8; 32],
    pub signature: Vec<u8>,
    pub revision_number: u64,
    /// Queue sequence number up to which mutations have been incorporated
    /// (§3 invariant 6: non-decreasing across revisions).
    pub highest_fully_completed_seq: u64,
}

/// A snapshot of the directory (§3).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Revision {
    pub revision_number: u64,
    pub signed_map_root: SignedMapRoot,
    /// Proof that `signed_map_root` sits at index `revision_number` in the
    /// log (§3 invariant 5).
    pub log_inclusion: Vec<u8>,
}

/// `(signed_log_root, consistency_proof_from_client_size)` (§3).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LogRoot {
    pub signed_log_root: Vec<u8>,
    pub tree_size: u64,
    /// Present only when the caller supplied `last_verified_tree_size`.
    pub consistency_proof: Option<Vec<u8>>,
}
