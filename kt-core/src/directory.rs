// Copyright © 2026 Key Transparency Contributors
// SPDX-License-Identifier: Apache-2.0

//! Directory metadata (§3 "Directory").

use std::time::Duration;

use kt_crypto::VrfPublicKey;
use serde::{Deserialize, Serialize};

/// URL-safe, unique identifier for a directory.
pub type DirectoryId = String;

/// Top-level namespace: attributes of one key transparency directory.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Directory {
    pub directory_id: DirectoryId,
    pub vrf_public_key: VrfPublicKey,
    pub map_id: String,
    pub log_id: String,
    pub min_interval: Duration,
    pub max_interval: Duration,
    /// §9 open question: whether the sequencer emits a revision when
    /// `max_interval` elapses with no queued mutations.
    pub skip_empty_revisions: bool,
    pub deleted_at: Option<u64>,
}

impl Directory {
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}
