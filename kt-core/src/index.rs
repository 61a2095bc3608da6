// Copyright © 2026 Key Transparency Contributors
// SPDX-License-Identifier: Apache-2.0

//! Opaque user identifiers and the fixed-width index derived from them
//! (§3).

use std::fmt;

use serde::{Deserialize, Serialize};

/// Opaque bytes supplied by the application. The directory never
/// interprets them except to feed them to the VRF (§3).
#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
pub struct UserId(#[serde(with = "serde_bytes")] pub Vec<u8>);

impl fmt::Debug for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "UserId({})", multibase::encode(multibase::Base::Base32Z, &self.0))
    }
}

impl From<Vec<u8>> for UserId {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

impl AsRef<[u8]> for UserId {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// Fixed-width opaque map key, `256` bits wide (§3).
///
/// `index = VRF_hash(vrf_private_key, directory_id ∥ user_id)`. The index
/// hides `user_id` from observers who do not hold the VRF proof.
#[derive(Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
pub struct Index(pub [u8; 32]);

impl fmt::Debug for Index {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Index({})", hex_encode(&self.0))
    }
}

impl From<[u8; 32]> for Index {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

impl AsRef<[u8]> for Index {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}
