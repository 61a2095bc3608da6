// Copyright © 2026 Key Transparency Contributors
// SPDX-License-Identifier: Apache-2.0

//! Cryptographic primitives used throughout the directory: device signing
//! keys (§3 `authorized_keys`), the VRF that derives a user's opaque index
//! (§4.A), the commitment scheme that hides profile data (§3 `Committed`),
//! and the hash used to chain entries (§3 `Entry.previous`).

pub mod commitment;
pub mod hash;
pub mod keys;
pub mod vrf;

pub use commitment::{open, Commitment, Committed, CommitmentError};
pub use hash::{sha256, Digest, DIGEST_LEN};
pub use keys::{KeyId, PublicKey, SecretKey, Signature, SignatureError};
pub use vrf::{VrfError, VrfProof, VrfPublicKey, VrfSecretKey};
