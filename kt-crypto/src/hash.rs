// Copyright © 2026 Key Transparency Contributors
// SPDX-License-Identifier: Apache-2.0

//! SHA-256 digests used to chain `Entry` values (§3, invariant 3).

use sha2::{Digest as _, Sha256};

pub const DIGEST_LEN: usize = 32;

/// A 32-byte SHA-256 digest.
pub type Digest = [u8; DIGEST_LEN];

/// The all-zero digest, used as `Entry.previous` for the first entry at an
/// index (§3).
pub const ZERO_DIGEST: Digest = [0u8; DIGEST_LEN];

pub fn sha256(data: &[u8]) -> Digest {
    let mut hasher = Sha256::new();
    hasher.update(data);
    let out = hasher.finalize();
    let mut digest = [0u8; DIGEST_LEN];
    digest.copy_from_slice(&out);
    digest
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_input_is_stable() {
        let a = sha256(b"");
        let b = sha256(b"");
        assert_eq!(a, b);
    }

    #[test]
    fn distinct_inputs_differ() {
        assert_ne!(sha256(b"a"), sha256(b"b"));
    }
}
