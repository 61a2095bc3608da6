// Copyright © 2026 Key Transparency Contributors
// SPDX-License-Identifier: Apache-2.0

//! Deterministic key fixtures, mirroring `librad-test`'s fixture signers.

use kt_crypto::SecretKey;
use rand::rngs::SmallRng;
use rand::{RngCore, SeedableRng};

/// Deterministically derives the `n`th signing key from `seed`. Tests that
/// need reproducible key material across runs should pick a fixed `seed`;
/// tests that only need keys distinct from each other can vary `n`.
pub fn signer(seed: u64, n: u64) -> SecretKey {
    let mut rng = SmallRng::seed_from_u64(seed.wrapping_add(n));
    let mut bytes = [0u8; 32];
    rng.fill_bytes(&mut bytes);
    SecretKey::from_seed(bytes)
}

/// `count` distinct signing keys derived from the same `seed`.
pub fn signers(seed: u64, count: u64) -> Vec<SecretKey> {
    (0..count).map(|n| signer(seed, n)).collect()
}
