// Copyright © 2026 Key Transparency Contributors
// SPDX-License-Identifier: Apache-2.0

//! `commitment = HMAC-SHA512/256(nonce, data)` (§6, "Commitment scheme").
//!
//! Binding: an observer cannot change `data` without changing `commitment`.
//! Hiding: `commitment` reveals nothing about `data` without `nonce`.

use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::Sha512_256;
use thiserror::Error;

pub const NONCE_LEN: usize = 16;
pub const COMMITMENT_LEN: usize = 32;

pub type Commitment = [u8; COMMITMENT_LEN];

type HmacSha512_256 = Hmac<Sha512_256>;

/// Opens a `commitment`: the nonce and data that produced it (§3).
///
/// Not part of the authenticated map leaf; stored alongside it.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Committed {
    pub nonce: [u8; NONCE_LEN],
    pub data: Vec<u8>,
}

#[derive(Debug, Error)]
pub enum CommitmentError {
    #[error("commitment does not match opened data")]
    Mismatch,
}

impl Committed {
    /// Samples a fresh nonce and computes the commitment over `data`.
    pub fn seal(data: Vec<u8>) -> (Self, Commitment) {
        let mut nonce = [0u8; NONCE_LEN];
        rand::thread_rng().fill_bytes(&mut nonce);
        let commitment = commit(&nonce, &data);
        (Self { nonce, data }, commitment)
    }

    pub fn commitment(&self) -> Commitment {
        commit(&self.nonce, &self.data)
    }
}

fn commit(nonce: &[u8; NONCE_LEN], data: &[u8]) -> Commitment {
    // HMAC keyed by the nonce, matching `HMAC-SHA512/256(nonce, data)`.
    let mut mac = <HmacSha512_256 as Mac>::new_from_slice(nonce)
        .expect("HMAC accepts keys of any length");
    mac.update(data);
    let out = mac.finalize().into_bytes();
    let mut commitment = [0u8; COMMITMENT_LEN];
    commitment.copy_from_slice(&out);
    commitment
}

/// Opens `committed` and checks it against `commitment` (§4.B step 3, §8
/// property 7).
pub fn open(committed: &Committed, commitment: &Commitment) -> Result<&[u8], CommitmentError> {
    if &committed.commitment() == commitment {
        Ok(&committed.data)
    } else {
        Err(CommitmentError::Mismatch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seal_then_open_round_trips() {
        let (committed, commitment) = Committed::seal(b"profile bytes".to_vec());
        assert_eq!(open(&committed, &commitment).unwrap(), b"profile bytes");
    }

    #[test]
    fn tampered_data_fails_to_open() {
        let (mut committed, commitment) = Committed::seal(b"profile bytes".to_vec());
        committed.data = b"tampered".to_vec();
        assert!(open(&committed, &commitment).is_err());
    }

    #[test]
    fn distinct_nonces_give_distinct_commitments() {
        let (_, c1) = Committed::seal(b"same data".to_vec());
        let (_, c2) = Committed::seal(b"same data".to_vec());
        assert_ne!(c1, c2, "nonces must be sampled fresh per commitment");
    }

    mod prop {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            // Binding: no other data opens the same commitment under the
            // same nonce.
            #[test]
            fn only_the_sealed_data_opens_its_commitment(
                data in proptest::collection::vec(any::<u8>(), 0..200),
                other in proptest::collection::vec(any::<u8>(), 0..200),
            ) {
                prop_assume!(data != other);
                let (committed, commitment) = Committed::seal(data);
                let mut tampered = committed;
                tampered.data = other;
                prop_assert!(open(&tampered, &commitment).is_err());
            }

            // Hiding: the commitment itself is a deterministic function of
            // (nonce, data) only, so recomputing it from the opened value
            // must always match.
            #[test]
            fn commitment_is_reproducible_from_opening(nonce in any::<[u8; NONCE_LEN]>(), data in proptest::collection::vec(any::<u8>(), 0..200)) {
                let committed = Committed { nonce, data: data.clone() };
                prop_assert_eq!(committed.commitment(), commit(&nonce, &data));
            }
        }
    }
}
