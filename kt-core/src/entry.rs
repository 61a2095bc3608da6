// Copyright © 2026 Key Transparency Contributors
// SPDX-License-Identifier: Apache-2.0

//! `Entry`, `SignedEntry`, and the wire shapes that carry them (§3).

use kt_crypto::commitment::Commitment;
pub use kt_crypto::Committed;
use kt_crypto::{hash, KeyId, PublicKey, Signature};
use serde::{Deserialize, Serialize};

use crate::{authorized_keys::AuthorizedKeys, index::Index};

/// The content of a user's map leaf at some revision (§3).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    /// Must match the slot the leaf is stored at.
    pub index: Index,
    /// 32-byte output of `HMAC-SHA512/256(nonce, profile_bytes)`.
    pub commitment: Commitment,
    /// Keys empowered to sign the *next* update to this entry.
    pub authorized_keys: AuthorizedKeys,
    /// SHA-256 of the serialized `SignedEntry` this entry supersedes, or
    /// the all-zero digest for the first entry at this index.
    pub previous: hash::Digest,
}

impl Entry {
    /// Canonical byte encoding used both for signing and for
    /// `previous`-chaining (`SHA256(serialized Entry)`, §3 invariant 3).
    ///
    /// Uses `minicbor` rather than a general canonicalization scheme: every
    /// field has a fixed, explicit tag, so there is exactly one encoding
    /// per value and no ambiguity to canonicalize away.
    pub fn encode(&self) -> Vec<u8> {
        minicbor::to_vec(EntryWire::from(self)).expect("Entry encoding is infallible")
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, minicbor::decode::Error> {
        let wire: EntryWire = minicbor::decode(bytes)?;
        Entry::try_from(wire)
    }
}

/// A `(entry_bytes, [signature, ...])` pair (§3). At least one signature
/// must verify under a key from each of the previous entry's
/// `authorized_keys` and the new entry's `authorized_keys`; for the
/// initial entry only the new set is required.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedEntry {
    pub entry: Entry,
    pub signatures: Vec<(KeyId, Signature)>,
}

impl SignedEntry {
    pub fn new(entry: Entry, signatures: Vec<(KeyId, Signature)>) -> Self {
        Self { entry, signatures }
    }

    /// Sign `entry` with `keys`, recording each signer's [`KeyId`] so a
    /// verifier can match signatures to keys without brute-forcing.
    pub fn sign(entry: Entry, keys: &[&kt_crypto::SecretKey]) -> Self {
        let bytes = entry.encode();
        let signatures = keys
            .iter()
            .map(|sk| (sk.public().key_id(), sk.sign(&bytes)))
            .collect();
        Self { entry, signatures }
    }

    /// SHA-256 of the encoded `entry`, the value the *next* entry's
    /// `previous` field must equal (§3 invariant 3).
    pub fn digest(&self) -> hash::Digest {
        kt_crypto::sha256(&self.entry.encode())
    }

    /// True if any recorded signature verifies against a key in `keys`.
    pub fn verifies_against(&self, keys: &AuthorizedKeys) -> bool {
        let bytes = self.entry.encode();
        self.signatures.iter().any(|(key_id, sig)| {
            keys.iter()
                .any(|pk| pk.key_id() == *key_id && pk.verify(sig, &bytes))
        })
    }
}

/// A client request to update one user's entry (§6 `QueueEntryUpdate`).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EntryUpdate {
    pub user_id: crate::index::UserId,
    pub mutation: SignedEntry,
    pub committed: Option<Committed>,
}

/// Wire form of a mutation applied to build a revision (§3 `Mutation`): a
/// `SignedEntry` plus the pre-image leaf's inclusion proof at revision
/// `r-1`, so a verifier can recompute `MapRoot(r)` by re-applying `Mutate`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MutationProof {
    pub mutation: SignedEntry,
    /// Opaque inclusion proof bytes for the pre-image leaf at `r-1`,
    /// produced by the `MapBackend` (absent for the first-ever entry at an
    /// index).
    pub preimage_inclusion: Option<Vec<u8>>,
}

// `AuthorizedKeys`/`Index` live in this crate (and `kt-crypto`) and are not
// themselves `minicbor`-derivable without pulling those crates into
// `minicbor`'s derive scope, so the wire struct flattens to `Vec<u8>`s,
// which `minicbor` already knows how to encode, and round-trips through a
// fallible conversion below.
#[derive(minicbor::Encode, minicbor::Decode)]
#[cbor(map)]
struct EntryWire {
    #[n(0)]
    index: Vec<u8>,
    #[n(1)]
    commitment: Vec<u8>,
    #[n(2)]
    authorized_keys: Vec<Vec<u8>>,
    #[n(3)]
    previous: Vec<u8>,
}

impl From<&Entry> for EntryWire {
    fn from(entry: &Entry) -> Self {
        EntryWire {
            index: entry.index.0.to_vec(),
            commitment: entry.commitment.to_vec(),
            authorized_keys: entry.authorized_keys.iter().map(|pk| pk.as_ref().to_vec()).collect(),
            previous: entry.previous.to_vec(),
        }
    }
}

impl TryFrom<EntryWire> for Entry {
    type Error = minicbor::decode::Error;

    fn try_from(wire: EntryWire) -> Result<Self, Self::Error> {
        let index: [u8; 32] = wire.index.try_into().map_err(|_| fixed_len_error("index"))?;
        let commitment: [u8; 32] = wire.commitment.try_into().map_err(|_| fixed_len_error("commitment"))?;
        let previous: [u8; 32] = wire.previous.try_into().map_err(|_| fixed_len_error("previous"))?;
        let keys = wire
            .authorized_keys
            .iter()
            .map(|bytes| PublicKey::from_slice(bytes).ok_or_else(|| fixed_len_error("authorized key")))
            .collect::<Result<Vec<_>, _>>()?;
        let authorized_keys =
            AuthorizedKeys::try_from_iter(keys).map_err(|_| minicbor::decode::Error::message("empty authorized_keys"))?;
        Ok(Entry {
            index: Index(index),
            commitment,
            authorized_keys,
            previous,
        })
    }
}

fn fixed_len_error(field: &'static str) -> minicbor::decode::Error {
    minicbor::decode::Error::message(field)
}

#[cfg(test)]
mod tests {
    use super::*;
    use kt_crypto::SecretKey;

    fn entry(authorized: AuthorizedKeys, previous: hash::Digest) -> Entry {
        Entry {
            index: Index([7u8; 32]),
            commitment: [9u8; 32],
            authorized_keys: authorized,
            previous,
        }
    }

    #[test]
    fn encode_decode_round_trips() {
        let sk = SecretKey::new();
        let e = entry(AuthorizedKeys::new(sk.public()), hash::ZERO_DIGEST);
        let decoded = Entry::decode(&e.encode()).unwrap();
        assert_eq!(e, decoded);
    }

    #[test]
    fn signed_entry_verifies_against_signer_key() {
        let sk = SecretKey::new();
        let e = entry(AuthorizedKeys::new(sk.public()), hash::ZERO_DIGEST);
        let signed = SignedEntry::sign(e, &[&sk]);
        assert!(signed.verifies_against(&AuthorizedKeys::new(sk.public())));
    }

    #[test]
    fn signed_entry_rejects_wrong_key() {
        let sk = SecretKey::new();
        let other = SecretKey::new();
        let e = entry(AuthorizedKeys::new(sk.public()), hash::ZERO_DIGEST);
        let signed = SignedEntry::sign(e, &[&sk]);
        assert!(!signed.verifies_against(&AuthorizedKeys::new(other.public())));
    }

    #[test]
    fn digest_changes_with_entry_contents() {
        let sk = SecretKey::new();
        let e1 = entry(AuthorizedKeys::new(sk.public()), hash::ZERO_DIGEST);
        let mut e2 = e1.clone();
        e2.commitment = [1u8; 32];
        let s1 = SignedEntry::sign(e1, &[&sk]);
        let s2 = SignedEntry::sign(e2, &[&sk]);
        assert_ne!(s1.digest(), s2.digest());
    }
}
