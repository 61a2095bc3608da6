// Copyright © 2026 Key Transparency Contributors
// SPDX-License-Identifier: Apache-2.0

//! The set of public verification keys empowered to sign the next update to
//! an entry (§3 `authorized_keys`, §8 "boundary" tests).

use std::collections::BTreeSet;

use kt_crypto::PublicKey;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A non-empty set of keys, any one of whose signatures on a mutation
/// counts as authorization by this key set (§4.B step 5).
///
/// Deserializes through [`AuthorizedKeys::try_from_iter`] so that an empty
/// set can never enter the system this way — wire payloads (the gateway's
/// `serde_json` path in particular) never go through the
/// invariant-checked `Entry` codec, only through serde directly.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct AuthorizedKeys(BTreeSet<PublicKey>);

impl<'de> Deserialize<'de> for AuthorizedKeys {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let set = BTreeSet::<PublicKey>::deserialize(deserializer)?;
        Self::try_from_iter(set).map_err(serde::de::Error::custom)
    }
}

impl TryFrom<BTreeSet<PublicKey>> for AuthorizedKeys {
    type Error = Error;

    fn try_from(set: BTreeSet<PublicKey>) -> Result<Self, Self::Error> {
        Self::try_from_iter(set)
    }
}

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    #[error("authorized_keys must contain at least one key")]
    Empty,
}

impl AuthorizedKeys {
    pub fn new(key: PublicKey) -> Self {
        let mut set = BTreeSet::new();
        set.insert(key);
        Self(set)
    }

    pub fn try_from_iter(keys: impl IntoIterator<Item = PublicKey>) -> Result<Self, Error> {
        let set: BTreeSet<_> = keys.into_iter().collect();
        if set.is_empty() {
            Err(Error::Empty)
        } else {
            Ok(Self(set))
        }
    }

    pub fn contains(&self, key: &PublicKey) -> bool {
        self.0.contains(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = &PublicKey> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// True if any key of `self` also appears in `other` — used by the
    /// validator to allow the same key to satisfy both the old and new
    /// signature requirement during a rotation (§4.B step 5).
    pub fn overlaps(&self, other: &AuthorizedKeys) -> bool {
        self.0.intersection(&other.0).next().is_some()
    }
}

impl<'a> IntoIterator for &'a AuthorizedKeys {
    type Item = &'a PublicKey;
    type IntoIter = std::collections::btree_set::Iter<'a, PublicKey>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_key_set_is_non_empty() {
        let sk = kt_crypto::SecretKey::new();
        let keys = AuthorizedKeys::new(sk.public());
        assert_eq!(keys.len(), 1);
    }

    #[test]
    fn empty_iterator_is_rejected() {
        assert!(AuthorizedKeys::try_from_iter(std::iter::empty()).is_err());
    }

    #[test]
    fn deserializing_an_empty_set_is_rejected() {
        let empty: BTreeSet<PublicKey> = BTreeSet::new();
        let json = serde_json::to_string(&empty).unwrap();
        assert!(serde_json::from_str::<AuthorizedKeys>(&json).is_err());
    }

    #[test]
    fn deserializing_a_non_empty_set_round_trips() {
        let sk = kt_crypto::SecretKey::new();
        let keys = AuthorizedKeys::new(sk.public());
        let json = serde_json::to_string(&keys).unwrap();
        let decoded: AuthorizedKeys = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded, keys);
    }

    #[test]
    fn disjoint_sets_do_not_overlap() {
        let a = AuthorizedKeys::new(kt_crypto::SecretKey::new().public());
        let b = AuthorizedKeys::new(kt_crypto::SecretKey::new().public());
        assert!(!a.overlaps(&b));
    }
}
