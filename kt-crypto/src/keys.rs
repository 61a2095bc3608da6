// Copyright © 2026 Key Transparency Contributors
// SPDX-License-Identifier: Apache-2.0

//! Device signing keys. An `authorized_keys` set (§3) holds [`PublicKey`]s;
//! a `SignedEntry` carries [`Signature`]s produced by the corresponding
//! [`SecretKey`]s.

use std::{convert::TryFrom, fmt, iter};

use ed25519_zebra as ed25519;
use multibase::Base;
use serde::{de::Visitor, Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;
use zeroize::Zeroize;

pub const PUBLICKEYBYTES: usize = 32;

/// Key material format version, serialized alongside the key bytes so future
/// algorithm additions can be distinguished.
const VERSION: u8 = 0;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SignatureError {
    #[error("invalid key length, expected {PUBLICKEYBYTES} bytes")]
    InvalidKeyLength,
    #[error("invalid signature encoding")]
    InvalidSignature,
}

/// A device-specific signing key (`authorized_keys` §3).
#[derive(Clone, Zeroize)]
#[zeroize(drop)]
pub struct SecretKey(ed25519::SigningKey);

/// The public half of a [`SecretKey`].
#[derive(Clone, Copy, Eq, PartialEq, PartialOrd, Ord, Hash)]
pub struct PublicKey(ed25519::VerificationKeyBytes);

/// Opaque identifier for a key within an `authorized_keys` set, so a
/// `SignedEntry`'s signatures can be matched to the key that produced them
/// without re-deriving public keys from raw signatures.
#[derive(Clone, Copy, Debug, Eq, PartialEq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct KeyId(pub [u8; 8]);

impl From<PublicKey> for KeyId {
    fn from(pk: PublicKey) -> Self {
        let digest = crate::hash::sha256(pk.as_ref());
        let mut id = [0u8; 8];
        id.copy_from_slice(&digest[..8]);
        KeyId(id)
    }
}

#[derive(Clone, Eq, PartialEq)]
pub struct Signature(ed25519::Signature);

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Signature({})", multibase::encode(Base::Base32Z, self.0.to_bytes()))
    }
}

#[allow(clippy::new_without_default)]
impl SecretKey {
    pub fn new() -> Self {
        Self(ed25519::SigningKey::new(rand::thread_rng()))
    }

    pub fn from_seed(seed: [u8; 32]) -> Self {
        Self(ed25519::SigningKey::from(seed))
    }

    pub fn public(&self) -> PublicKey {
        PublicKey(ed25519::VerificationKeyBytes::from(ed25519::VerificationKey::from(&self.0)))
    }

    pub fn sign(&self, data: &[u8]) -> Signature {
        Signature(self.0.sign(data))
    }
}

impl fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SecretKey(***)")
    }
}

impl AsRef<[u8]> for SecretKey {
    fn as_ref(&self) -> &[u8] {
        self.0.as_ref()
    }
}

impl TryFrom<&[u8]> for SecretKey {
    type Error = SignatureError;

    fn try_from(bytes: &[u8]) -> Result<Self, Self::Error> {
        ed25519::SigningKey::try_from(bytes)
            .map(Self)
            .map_err(|_| SignatureError::InvalidKeyLength)
    }
}

impl PublicKey {
    pub fn verify(&self, sig: &Signature, data: &[u8]) -> bool {
        ed25519::VerificationKey::try_from(self.0)
            .and_then(|vk| vk.verify(&sig.0, data))
            .is_ok()
    }

    pub fn from_slice(bytes: &[u8]) -> Option<PublicKey> {
        ed25519::VerificationKeyBytes::try_from(bytes).map(PublicKey).ok()
    }

    pub fn key_id(&self) -> KeyId {
        (*self).into()
    }

    pub(crate) fn verification_key_bytes(&self) -> ed25519::VerificationKeyBytes {
        self.0
    }
}

impl Signature {
    pub(crate) fn raw(&self) -> ed25519::Signature {
        self.0.clone()
    }

    pub fn to_bytes(&self) -> [u8; 64] {
        self.0.to_bytes()
    }
}

impl From<SecretKey> for PublicKey {
    fn from(key: SecretKey) -> Self {
        key.public()
    }
}

impl AsRef<[u8]> for PublicKey {
    fn as_ref(&self) -> &[u8] {
        self.0.as_ref()
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({})", self.default_encoding())
    }
}

impl PublicKey {
    /// Canonical `multibase`/`z-base32` encoding, mirroring the scheme used
    /// for peer identifiers elsewhere in this ecosystem.
    pub fn default_encoding(&self) -> String {
        multibase::encode(
            Base::Base32Z,
            iter::once(&VERSION).chain(self.as_ref()).copied().collect::<Vec<u8>>(),
        )
    }
}

impl Serialize for PublicKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_bytes(self.as_ref())
    }
}

impl<'de> Deserialize<'de> for PublicKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct V;
        impl<'de> Visitor<'de> for V {
            type Value = PublicKey;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                write!(f, "{PUBLICKEYBYTES} bytes of ed25519 public key material")
            }

            fn visit_bytes<E: serde::de::Error>(self, v: &[u8]) -> Result<Self::Value, E> {
                PublicKey::from_slice(v).ok_or_else(|| E::custom("invalid public key length"))
            }
        }
        deserializer.deserialize_bytes(V)
    }
}

impl Serialize for Signature {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_bytes(&self.0.to_bytes())
    }
}

impl<'de> Deserialize<'de> for Signature {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct V;
        impl<'de> Visitor<'de> for V {
            type Value = Signature;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                write!(f, "64 bytes of ed25519 signature")
            }

            fn visit_bytes<E: serde::de::Error>(self, v: &[u8]) -> Result<Self::Value, E> {
                let bytes: [u8; 64] = v.try_into().map_err(|_| E::custom("invalid signature length"))?;
                Ok(Signature(ed25519::Signature::from(bytes)))
            }
        }
        deserializer.deserialize_bytes(V)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_and_verify_round_trip() {
        let sk = SecretKey::new();
        let pk = sk.public();
        let sig = sk.sign(b"hello");
        assert!(pk.verify(&sig, b"hello"));
        assert!(!pk.verify(&sig, b"goodbye"));
    }

    #[test]
    fn distinct_keys_give_distinct_key_ids() {
        let a = SecretKey::new().public().key_id();
        let b = SecretKey::new().public().key_id();
        assert_ne!(a, b);
    }
}
