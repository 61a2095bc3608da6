// Copyright © 2026 Key Transparency Contributors
// SPDX-License-Identifier: Apache-2.0

//! §4.B Mutation Validator.
//!
//! Pure given the current leaf: no I/O, so it can be fuzzed with
//! synthesized leaves (§9 design note). The sequencer (`kt-directory`) is
//! the only caller that owns the VRF secret key and the current leaf
//! lookup; this module just applies the rules.

use kt_crypto::{commitment, hash, VrfSecretKey};
use tracing::trace;

use crate::{
    entry::{EntryUpdate, SignedEntry},
    error::ValidationError,
};

/// Validates and authorizes `update` against the *current* entry at the
/// computed index (`None` if the index has never been written).
///
/// On success, returns the validated `SignedEntry` to apply — identical to
/// `update.mutation`, returned by value so callers don't need to re-borrow
/// the request after validation.
pub fn validate(
    update: &EntryUpdate,
    current: Option<&SignedEntry>,
    vrf_sk: &VrfSecretKey,
    directory_id: &str,
) -> Result<SignedEntry, ValidationError> {
    // Step 1: index must match VRF(directory_id, user_id).
    let (expected_index, _proof) = kt_crypto::vrf::compute(vrf_sk, directory_id, update.user_id.as_ref());
    if expected_index != update.mutation.entry.index.0 {
        return Err(ValidationError::InvalidArgument(
            "entry.index does not match VRF(user_id)".into(),
        ));
    }

    // Step 3: if a commitment opening was supplied, it must open the entry's
    // commitment. Otherwise the commitment is opaque to the validator.
    if let Some(committed) = &update.committed {
        commitment::open(committed, &update.mutation.entry.commitment)
            .map_err(|_| ValidationError::CommitmentMismatch)?;
    }

    // Step 5: `authorized_keys` must be non-empty, independent of whatever
    // signatures happen to be attached — checked explicitly rather than
    // relying on an empty set vacuously failing `verifies_against` below.
    if update.mutation.entry.authorized_keys.is_empty() {
        return Err(ValidationError::InvalidArgument("authorized_keys must not be empty".into()));
    }

    match current {
        None => {
            // Step 4: first-ever entry at this index.
            if update.mutation.entry.previous != hash::ZERO_DIGEST {
                return Err(ValidationError::PreviousMismatch);
            }
            if !update.mutation.verifies_against(&update.mutation.entry.authorized_keys) {
                return Err(ValidationError::UnauthorizedMutation);
            }
        },
        Some(current_entry) => {
            // Step 5: rotation / update of an existing entry.
            if update.mutation.entry.previous != current_entry.digest() {
                return Err(ValidationError::PreviousMismatch);
            }
            let authorized_by_old = update.mutation.verifies_against(&current_entry.entry.authorized_keys);
            let authorized_by_new = update.mutation.verifies_against(&update.mutation.entry.authorized_keys);
            if !(authorized_by_old && authorized_by_new) {
                return Err(ValidationError::UnauthorizedMutation);
            }
        },
    }

    trace!(index = ?update.mutation.entry.index, "mutation validated");
    Ok(update.mutation.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{authorized_keys::AuthorizedKeys, entry::Entry, index::Index};
    use kt_crypto::{Committed, SecretKey};

    const DIR: &str = "dir-1";

    fn index_for(vrf_sk: &VrfSecretKey, user_id: &[u8]) -> Index {
        Index(kt_crypto::vrf::compute(vrf_sk, DIR, user_id).0)
    }

    #[test]
    fn first_entry_with_zero_previous_and_self_signature_is_valid() {
        let vrf_sk = VrfSecretKey::new();
        let sk = SecretKey::new();
        let (committed, commitment) = Committed::seal(b"profile".to_vec());
        let entry = Entry {
            index: index_for(&vrf_sk, b"alice"),
            commitment,
            authorized_keys: AuthorizedKeys::new(sk.public()),
            previous: hash::ZERO_DIGEST,
        };
        let signed = SignedEntry::sign(entry, &[&sk]);
        let update = EntryUpdate {
            user_id: b"alice".to_vec().into(),
            mutation: signed,
            committed: Some(committed),
        };
        assert!(validate(&update, None, &vrf_sk, DIR).is_ok());
    }

    #[test]
    fn first_entry_with_nonzero_previous_is_rejected() {
        let vrf_sk = VrfSecretKey::new();
        let sk = SecretKey::new();
        let entry = Entry {
            index: index_for(&vrf_sk, b"alice"),
            commitment: [0u8; 32],
            authorized_keys: AuthorizedKeys::new(sk.public()),
            previous: [1u8; 32],
        };
        let signed = SignedEntry::sign(entry, &[&sk]);
        let update = EntryUpdate {
            user_id: b"alice".to_vec().into(),
            mutation: signed,
            committed: None,
        };
        assert_eq!(
            validate(&update, None, &vrf_sk, DIR).unwrap_err(),
            ValidationError::PreviousMismatch
        );
    }

    #[test]
    fn rotation_requires_both_old_and_new_signatures() {
        let vrf_sk = VrfSecretKey::new();
        let old_sk = SecretKey::new();
        let new_sk = SecretKey::new();

        let first = Entry {
            index: index_for(&vrf_sk, b"alice"),
            commitment: [0u8; 32],
            authorized_keys: AuthorizedKeys::new(old_sk.public()),
            previous: hash::ZERO_DIGEST,
        };
        let first_signed = SignedEntry::sign(first, &[&old_sk]);

        let rotated = Entry {
            index: index_for(&vrf_sk, b"alice"),
            commitment: [0u8; 32],
            authorized_keys: AuthorizedKeys::new(new_sk.public()),
            previous: first_signed.digest(),
        };

        // Signed only by the new key: must be rejected (§8 scenario 3).
        let under_signed = SignedEntry::sign(rotated.clone(), &[&new_sk]);
        let update = EntryUpdate {
            user_id: b"alice".to_vec().into(),
            mutation: under_signed,
            committed: None,
        };
        assert_eq!(
            validate(&update, Some(&first_signed), &vrf_sk, DIR).unwrap_err(),
            ValidationError::UnauthorizedMutation
        );

        // Signed by both: accepted (§8 scenario 2).
        let fully_signed = SignedEntry::sign(rotated, &[&old_sk, &new_sk]);
        let update = EntryUpdate {
            user_id: b"alice".to_vec().into(),
            mutation: fully_signed,
            committed: None,
        };
        assert!(validate(&update, Some(&first_signed), &vrf_sk, DIR).is_ok());
    }

    #[test]
    fn stale_previous_is_rejected() {
        let vrf_sk = VrfSecretKey::new();
        let sk = SecretKey::new();
        let first = Entry {
            index: index_for(&vrf_sk, b"alice"),
            commitment: [0u8; 32],
            authorized_keys: AuthorizedKeys::new(sk.public()),
            previous: hash::ZERO_DIGEST,
        };
        let first_signed = SignedEntry::sign(first, &[&sk]);

        let second = Entry {
            index: index_for(&vrf_sk, b"alice"),
            commitment: [1u8; 32],
            authorized_keys: AuthorizedKeys::new(sk.public()),
            previous: [0xff; 32], // stale / wrong previous
        };
        let second_signed = SignedEntry::sign(second, &[&sk]);
        let update = EntryUpdate {
            user_id: b"alice".to_vec().into(),
            mutation: second_signed,
            committed: None,
        };
        assert_eq!(
            validate(&update, Some(&first_signed), &vrf_sk, DIR).unwrap_err(),
            ValidationError::PreviousMismatch
        );
    }

    #[test]
    fn wrong_index_is_rejected() {
        let vrf_sk = VrfSecretKey::new();
        let sk = SecretKey::new();
        let entry = Entry {
            index: Index([0xab; 32]), // does not match VRF(alice)
            commitment: [0u8; 32],
            authorized_keys: AuthorizedKeys::new(sk.public()),
            previous: hash::ZERO_DIGEST,
        };
        let signed = SignedEntry::sign(entry, &[&sk]);
        let update = EntryUpdate {
            user_id: b"alice".to_vec().into(),
            mutation: signed,
            committed: None,
        };
        assert!(matches!(
            validate(&update, None, &vrf_sk, DIR).unwrap_err(),
            ValidationError::InvalidArgument(_)
        ));
    }

    #[test]
    fn commitment_mismatch_is_rejected() {
        let vrf_sk = VrfSecretKey::new();
        let sk = SecretKey::new();
        let (committed, _real_commitment) = Committed::seal(b"profile".to_vec());
        let entry = Entry {
            index: index_for(&vrf_sk, b"alice"),
            commitment: [0u8; 32], // does not match `committed`
            authorized_keys: AuthorizedKeys::new(sk.public()),
            previous: hash::ZERO_DIGEST,
        };
        let signed = SignedEntry::sign(entry, &[&sk]);
        let update = EntryUpdate {
            user_id: b"alice".to_vec().into(),
            mutation: signed,
            committed: Some(committed),
        };
        assert_eq!(
            validate(&update, None, &vrf_sk, DIR).unwrap_err(),
            ValidationError::CommitmentMismatch
        );
    }
}
