// Copyright © 2026 Key Transparency Contributors
// SPDX-License-Identifier: Apache-2.0

//! Validator error kinds (§4.B, §7).

use thiserror::Error;

#[derive(Debug, Error, Clone, Eq, PartialEq)]
pub enum ValidationError {
    /// The mutation's shape does not match what the validator expects:
    /// wrong index, malformed fields (§4.B steps 1-2).
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// No signature verifies under the required `authorized_keys` set(s)
    /// (§4.B steps 4-5).
    #[error("mutation is not authorized by the required key set(s)")]
    UnauthorizedMutation,

    /// `mutation.entry.previous` does not match `SHA256(current.entry)`
    /// (§4.B step 5, §8 idempotence property).
    #[error("entry.previous does not match the current entry's digest")]
    PreviousMismatch,

    /// `committed` was supplied but does not open `entry.commitment`
    /// (§4.B step 3).
    #[error("opened commitment does not match entry.commitment")]
    CommitmentMismatch,
}
