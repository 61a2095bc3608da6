// Copyright © 2026 Key Transparency Contributors
// SPDX-License-Identifier: Apache-2.0

//! Maps [`kt_directory::DirectoryError`] onto the client-facing error
//! kinds of §7, so the RPC layer never constructs a new error kind of its
//! own — it only classifies the ones the core already raises.

use kt_directory::DirectoryError;
use serde::{Deserialize, Serialize};

/// The wire-level status kinds of §7. `Ok` never appears on an error path;
/// it is the default for a response whose payload decodes successfully.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum StatusKind {
    Ok,
    InvalidArgument,
    UnauthorizedMutation,
    PreviousMismatch,
    CommitmentMismatch,
    NotFound,
    OutOfRange,
    DeadlineExceeded,
    Cancelled,
    Unavailable,
    Internal,
}

impl StatusKind {
    /// Whether a caller should retry the request, per §7's table.
    pub fn retryable(self) -> bool {
        matches!(self, StatusKind::OutOfRange | StatusKind::Unavailable)
    }
}

impl minicbor::Encode for StatusKind {
    fn encode<W: minicbor::encode::Write>(
        &self,
        e: &mut minicbor::Encoder<W>,
    ) -> Result<(), minicbor::encode::Error<W::Error>> {
        let val: u8 = match self {
            Self::Ok => 0,
            Self::InvalidArgument => 1,
            Self::UnauthorizedMutation => 2,
            Self::PreviousMismatch => 3,
            Self::CommitmentMismatch => 4,
            Self::NotFound => 5,
            Self::OutOfRange => 6,
            Self::DeadlineExceeded => 7,
            Self::Cancelled => 8,
            Self::Unavailable => 9,
            Self::Internal => 10,
        };
        e.u8(val)?;
        Ok(())
    }
}

impl<'b> minicbor::Decode<'b> for StatusKind {
    fn decode(d: &mut minicbor::Decoder<'b>) -> Result<Self, minicbor::decode::Error> {
        Ok(match d.u8()? {
            0 => Self::Ok,
            1 => Self::InvalidArgument,
            2 => Self::UnauthorizedMutation,
            3 => Self::PreviousMismatch,
            4 => Self::CommitmentMismatch,
            5 => Self::NotFound,
            6 => Self::OutOfRange,
            7 => Self::DeadlineExceeded,
            8 => Self::Cancelled,
            9 => Self::Unavailable,
            other => return Err(minicbor::decode::Error::message(format!("unknown status kind {other}"))),
        })
    }
}

/// A classified error with a human-readable message, the shape every RPC
/// error response carries (§7).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ApiError {
    pub kind: StatusKind,
    pub message: String,
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}

impl From<&DirectoryError> for StatusKind {
    fn from(e: &DirectoryError) -> Self {
        match e {
            DirectoryError::NotFound(_) | DirectoryError::Deleted(_) => StatusKind::NotFound,
            DirectoryError::InvalidArgument(_) => StatusKind::InvalidArgument,
            DirectoryError::OutOfRange => StatusKind::OutOfRange,
            DirectoryError::Validation(v) => v.into(),
            DirectoryError::Map(_) | DirectoryError::Log(_) | DirectoryError::Queue(_) => StatusKind::Unavailable,
            DirectoryError::LogAnchorMismatch { .. } => StatusKind::Internal,
            DirectoryError::Unavailable(_) => StatusKind::Unavailable,
        }
    }
}

impl From<&kt_core::ValidationError> for StatusKind {
    fn from(e: &kt_core::ValidationError) -> Self {
        match e {
            kt_core::ValidationError::InvalidArgument(_) => StatusKind::InvalidArgument,
            kt_core::ValidationError::UnauthorizedMutation => StatusKind::UnauthorizedMutation,
            kt_core::ValidationError::PreviousMismatch => StatusKind::PreviousMismatch,
            kt_core::ValidationError::CommitmentMismatch => StatusKind::CommitmentMismatch,
        }
    }
}

impl From<DirectoryError> for ApiError {
    fn from(e: DirectoryError) -> Self {
        ApiError { kind: StatusKind::from(&e), message: e.to_string() }
    }
}

impl From<kt_core::ValidationError> for ApiError {
    fn from(e: kt_core::ValidationError) -> Self {
        ApiError { kind: StatusKind::from(&e), message: e.to_string() }
    }
}
