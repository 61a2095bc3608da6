// Copyright © 2026 Key Transparency Contributors
// SPDX-License-Identifier: Apache-2.0

//! Error kinds surfaced by the registry, sequencer, and prover (§4.E).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error("no directory with id {0:?}")]
    NotFound(String),

    #[error("directory {0:?} was deleted")]
    Deleted(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("requested revision is beyond the latest published revision")]
    OutOfRange,

    #[error(transparent)]
    Validation(#[from] kt_core::ValidationError),

    #[error(transparent)]
    Map(#[from] kt_map::MapError),

    #[error(transparent)]
    Log(#[from] kt_log::LogError),

    #[error(transparent)]
    Queue(#[from] kt_queue::QueueError),

    #[error("the sequencer anchored revision {expected} but the log assigned index {actual}")]
    LogAnchorMismatch { expected: u64, actual: u64 },

    #[error("backend temporarily unavailable: {0}")]
    Unavailable(String),
}
