// Copyright © 2026 Key Transparency Contributors
// SPDX-License-Identifier: Apache-2.0

use thiserror::Error;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("no queue for directory {0:?}")]
    UnknownDirectory(String),
}
