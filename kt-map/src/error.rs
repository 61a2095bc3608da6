// Copyright © 2026 Key Transparency Contributors
// SPDX-License-Identifier: Apache-2.0

use thiserror::Error;

#[derive(Debug, Error)]
pub enum MapError {
    #[error("no map with id {0:?}")]
    UnknownMap(String),
    #[error("map has no revision {0}")]
    UnknownRevision(u64),
}
