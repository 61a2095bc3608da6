// Copyright © 2026 Key Transparency Contributors
// SPDX-License-Identifier: Apache-2.0

use thiserror::Error;

#[derive(Debug, Error)]
pub enum LogError {
    #[error("no log with id {0:?}")]
    UnknownLog(String),
    #[error("requested tree size {requested} but the log only has {actual} entries")]
    TreeTooSmall { requested: u64, actual: u64 },
    #[error("leaf index {leaf_index} is out of range for a tree of size {tree_size}")]
    LeafOutOfRange { leaf_index: u64, tree_size: u64 },
    #[error("invalid range: first_size {first_size} exceeds second_size {second_size}")]
    InvalidRange { first_size: u64, second_size: u64 },
}
