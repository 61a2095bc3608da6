// Copyright © 2026 Key Transparency Contributors
// SPDX-License-Identifier: Apache-2.0

//! Sparse Merkle map (§3, §6, §9 design note).

pub mod backend;
pub mod error;
pub mod smt;

pub use backend::{InMemoryMapBackend, MapBackend, MapLeafInclusion, MapRoot};
pub use error::MapError;
pub use kt_core::Index;
pub use smt::{LeafValue, MapProof};
