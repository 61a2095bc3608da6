// Copyright © 2026 Key Transparency Contributors
// SPDX-License-Identifier: Apache-2.0

//! Append-only Merkle log (§3, §6).

pub mod backend;
pub mod error;
pub mod merkle;

pub use backend::{InMemoryLogBackend, LogBackend, LogRoot};
pub use error::LogError;
