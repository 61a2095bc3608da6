// Copyright © 2026 Key Transparency Contributors
// SPDX-License-Identifier: Apache-2.0

//! Common testing utilities for the key transparency directory, mirroring
//! `librad-test`/`crates/test`'s role in the wider workspace.

pub mod directory;
pub mod fixtures;
pub mod logging;

pub use directory::Harness;
