// Copyright © 2026 Key Transparency Contributors
// SPDX-License-Identifier: Apache-2.0

//! Data model (§3) and mutation validator (§4.B) of the key transparency
//! directory. Pure: no I/O, so it can be fuzzed with synthesized leaves
//! (§9 design note).

pub mod authorized_keys;
pub mod directory;
pub mod entry;
pub mod error;
pub mod index;
pub mod revision;
pub mod validator;

pub use authorized_keys::AuthorizedKeys;
pub use directory::{Directory, DirectoryId};
pub use entry::{Committed, Entry, EntryUpdate, MutationProof, SignedEntry};
pub use error::ValidationError;
pub use index::{Index, UserId};
pub use revision::{LogRoot, Revision, SignedMapRoot};
pub use validator::validate;
