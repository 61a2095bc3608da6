// Copyright © 2026 Key Transparency Contributors
// SPDX-License-Identifier: Apache-2.0

//! Directory registry, sequencer, and read path (prover) for the key
//! transparency directory (§3-§6).

pub mod error;
pub mod mutation_log;
pub mod prover;
pub mod registry;
pub mod sequencer;
pub mod verify;

pub use error::DirectoryError;
pub use mutation_log::{MutationLog, RevisionMutations};
pub use prover::{
    BatchGetUserResponse, CommittedStore, GetRevisionResponse, GetUserResponse, HistoryEntry, ListHistoryPage,
    ListMutationsPage, MapLeaf, Prover,
};
pub use registry::{CreateDirectory, DirectoryRegistry};
pub use sequencer::{current_leaf, DirectoryDeps, DroppedMutation, SequencerState, TickOutcome};
