// Copyright © 2026 Key Transparency Contributors
// SPDX-License-Identifier: Apache-2.0

//! The durable FIFO mutation queue (§4.C).

pub mod error;
pub mod store;

pub use error::QueueError;
pub use store::{InMemoryQueueStore, QueueStore};
