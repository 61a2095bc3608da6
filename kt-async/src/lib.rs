// Copyright © 2026 Key Transparency Contributors
// SPDX-License-Identifier: Apache-2.0

#![cfg_attr(feature = "nightly", feature(try_trait_v2))]

extern crate kt_std_ext as std_ext;

mod spawn;
pub use spawn::{Cancelled, JoinError, Spawner, Stats, Task};

mod time;
pub use time::{interval, sleep, timeout, Elapsed};
