// Copyright © 2026 Key Transparency Contributors
// SPDX-License-Identifier: Apache-2.0

#![cfg_attr(feature = "nightly", feature(try_trait_v2))]

pub mod iter;
pub mod ops;
pub mod result;

pub type Void = std::convert::Infallible;

pub mod prelude {
    use super::*;

    pub use super::Void;
    pub use iter::IteratorExt;
    pub use ops::{FromResidual, Try};
    pub use result::ResultExt;
}
