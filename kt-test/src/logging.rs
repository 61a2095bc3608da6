// Copyright © 2026 Key Transparency Contributors
// SPDX-License-Identifier: Apache-2.0

use std::env;

use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Initialises logging/tracing for a test process.
///
/// Captures logs so they are attributed to the failing test by the test
/// harness rather than interleaved on stdout. `RUST_LOG` defaults to
/// `error` when unset, so CI output stays quiet unless a test deliberately
/// turns tracing up.
pub fn init() {
    if env_logger::builder().is_test(true).try_init().is_ok() {
        if env::var("RUST_LOG").is_err() {
            env::set_var("RUST_LOG", "error");
        }

        let subscriber = FmtSubscriber::builder()
            .with_env_filter(EnvFilter::from_default_env())
            .with_test_writer()
            .compact()
            .finish();

        let _ = tracing::subscriber::set_global_default(subscriber);
    }
}
