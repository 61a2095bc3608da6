// Copyright © 2026 Key Transparency Contributors
// SPDX-License-Identifier: Apache-2.0

//! Process logging/tracing setup, grounded on `cli/linkd-lib::logging`:
//! `env_logger` bridges any `log`-based dependency into `tracing`, and the
//! `TRACING_FMT` environment variable picks the output format.

use std::env;

use log::{log_enabled, Level};
use tracing::subscriber::set_global_default as set_subscriber;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Initialises logging/tracing for the `ktd` process.
///
/// The `TRACING_FMT` environment variable controls formatting:
///
/// * "pretty": [`tracing_subscriber::fmt::format::Pretty`]
/// * "compact": [`tracing_subscriber::fmt::format::Compact`]
/// * "json": [`tracing_subscriber::fmt::format::Json`]
///
/// If unset, "compact" is used under `CI=1`, "pretty" otherwise.
pub fn init() {
    if env_logger::builder().try_init().is_ok() {
        let mut builder =
            FmtSubscriber::builder().with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")));
        if log_enabled!(target: "kt_node", Level::Trace) {
            builder = builder.with_thread_ids(true);
        } else if env::var("TRACING_FMT").is_err() {
            let default_format = if env::var("CI").is_ok() { "compact" } else { "pretty" };
            env::set_var("TRACING_FMT", default_format);
        }

        match env::var("TRACING_FMT").ok().as_deref() {
            Some("pretty") => set_subscriber(builder.pretty().finish()),
            Some("compact") => set_subscriber(builder.compact().finish()),
            Some("json") => set_subscriber(builder.json().flatten_event(true).finish()),
            _ => set_subscriber(builder.finish()),
        }
        .expect("setting tracing subscriber failed")
    }
}
