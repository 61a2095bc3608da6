// Copyright © 2026 Key Transparency Contributors
// SPDX-License-Identifier: Apache-2.0

// TODO(kt-node): expose per-directory membership/rate-limit args.

use std::{fmt, net::SocketAddr, str::FromStr, time::Duration};

use clap::{Args as ClapArgs, Parser};

#[derive(Debug, Parser)]
pub struct Args {
    /// Address the framed RPC socket listens on.
    #[clap(long = "rpc-listen", name = "rpc-listen", default_value = "127.0.0.1:0")]
    pub rpc_listen: SocketAddr,

    /// Address the HTTP gateway listens on.
    #[clap(long = "gateway-listen", name = "gateway-listen", default_value = "127.0.0.1:8080")]
    pub gateway_listen: SocketAddr,

    #[clap(flatten)]
    pub backend: BackendArgs,

    #[clap(flatten)]
    pub directory_defaults: DirectoryDefaultsArgs,

    /// The number of milliseconds to wait after the last connection closes
    /// before shutting down the node. If not specified the node never
    /// shuts down on its own.
    #[clap(long)]
    pub linger_timeout: Option<LingerTimeout>,
}

#[derive(Debug, Default, ClapArgs)]
pub struct BackendArgs {
    /// Which `MapBackend`/`LogBackend`/`QueueStore` implementation to
    /// construct new directories against.
    #[clap(long = "backend", name = "backend", default_value_t)]
    pub kind: BackendKind,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum BackendKind {
    /// Process-local, non-persistent backends. Suitable for development
    /// and the end-to-end test harness only.
    InMemory,
}

impl Default for BackendKind {
    fn default() -> Self {
        Self::InMemory
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::InMemory => "in-memory",
        };
        write!(f, "{s}")
    }
}

impl FromStr for BackendKind {
    type Err = String;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        match input {
            "in-memory" => Ok(Self::InMemory),
            _ => Err(format!("unsupported backend `{input}`")),
        }
    }
}

/// Process-wide defaults applied to a directory at `CreateDirectory` time
/// when the caller does not override them.
#[derive(Debug, ClapArgs)]
pub struct DirectoryDefaultsArgs {
    /// Minimum time between published revisions.
    #[clap(long = "min-interval-ms", default_value_t = 1_000)]
    pub min_interval_ms: u64,

    /// Maximum time between published revisions, even if the queue is
    /// empty (subject to `--skip-empty-revisions`).
    #[clap(long = "max-interval-ms", default_value_t = 60_000)]
    pub max_interval_ms: u64,

    /// Whether the sequencer skips publishing a revision when
    /// `max_interval` elapses with nothing queued (§9 open question).
    #[clap(long)]
    pub skip_empty_revisions: bool,
}

impl DirectoryDefaultsArgs {
    pub fn min_interval(&self) -> Duration {
        Duration::from_millis(self.min_interval_ms)
    }

    pub fn max_interval(&self) -> Duration {
        Duration::from_millis(self.max_interval_ms)
    }
}

#[derive(Debug, Eq, PartialEq)]
pub struct LingerTimeout(Duration);

impl From<&LingerTimeout> for Duration {
    fn from(l: &LingerTimeout) -> Self {
        l.0
    }
}

impl FromStr for LingerTimeout {
    type Err = &'static str;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<u64>().map(|ms| LingerTimeout(Duration::from_millis(ms))).map_err(|_| "expected a positive integer")
    }
}
