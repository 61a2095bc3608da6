// Copyright © 2026 Key Transparency Contributors
// SPDX-License-Identifier: Apache-2.0

//! Runtime configuration assembled from [`crate::args::Args`] (grounded on
//! `node-lib::cfg`/`node-lib::args`): listen addresses, the backend kind
//! new directories are provisioned against, and process-wide directory
//! defaults applied at `CreateDirectory` time when the caller does not
//! override them.

use std::net::SocketAddr;
use std::time::Duration;

use crate::args::{Args, BackendKind};

/// Process-wide defaults a new directory inherits unless the admin caller
/// overrides them at `CreateDirectory` time (§3 `min_interval`/
/// `max_interval`, §9 `skip_empty_revisions` open question).
#[derive(Clone, Debug)]
pub struct DirectoryDefaults {
    pub min_interval: Duration,
    pub max_interval: Duration,
    pub skip_empty_revisions: bool,
}

#[derive(Clone, Debug)]
pub struct Cfg {
    pub rpc_listen: SocketAddr,
    pub gateway_listen: SocketAddr,
    pub backend: BackendKind,
    pub directory_defaults: DirectoryDefaults,
    pub linger_timeout: Option<Duration>,
}

impl Cfg {
    pub fn from_args(args: &Args) -> Self {
        Self {
            rpc_listen: args.rpc_listen,
            gateway_listen: args.gateway_listen,
            backend: BackendKind::InMemory,
            directory_defaults: DirectoryDefaults {
                min_interval: args.directory_defaults.min_interval(),
                max_interval: args.directory_defaults.max_interval(),
                skip_empty_revisions: args.directory_defaults.skip_empty_revisions,
            },
            linger_timeout: args.linger_timeout.as_ref().map(Duration::from),
        }
    }
}
