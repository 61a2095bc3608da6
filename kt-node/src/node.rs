// Copyright © 2026 Key Transparency Contributors
// SPDX-License-Identifier: Apache-2.0

//! Process entry point, grounded on `node-lib::node::run`: parses args,
//! assembles [`Cfg`] and [`Service`], spawns every subsystem's task, and
//! waits for the first one to finish (or a termination signal) before
//! returning.

use std::panic;
use std::time::Duration;

use clap::Parser as _;
use futures::future::{select_all, FutureExt as _};
use tokio::spawn;
use tokio::sync::watch;
use tracing::info;

use crate::args::Args;
use crate::cfg::Cfg;
use crate::service::Service;
use crate::{gateway, logging, rpc, signals};

pub async fn run() -> anyhow::Result<()> {
    logging::init();

    let args = Args::parse();
    let cfg = Cfg::from_args(&args);
    let service = Service::new(cfg.clone());

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let signals_task = spawn(signals::routine(shutdown_tx.clone()));

    let mut coalesced = vec![];

    let rpc_task = spawn(rpc::routine(cfg.rpc_listen, service.clone(), shutdown_rx.clone())).fuse();
    coalesced.push(rpc_task);

    let gateway_task = spawn(gateway::routine(cfg.gateway_listen, service.clone(), shutdown_rx.clone())).fuse();
    coalesced.push(gateway_task);

    if let Some(linger) = cfg.linger_timeout {
        let service = service.clone();
        let shutdown_tx = shutdown_tx.clone();
        let linger_task = spawn(async move { linger_routine(service, linger, shutdown_tx).await }).fuse();
        coalesced.push(linger_task);
    }

    info!(rpc_listen = %cfg.rpc_listen, gateway_listen = %cfg.gateway_listen, "starting node");
    let (res, _idx, _rest) = select_all(coalesced).await;

    match res {
        Ok(Ok(())) => {},
        Ok(Err(e)) => return Err(e),
        Err(e) => {
            if e.is_panic() {
                panic::resume_unwind(e.into_panic());
            }
        },
    }

    let _ = shutdown_tx.send(true);
    signals_task.await??;

    Ok(())
}

/// Polls [`Service::idle_for`] and signals shutdown once it exceeds
/// `linger` (`--linger-timeout`'s "exit after the last connection closes"
/// contract).
async fn linger_routine(service: Service, linger: Duration, shutdown_tx: watch::Sender<bool>) -> anyhow::Result<()> {
    let poll_interval = Duration::from_secs(1).min(linger);
    loop {
        tokio::time::sleep(poll_interval).await;
        if service.idle_for() >= linger {
            info!(?linger, "linger timeout elapsed with no activity, shutting down");
            let _ = shutdown_tx.send(true);
            return Ok(());
        }
    }
}
