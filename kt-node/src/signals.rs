// Copyright © 2026 Key Transparency Contributors
// SPDX-License-Identifier: Apache-2.0

//! Termination signal handling, grounded on `cli/linkd-lib::signals`:
//! waits for the platform's interrupt/terminate signals and flips a
//! `watch` channel so every spawned subsystem (RPC listener, gateway,
//! per-directory sequencers) can shut down cooperatively.

use tokio::select;
use tokio::sync::watch;
use tracing::{info, instrument};

#[cfg(unix)]
#[instrument(name = "signals subroutine", skip(shutdown_tx))]
pub async fn routine(shutdown_tx: watch::Sender<bool>) -> anyhow::Result<()> {
    use tokio::signal::unix::*;

    let mut int = signal(SignalKind::interrupt())?;
    let mut quit = signal(SignalKind::quit())?;
    let mut term = signal(SignalKind::terminate())?;

    let signal = select! {
        _ = int.recv() => "SIGINT",
        _ = quit.recv() => "SIGQUIT",
        _ = term.recv() => "SIGTERM",
    };

    info!(signal, "received termination signal");
    let _ = shutdown_tx.send(true);

    Ok(())
}

#[cfg(windows)]
#[instrument(name = "signals subroutine", skip(shutdown_tx))]
pub async fn routine(shutdown_tx: watch::Sender<bool>) -> anyhow::Result<()> {
    use tokio::signal::windows::*;

    let mut br = ctrl_break()?;
    let mut c = ctrl_c()?;

    select! {
        _ = br.recv() => info!("received Break signal"),
        _ = c.recv() => info!("received CtrlC signal"),
    };

    let _ = shutdown_tx.send(true);

    Ok(())
}
