//! Shutdown signalling.
//!
//! Termination requests are turned into a `watch` channel carrying `true`.
//! The monitor checks it at its two suspension points: the inter-cycle
//! sleep and the lock poll.

use log::{error, info};
use tokio::sync::watch;

/// Creates a new shutdown channel in the "running" state.
pub fn channel() -> (watch::Sender<bool>, watch::Receiver<bool>) {
    watch::channel(false)
}

/// Returns true if shutdown has already been requested.
pub fn is_requested(shutdown_rx: &watch::Receiver<bool>) -> bool {
    *shutdown_rx.borrow()
}

/// Resolves once shutdown has been requested.
///
/// If the sender is dropped without requesting shutdown this never
/// resolves, since nothing can request it any more.
pub async fn requested(shutdown_rx: &mut watch::Receiver<bool>) {
    loop {
        if *shutdown_rx.borrow_and_update() {
            return;
        }
        if shutdown_rx.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

/// Waits for SIGINT or SIGTERM and requests shutdown.
///
/// Both signals are handled identically.
pub async fn listen_for_signals(shutdown_tx: watch::Sender<bool>) {
    match wait_for_signal().await {
        Ok(name) => info!("Received {}, shutting down gracefully...", name),
        Err(e) => {
            error!("Failed to install signal handlers: {}", e);
            return;
        }
    }
    // Receivers may already be gone if the monitor exited on its own.
    let _ = shutdown_tx.send(true);
}

#[cfg(unix)]
async fn wait_for_signal() -> std::io::Result<&'static str> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;
    tokio::select! {
        _ = sigterm.recv() => Ok("SIGTERM"),
        _ = sigint.recv() => Ok("SIGINT"),
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() -> std::io::Result<&'static str> {
    tokio::signal::ctrl_c().await?;
    Ok("Ctrl-C")
}
