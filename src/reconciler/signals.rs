//! Process termination signals for the reconcile driver.
//!
//! Unix listens for `SIGINT`, `SIGTERM` and `SIGQUIT`; other platforms for Ctrl-C.

use std::io;

#[cfg(unix)]
async fn any_termination_signal() -> io::Result<()> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut listeners = [
        signal(SignalKind::interrupt())?,
        signal(SignalKind::terminate())?,
        signal(SignalKind::quit())?,
    ];
    let [int, term, quit] = &mut listeners;
    tokio::select! {
        _ = int.recv() => {}
        _ = term.recv() => {}
        _ = quit.recv() => {}
    }
    Ok(())
}

#[cfg(not(unix))]
async fn any_termination_signal() -> io::Result<()> {
    tokio::signal::ctrl_c().await
}

/// Resolves on the first termination signal when `enabled`; never resolves otherwise.
///
/// If listeners cannot be registered the failure is logged and the future never
/// resolves, leaving cancellation as the only way to stop the driver.
pub(crate) async fn shutdown_requested(enabled: bool) {
    if enabled {
        match any_termination_signal().await {
            Ok(()) => return,
            Err(e) => {
                tracing::warn!(error = %e, "cannot listen for termination signals");
            }
        }
    }
    std::future::pending::<()>().await
}
