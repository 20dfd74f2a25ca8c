//! Signal handling and coordinated shutdown. Listens for interrupt,
//! terminate, abort, quit, and hangup, and notifies the coordinator's run
//! loop so it can drain table adapters before the process exits.

use std::sync::Arc;

use tokio::signal::ctrl_c;
#[cfg(target_family = "unix")]
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::Notify;

/// Wait for any termination signal the platform offers, then notify
/// `shutdown`. Runs for the remaining lifetime of the process; spawn it once
/// at startup.
pub async fn listen_for_shutdown(shutdown: Arc<Notify>) {
    #[cfg(target_family = "unix")]
    {
        let mut term = match signal(SignalKind::terminate()) {
            Ok(s) => s,
            Err(err) => {
                tracing::error!("failed to install SIGTERM handler: {}", err);
                return;
            }
        };
        let mut quit = match signal(SignalKind::quit()) {
            Ok(s) => s,
            Err(err) => {
                tracing::error!("failed to install SIGQUIT handler: {}", err);
                return;
            }
        };
        let mut hangup = match signal(SignalKind::hangup()) {
            Ok(s) => s,
            Err(err) => {
                tracing::error!("failed to install SIGHUP handler: {}", err);
                return;
            }
        };
        // No named constructor for SIGABRT in `SignalKind`; 6 is its value
        // on every platform `target_family = "unix"` covers here.
        let mut abort = match signal(SignalKind::from_raw(6)) {
            Ok(s) => s,
            Err(err) => {
                tracing::error!("failed to install SIGABRT handler: {}", err);
                return;
            }
        };

        tokio::select! {
            _ = ctrl_c() => tracing::info!("received interrupt, shutting down"),
            _ = term.recv() => tracing::info!("received terminate, shutting down"),
            _ = abort.recv() => tracing::info!("received abort, shutting down"),
            _ = quit.recv() => tracing::info!("received quit, shutting down"),
            _ = hangup.recv() => tracing::info!("received hangup, shutting down"),
        }
    }

    #[cfg(not(target_family = "unix"))]
    {
        if ctrl_c().await.is_ok() {
            tracing::info!("received interrupt, shutting down");
        }
    }

    shutdown.notify_waiters();
}
