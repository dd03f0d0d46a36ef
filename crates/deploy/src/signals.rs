//! Process-wide interrupt and termination signals.

use tokio::signal;

/// The signal that interrupted a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum ShutdownSignal {
    #[strum(to_string = "SIGINT")]
    Interrupt,
    #[strum(to_string = "SIGTERM")]
    Terminate,
}

/// Resolve once the process receives Ctrl+C or SIGTERM.
///
/// A handler that cannot be installed never fires.
pub async fn shutdown_signal() -> ShutdownSignal {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    let received = tokio::select! {
        () = ctrl_c => ShutdownSignal::Interrupt,
        () = terminate => ShutdownSignal::Terminate,
    };

    tracing::warn!(signal = %received, "Received shutdown signal, cleaning up...");
    received
}
