use std::process::ExitCode;
use std::time::Duration;
use tracing::{error, info, warn};

use crate::services::ServiceResult;
use crate::services::manager::ServiceManager;
use crate::utils::fmt_duration;

/// Resolves on SIGINT, or SIGTERM on Unix.
async fn shutdown_signal() -> &'static str {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = ?e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = ?e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => "SIGINT",
        () = terminate => "SIGTERM",
    }
}

/// Run until a signal arrives or a service dies, then shut everything down.
pub async fn handle_shutdown_signals(mut manager: ServiceManager, shutdown_timeout: Duration) -> ExitCode {
    let mut exit_code = ExitCode::SUCCESS;

    tokio::select! {
        (name, result) = manager.run() => {
            match result {
                ServiceResult::Error(e) => {
                    error!(service = name, error = ?e, "Service failed, shutting down");
                    exit_code = ExitCode::FAILURE;
                }
                other => warn!(service = name, result = ?other, "Service exited, shutting down"),
            }
        }
        signal = shutdown_signal() => {
            info!(signal, "Received shutdown signal");
        }
    }

    info!(timeout = fmt_duration(shutdown_timeout), "Stopping services");
    let stuck = manager.shutdown(shutdown_timeout).await;
    if stuck.is_empty() {
        info!("All services stopped gracefully");
    } else {
        warn!(services = ?stuck, "Some services did not stop in time");
        exit_code = ExitCode::FAILURE;
    }
    exit_code
}
