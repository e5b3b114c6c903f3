//! OS termination signals.

use tracing::info;

/// Waits until the process is asked to terminate.
///
/// Listens for Ctrl+C everywhere and SIGTERM on unix. Returns `Err` only if
/// a signal handler cannot be installed.
#[cfg(unix)]
pub async fn wait_for_signal() -> std::io::Result<()> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigterm = signal(SignalKind::terminate())?;

    tokio::select! {
        res = tokio::signal::ctrl_c() => {
            res?;
            info!("Received Ctrl+C, starting graceful shutdown");
        }
        _ = sigterm.recv() => {
            info!("Received SIGTERM, starting graceful shutdown");
        }
    }
    Ok(())
}

/// Waits until the process is asked to terminate.
#[cfg(not(unix))]
pub async fn wait_for_signal() -> std::io::Result<()> {
    tokio::signal::ctrl_c().await?;
    info!("Received Ctrl+C, starting graceful shutdown");
    Ok(())
}
