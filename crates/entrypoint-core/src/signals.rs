//! Termination signal handling.
//!
//! The entrypoint is the foreground process the scheduler tracks, so
//! stopping a container delivers the signal here, not to the daemon.
//! [`wait_for_termination`] resolves with the received signal number so the
//! supervisor can forward the same signal to its child.
//!
//! ## Unix
//! Listens for SIGINT, SIGTERM (the scheduler's stop signal) and SIGQUIT.
//!
//! ## Other platforms
//! Only Ctrl-C is observed, reported as SIGINT's number.

/// Waits for a termination signal and returns its number.
///
/// Each call creates independent signal listeners.
#[cfg(unix)]
pub async fn wait_for_termination() -> std::io::Result<i32> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigquit = signal(SignalKind::quit())?;

    let signo = tokio::select! {
        _ = sigint.recv() => libc::SIGINT,
        _ = sigterm.recv() => libc::SIGTERM,
        _ = sigquit.recv() => libc::SIGQUIT,
    };
    Ok(signo)
}

/// Waits for a termination signal and returns its number.
#[cfg(not(unix))]
pub async fn wait_for_termination() -> std::io::Result<i32> {
    tokio::signal::ctrl_c().await?;
    Ok(2)
}
