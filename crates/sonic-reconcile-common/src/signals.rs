//! Unix signal handling for daemon binaries.
//!
//! SIGTERM and SIGINT request a cooperative shutdown of the daemon.
//! SIGHUP either triggers a full resync or is logged and ignored.

use tokio::signal::unix::{signal, Signal, SignalKind};
use tokio::task::JoinHandle;
use tracing::info;

use crate::daemon::DaemonHandle;
use crate::error::{ReconcileError, ReconcileResult};

/// What SIGHUP does.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum HangupAction {
    #[default]
    Ignore,
    Resync,
}

fn install(kind: SignalKind, name: &str) -> ReconcileResult<Signal> {
    signal(kind).map_err(|e| ReconcileError::internal(format!("cannot install {} handler: {}", name, e)))
}

/// Spawns the signal handling task for `daemon`.
///
/// The task ends after the first shutdown signal.
pub fn spawn_signal_handler(
    daemon: impl Into<String>,
    handle: DaemonHandle,
    on_hangup: HangupAction,
) -> ReconcileResult<JoinHandle<()>> {
    let daemon = daemon.into();
    let mut term = install(SignalKind::terminate(), "SIGTERM")?;
    let mut int = install(SignalKind::interrupt(), "SIGINT")?;
    let mut hup = install(SignalKind::hangup(), "SIGHUP")?;

    let stopping = handle.shutdown_token();

    Ok(tokio::spawn(async move {
        loop {
            let name = tokio::select! {
                _ = term.recv() => "SIGTERM",
                _ = int.recv() => "SIGINT",
                _ = hup.recv() => {
                    match on_hangup {
                        HangupAction::Ignore => {
                            info!(daemon = %daemon, "Signal 'SIGHUP' is caught and ignoring");
                        }
                        HangupAction::Resync => {
                            info!(daemon = %daemon, "Signal 'SIGHUP' is caught, resyncing");
                            handle.request_resync();
                        }
                    }
                    continue;
                }
                _ = stopping.cancelled() => return,
            };
            info!(daemon = %daemon, signal = name, "Signal is caught and exiting");
            handle.shutdown();
            return;
        }
    }))
}
