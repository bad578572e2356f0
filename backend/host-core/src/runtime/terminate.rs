use crate::error::runtime::RuntimeError;

use common::ErrorLocation;

use std::panic::Location;
use std::time::Duration;

use log::{debug, warn};
use sysinfo::{Pid, Process, ProcessesToUpdate, Signal, System};
use tokio::process::Child as TokioChild;
use tokio::time::timeout as TokioTimeout;

const GRACEFUL_EXIT_MAX_WAIT: Duration = Duration::from_secs(5);

pub(crate) fn with_process<F, R>(pid: u32, f: F) -> Option<R>
where
    F: FnOnce(&Process) -> R,
{
    let mut sys = System::new();
    sys.refresh_processes(ProcessesToUpdate::Some(&[Pid::from_u32(pid)]), true);

    sys.process(Pid::from_u32(pid)).map(f)
}

/// Ask a process to terminate gracefully.
///
/// Returns `false` if the process is gone or the platform has no graceful signal.
pub(crate) fn send_terminate(pid: u32) -> bool {
    with_process(pid, |p| match p.kill_with(Signal::Term) {
        Some(sent) => {
            debug!("Sent SIGTERM to PID {pid}: success={sent}");
            sent
        }
        None => {
            debug!("SIGTERM unsupported on this platform for PID {pid}");
            false
        }
    })
    .unwrap_or_else(|| {
        debug!("Process {pid} not found");
        false
    })
}

/// Stop an owned child: SIGTERM, wait up to 5 seconds, then force kill.
///
/// The child is always reaped before returning.
pub(crate) async fn terminate_child(mut child: TokioChild, name: &str) -> Result<(), RuntimeError> {
    if let Ok(Some(status)) = child.try_wait() {
        debug!("{name} already exited with {status}");
        return Ok(());
    }

    let graceful = child
        .id()
        .map(|pid| tokio::task::spawn_blocking(move || send_terminate(pid)));

    let sent = match graceful {
        Some(task) => task.await.unwrap_or(false),
        None => false,
    };

    if sent {
        match TokioTimeout(GRACEFUL_EXIT_MAX_WAIT, child.wait()).await {
            Ok(Ok(status)) => {
                debug!("{name} exited with {status}");
                return Ok(());
            }
            Ok(Err(e)) => warn!("Failed waiting for {name} to exit: {e}"),
            Err(_) => warn!("{name} still running after {GRACEFUL_EXIT_MAX_WAIT:?}, killing"),
        }
    }

    child.kill().await.map_err(|e| RuntimeError::Stop {
        message: format!("Failed to kill {name}: {e}"),
        location: ErrorLocation::from(Location::caller()),
    })?;

    debug!("{name} killed");
    Ok(())
}
