//! Lifecycle owners for the embedded server and the background worker.
//!
//! Both supervisors follow the same actor layout:
//! - Commands are sent via an mpsc channel
//! - A dedicated task owns the runtime bus and processes commands sequentially
//! - Status reads go through `Arc<RwLock<_>>` and never wait on a transition
//!
//! Because commands are serialized, a `stop` issued while a `start` is in
//! flight takes effect once that start has finished.

pub mod server;
pub mod worker;

pub use server::ServerSupervisor;
pub use worker::WorkerSupervisor;

use crate::error::setup::SetupError;
use crate::setup::SetupGuard;

use common::ErrorLocation;

use std::fmt;
use std::panic::Location;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::task::spawn_blocking;

const COMMAND_CHANNEL_CAPACITY: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LifecycleStatus {
    #[default]
    Stopped,
    Starting,
    Running,
    Stopping,
}

impl fmt::Display for LifecycleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LifecycleStatus::Stopped => write!(f, "stopped"),
            LifecycleStatus::Starting => write!(f, "starting"),
            LifecycleStatus::Running => write!(f, "running"),
            LifecycleStatus::Stopping => write!(f, "stopping"),
        }
    }
}

/// Snapshot of the embedded server. `url` is only set while `Running`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ServerHandle {
    pub status: LifecycleStatus,
    pub url: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WorkerHandle {
    pub status: LifecycleStatus,
}

/// Run [`SetupGuard::ensure_setup`] on the blocking pool.
pub(crate) async fn run_setup(guard: Arc<SetupGuard>, home: PathBuf) -> Result<(), SetupError> {
    spawn_blocking(move || guard.ensure_setup(&home))
        .await
        .map_err(|e| SetupError::Interrupted {
            message: format!("Setup task did not complete: {e}"),
            location: ErrorLocation::from(Location::caller()),
        })?
}
