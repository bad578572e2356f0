//! Collaborator interface to the embedded server/worker runtime.
//!
//! The supervisors treat the runtime as opaque. They only rely on:
//!
//! - [`HomeInitializer::setup`] - one-time preparation of the home directory
//! - [`ServerBus`] - `start`, `stop`, `get_url` for the embedded server
//! - [`WorkerBus`] - `start`, `stop` for the background worker
//!
//! [`process`] provides the production implementation that drives the
//! Kolibri executables as child processes.

pub mod home;
pub mod process;
pub mod terminate;

use crate::error::runtime::RuntimeError;

use std::path::Path;

use async_trait::async_trait;

pub use home::HomeLayoutInitializer;
pub use process::{ProcessRuntime, ProcessServerBus, ProcessWorkerBus};

/// One-time initialization of the home directory.
///
/// Called by [`SetupGuard`](crate::setup::SetupGuard) while it holds the
/// cross-process setup lock. Runs on a blocking thread.
pub trait HomeInitializer: Send + Sync {
    fn setup(&self, home: &Path) -> Result<(), RuntimeError>;
}

/// The embedded server as seen by [`ServerSupervisor`](crate::supervisor::ServerSupervisor).
#[async_trait]
pub trait ServerBus: Send + Sync {
    async fn start(&mut self) -> Result<(), RuntimeError>;

    async fn stop(&mut self) -> Result<(), RuntimeError>;

    /// The address the server actually bound. Fails if not running.
    async fn get_url(&self) -> Result<String, RuntimeError>;
}

/// The background worker as seen by [`WorkerSupervisor`](crate::supervisor::WorkerSupervisor).
#[async_trait]
pub trait WorkerBus: Send + Sync {
    async fn start(&mut self) -> Result<(), RuntimeError>;

    async fn stop(&mut self) -> Result<(), RuntimeError>;
}

/// Instantiates a fresh [`ServerBus`] for each start.
pub trait ServerFactory: Send + Sync {
    fn create_server(&self, home: &Path) -> Box<dyn ServerBus>;
}

/// Instantiates a fresh [`WorkerBus`] for each start.
pub trait WorkerFactory: Send + Sync {
    fn create_worker(&self, home: &Path) -> Box<dyn WorkerBus>;
}
