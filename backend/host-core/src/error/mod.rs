pub mod config;
pub mod import;
pub mod ipc;
pub mod readiness;
pub mod runtime;
pub mod setup;
pub mod supervisor;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Setup(#[from] setup::SetupError),

    #[error(transparent)]
    Start(#[from] supervisor::StartError),

    #[error(transparent)]
    Stop(#[from] supervisor::StopError),

    #[error(transparent)]
    Ipc(#[from] ipc::IpcError),

    #[error(transparent)]
    Import(#[from] import::ImportError),

    #[error(transparent)]
    Readiness(#[from] readiness::ReadinessError),

    #[error(transparent)]
    Config(#[from] config::ConfigError),
}
