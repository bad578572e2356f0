use host_core::error::CoreError;

use common::ErrorLocation;

use thiserror::Error;

/// Errors surfaced by the device binary.
///
/// Library failures keep their own structured errors under [`AppError::Core`];
/// everything the binary does itself (logging, endpoint file, signals) is
/// reported as [`AppError::App`].
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Endless Key Error: {message} {location}")]
    App {
        message: String,
        location: ErrorLocation,
    },

    #[error(transparent)]
    Core(#[from] CoreError),
}
