use crate::error::runtime::RuntimeError;
use crate::error::setup::SetupError;

use common::ErrorLocation;

use thiserror::Error as ThisError;

#[derive(Debug, ThisError)]
pub enum StartError {
    #[error("Start Setup Error: {message} {location}")]
    Setup {
        message: String,
        location: ErrorLocation,
        #[source]
        source: SetupError,
    },

    #[error("Start Runtime Error: {message} {location}")]
    Runtime {
        message: String,
        location: ErrorLocation,
        #[source]
        source: RuntimeError,
    },

    #[error("Invalid State Error: {message} {location}")]
    InvalidState {
        message: String,
        location: ErrorLocation,
    },

    #[error("Supervisor Unavailable Error: {message} {location}")]
    Unavailable {
        message: String,
        location: ErrorLocation,
    },
}

#[derive(Debug, ThisError)]
pub enum StopError {
    #[error("Stop Runtime Error: {message} {location}")]
    Runtime {
        message: String,
        location: ErrorLocation,
        #[source]
        source: RuntimeError,
    },

    #[error("Supervisor Unavailable Error: {message} {location}")]
    Unavailable {
        message: String,
        location: ErrorLocation,
    },
}
