use crate::error::runtime::RuntimeError;

use common::ErrorLocation;

use std::path::PathBuf;

use thiserror::Error as ThisError;

#[derive(Debug, ThisError)]
pub enum SetupError {
    #[error("Setup Lock Error: {message}: {path} {location}")]
    Lock {
        message: String,
        path: PathBuf,
        location: ErrorLocation,
        #[source]
        source: std::io::Error,
    },

    #[error("Setup Initialization Error: {message} {location}")]
    Initialization {
        message: String,
        location: ErrorLocation,
        #[source]
        source: RuntimeError,
    },

    #[error("Setup Interrupted Error: {message} {location}")]
    Interrupted {
        message: String,
        location: ErrorLocation,
    },
}
