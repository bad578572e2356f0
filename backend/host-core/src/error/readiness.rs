use common::ErrorLocation;

use thiserror::Error as ThisError;

#[derive(Debug, ThisError)]
pub enum ReadinessError {
    #[error("Readiness Timeout Error: {message} {location}")]
    Timeout {
        message: String,
        location: ErrorLocation,
    },

    #[error("Readiness Abandoned Error: {message} {location}")]
    Abandoned {
        message: String,
        location: ErrorLocation,
    },
}
