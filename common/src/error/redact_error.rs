use crate::ErrorLocation;

use thiserror::Error as ThisError;

/// A secret was about to leave the process through serde.
#[derive(Debug, ThisError)]
pub enum RedactError {
    #[error("Redaction Error: refusing to serialize {secret}, call expose() explicitly {location}")]
    Serialization {
        secret: &'static str,
        location: ErrorLocation,
    },
}
