use crate::import::ImportSummary;

use common::ErrorLocation;

use std::io::Error as IoError;
use std::panic::Location;
use std::path::PathBuf;

use thiserror::Error as ThisError;
use zip::result::ZipError;

#[derive(Debug, ThisError)]
pub enum ImportError {
    #[error("Archive Error: {message} {location}")]
    Archive {
        message: String,
        location: ErrorLocation,
        #[source]
        source: ZipError,
    },

    #[error(
        "Prefix Violation Error: {entry} is outside content/, stopped after {} files {location}",
        .summary.files_written
    )]
    PrefixViolation {
        entry: String,
        /// What was written before the violating entry.
        summary: Box<ImportSummary>,
        location: ErrorLocation,
    },

    #[error("Unsafe Path Error: {entry} escapes the destination {location}")]
    UnsafePath {
        entry: String,
        location: ErrorLocation,
    },

    #[error("Write Error: {path}: {source} {location}")]
    Write {
        path: PathBuf,
        location: ErrorLocation,
        #[source]
        source: IoError,
    },

    #[error("Already Run Error: {message} {location}")]
    AlreadyRun {
        message: String,
        location: ErrorLocation,
    },

    #[error("Import Interrupted Error: {message} {location}")]
    Interrupted {
        message: String,
        location: ErrorLocation,
    },
}

impl From<ZipError> for ImportError {
    #[track_caller]
    fn from(error: ZipError) -> Self {
        ImportError::Archive {
            message: format!("Failed to read archive: {error}"),
            location: ErrorLocation::from(Location::caller()),
            source: error,
        }
    }
}
