use crate::error::import::ImportError;
use crate::import::{ContentImporter, ImportSummary};

use common::ErrorLocation;

use std::fmt;
use std::fs::File;
use std::io::{BufReader, Read, Seek};
use std::panic::Location;
use std::path::{Path, PathBuf};

use log::{error, info};
use zip::result::ZipError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportState {
    Idle,
    Importing,
    Success,
    Error,
}

impl fmt::Display for ImportState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImportState::Idle => write!(f, "idle"),
            ImportState::Importing => write!(f, "importing"),
            ImportState::Success => write!(f, "success"),
            ImportState::Error => write!(f, "error"),
        }
    }
}

/// Anything an archive can be read from: a file, or bytes in memory.
pub trait ArchiveSource: Read + Seek + Send {}

impl<T: Read + Seek + Send> ArchiveSource for T {}

/// One user-initiated import. Runs once, then only reports its outcome.
pub struct ImportJob {
    source: Option<Box<dyn ArchiveSource>>,
    destination: PathBuf,
    state: ImportState,
    error_detail: Option<String>,
}

impl ImportJob {
    pub fn new(source: impl ArchiveSource + 'static, destination: impl Into<PathBuf>) -> Self {
        Self {
            source: Some(Box::new(source)),
            destination: destination.into(),
            state: ImportState::Idle,
            error_detail: None,
        }
    }

    /// Job reading the archive at `archive`.
    #[track_caller]
    pub fn from_path(archive: &Path, destination: impl Into<PathBuf>) -> Result<Self, ImportError> {
        let file = File::open(archive).map_err(|e| ImportError::Archive {
            message: format!("Failed to open {}", archive.display()),
            location: ErrorLocation::from(Location::caller()),
            source: ZipError::Io(e),
        })?;

        Ok(Self::new(BufReader::new(file), destination))
    }

    pub fn state(&self) -> ImportState {
        self.state
    }

    pub fn error_detail(&self) -> Option<&str> {
        self.error_detail.as_deref()
    }

    pub fn destination(&self) -> &Path {
        &self.destination
    }

    /// Run the import. Blocking; use `spawn_blocking` from async code.
    ///
    /// # Errors
    ///
    /// [`ImportError::AlreadyRun`] on a second call, otherwise whatever
    /// [`ContentImporter::import`] reports.
    pub fn run(&mut self, importer: &ContentImporter) -> Result<ImportSummary, ImportError> {
        let Some(source) = self.source.take() else {
            return Err(ImportError::AlreadyRun {
                message: format!("Import job already {}", self.state),
                location: ErrorLocation::from(Location::caller()),
            });
        };

        self.state = ImportState::Importing;

        match importer.import(source, &self.destination) {
            Ok(summary) => {
                self.state = ImportState::Success;
                info!("Import into {} succeeded", self.destination.display());
                Ok(summary)
            }
            Err(e) => {
                self.state = ImportState::Error;
                self.error_detail = Some(e.to_string());
                error!("Import into {} failed: {e}", self.destination.display());
                Err(e)
            }
        }
    }
}
