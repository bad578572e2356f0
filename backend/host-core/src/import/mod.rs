//! Streaming extraction of content packages into the Kolibri home.
//!
//! Entries are extracted one at a time in archive order. Only the central
//! directory is held in memory; entry data is streamed from the source through
//! a fixed buffer. Reading sizes from the central directory means entries
//! written with a trailing data descriptor import like any other. The import
//! is not atomic: whatever was written before a failure or a stop stays on disk.

pub mod job;

pub use job::{ArchiveSource, ImportJob, ImportState};

use crate::error::import::ImportError;

use common::ErrorLocation;

use std::fs::{File, create_dir_all};
use std::io::{ErrorKind, Read, Seek, Write};
use std::panic::Location;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use zip::ZipArchive;

pub const CONTENT_PREFIX: &str = "content/";
pub const MANIFEST_ENTRY: &str = "content/manifest.json";
const TRANSFER_BUFFER_SIZE: usize = 8 * 1024;

/// What to do with an entry outside [`CONTENT_PREFIX`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrefixViolationPolicy {
    /// End extraction at the first violating entry.
    #[default]
    Stop,
    /// Log the entry and move on.
    Skip,
}

#[derive(Debug, Clone, Default)]
pub struct ImportOptions {
    pub on_prefix_violation: PrefixViolationPolicy,
}

/// What an import actually did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportSummary {
    pub files_written: usize,
    pub directories_created: usize,
    /// Directory entries that could not be created. Logged, never fatal.
    pub directory_failures: Vec<String>,
    /// Entries passed over under [`PrefixViolationPolicy::Skip`].
    pub skipped: Vec<String>,
    /// Output name given to the manifest, if the archive had one.
    pub manifest_name: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ContentImporter {
    options: ImportOptions,
}

impl ContentImporter {
    pub fn new(options: ImportOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &ImportOptions {
        &self.options
    }

    /// Extract a zip archive into `destination`.
    ///
    /// # Errors
    ///
    /// - [`ImportError::Archive`] - the source is not a readable zip
    /// - [`ImportError::PrefixViolation`] - an entry outside [`CONTENT_PREFIX`]
    ///   ended extraction; entries before it stay on disk
    /// - [`ImportError::UnsafePath`] - an entry would land outside `destination`
    /// - [`ImportError::Write`] - a file entry could not be written
    pub fn import<R: Read + Seek>(
        &self,
        source: R,
        destination: &Path,
    ) -> Result<ImportSummary, ImportError> {
        let mut archive = ZipArchive::new(source)?;
        let mut summary = ImportSummary::default();

        info!(
            "Importing {} entries into {}",
            archive.len(),
            destination.display()
        );

        for index in 0..archive.len() {
            let mut entry = archive.by_index(index)?;
            let name = entry.name().to_string();

            if !name.starts_with(CONTENT_PREFIX) {
                match self.options.on_prefix_violation {
                    PrefixViolationPolicy::Stop => {
                        warn!("Entry {name} is outside {CONTENT_PREFIX}, stopping import");
                        return Err(ImportError::PrefixViolation {
                            entry: name,
                            summary: Box::new(summary),
                            location: ErrorLocation::from(Location::caller()),
                        });
                    }
                    PrefixViolationPolicy::Skip => {
                        warn!("Entry {name} is outside {CONTENT_PREFIX}, skipping");
                        summary.skipped.push(name);
                        continue;
                    }
                }
            }

            let relative = entry.enclosed_name().ok_or_else(|| ImportError::UnsafePath {
                entry: name.clone(),
                location: ErrorLocation::from(Location::caller()),
            })?;

            if entry.is_dir() {
                let target = destination.join(&relative);
                match create_dir_all(&target) {
                    Ok(()) => {
                        debug!("Created {}", target.display());
                        summary.directories_created += 1;
                    }
                    Err(e) => {
                        warn!("Failed to create directory {}: {e}", target.display());
                        summary.directory_failures.push(name);
                    }
                }
                continue;
            }

            let output_name = if name == MANIFEST_ENTRY {
                let renamed = timestamped_manifest_name();
                debug!("Writing manifest as {renamed}");
                summary.manifest_name = Some(renamed.clone());
                PathBuf::from(renamed)
            } else {
                relative
            };

            let target = destination.join(&output_name);
            write_entry(&mut entry, &target)?;
            summary.files_written += 1;
        }

        info!(
            "Import finished: {} files, {} directories",
            summary.files_written, summary.directories_created
        );

        Ok(summary)
    }
}

/// `content/manifest.<epoch-secs>.json`
pub fn timestamped_manifest_name() -> String {
    let secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default();
    format!("{CONTENT_PREFIX}manifest.{secs}.json")
}

#[track_caller]
fn write_entry<R: Read>(entry: &mut R, target: &Path) -> Result<(), ImportError> {
    let write_error = |path: &Path, source| ImportError::Write {
        path: path.to_path_buf(),
        location: ErrorLocation::from(Location::caller()),
        source,
    };

    if let Some(parent) = target.parent() {
        create_dir_all(parent).map_err(|e| write_error(parent, e))?;
    }

    let mut file = File::create(target).map_err(|e| write_error(target, e))?;
    let mut buffer = [0u8; TRANSFER_BUFFER_SIZE];

    loop {
        let read = match entry.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(write_error(target, e)),
        };
        file.write_all(&buffer[..read])
            .map_err(|e| write_error(target, e))?;
    }

    file.flush().map_err(|e| write_error(target, e))?;
    debug!("Wrote {}", target.display());

    Ok(())
}
