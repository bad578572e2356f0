use crate::error::AppError;

use host_core::config::HostConfig;
use host_core::error::CoreError;
use host_core::error::import::ImportError;
use host_core::import::{ContentImporter, ImportJob, ImportOptions, ImportSummary};
use host_core::runtime::HomeInitializer;
use host_core::setup::{SetupGuard, SetupState};

use common::ErrorLocation;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::{info, warn};

/// Import options from configuration.
pub fn options_from_config(config: &HostConfig) -> ImportOptions {
    ImportOptions {
        on_prefix_violation: config.import.on_prefix_violation,
    }
}

/// `endless-key import <ARCHIVE>`.
///
/// Initializes the home first, then streams the archive into it. Runs on a
/// blocking thread since both steps do synchronous file I/O.
///
/// Under [`host_core::import::PrefixViolationPolicy::Stop`] an entry outside
/// `content/` fails the command; files extracted before it are left in place.
pub async fn run(
    archive: &Path,
    home: &Path,
    initializer: Arc<dyn HomeInitializer>,
    options: ImportOptions,
) -> Result<ImportSummary, AppError> {
    let archive: PathBuf = archive.to_path_buf();
    let home: PathBuf = home.to_path_buf();

    info!(
        "Importing {} into {}",
        archive.display(),
        home.display()
    );

    let summary = tokio::task::spawn_blocking(move || -> Result<ImportSummary, CoreError> {
        SetupGuard::new(SetupState::for_home(&home), initializer).ensure_setup(&home)?;

        let mut job = ImportJob::from_path(&archive, &home)?;
        let result = job.run(&ContentImporter::new(options));
        info!("Import finished in state {}", job.state());

        if let Err(ImportError::PrefixViolation { ref summary, .. }) = result {
            report(summary);
        }
        Ok(result?)
    })
    .await
    .map_err(|e| AppError::App {
        message: format!("Import task failed: {e}"),
        location: ErrorLocation::here(),
    })??;

    report(&summary);
    Ok(summary)
}

fn report(summary: &ImportSummary) {
    info!(
        "Imported {} files and {} directories",
        summary.files_written, summary.directories_created
    );

    if let Some(ref manifest) = summary.manifest_name {
        info!("Manifest written as {manifest}");
    }
    for dir in &summary.directory_failures {
        warn!("Directory not created: {dir}");
    }
    if !summary.skipped.is_empty() {
        warn!(
            "Skipped {} entries outside content/",
            summary.skipped.len()
        );
    }
}
