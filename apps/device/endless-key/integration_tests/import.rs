use crate::helpers::{Counters, FakeRuntime, temp_paths};

use endless_key::commands::import;
use endless_key::error::AppError;

use host_core::config::HostConfig;
use host_core::error::CoreError;
use host_core::error::import::ImportError;
use host_core::import::PrefixViolationPolicy;

use std::io::Write;
use std::path::Path;

use zip::ZipWriter;
use zip::write::SimpleFileOptions;

fn write_archive(path: &Path, files: &[(&str, &[u8])]) {
    let file = std::fs::File::create(path).expect("create archive");
    let mut zip = ZipWriter::new(file);
    for (name, data) in files {
        zip.start_file(*name, SimpleFileOptions::default())
            .expect("start file");
        zip.write_all(data).expect("write file");
    }
    zip.finish().expect("finish archive");
}

/// **VALUE**: The CLI import initializes the home and lands content there.
///
/// **BUG THIS CATCHES**: Extracting relative to the working directory instead
/// of the home, or importing into a home that was never set up.
#[tokio::test]
async fn given_archive_when_imported_then_content_written_under_home() {
    // GIVEN: A fresh home and a content archive
    let (dir, paths) = temp_paths();
    let archive = dir.path().join("content.zip");
    write_archive(
        &archive,
        &[
            ("content/databases/db.sqlite3", b"db"),
            ("content/manifest.json", b"{}"),
        ],
    );
    let (runtime, counters) = FakeRuntime::new(false);

    // WHEN: Running the import command
    let summary = import::run(
        &archive,
        &paths.home,
        runtime,
        import::options_from_config(&HostConfig::default()),
    )
    .await
    .expect("import");

    // THEN: Setup ran, files landed, manifest renamed
    assert_eq!(Counters::get(&counters.setups), 1);
    assert_eq!(summary.files_written, 2);
    assert_eq!(
        std::fs::read(paths.home.join("content/databases/db.sqlite3")).unwrap(),
        b"db"
    );
    assert!(!paths.home.join("content/manifest.json").exists());
    let manifest = summary.manifest_name.expect("manifest renamed");
    assert!(paths.home.join(manifest).exists());
}

#[tokio::test]
async fn given_skip_policy_in_config_when_imported_then_later_entries_kept() {
    let (dir, paths) = temp_paths();
    let archive = dir.path().join("content.zip");
    write_archive(
        &archive,
        &[
            ("README.txt", b"hello"),
            ("content/later.bin", b"later"),
        ],
    );
    let (runtime, _counters) = FakeRuntime::new(false);
    let mut config = HostConfig::default();
    config.import.on_prefix_violation = PrefixViolationPolicy::Skip;

    let summary = import::run(
        &archive,
        &paths.home,
        runtime,
        import::options_from_config(&config),
    )
    .await
    .expect("import");

    assert_eq!(summary.skipped, vec!["README.txt".to_string()]);
    assert!(paths.home.join("content/later.bin").exists());
    assert!(!paths.home.join("README.txt").exists());
}

/// **VALUE**: With the default policy, an archive that is not shaped like a
/// content package fails the command instead of exiting cleanly.
///
/// **BUG THIS CATCHES**: `endless-key import` exiting 0 after importing nothing.
#[tokio::test]
async fn given_entry_outside_content_when_imported_then_command_fails() {
    // GIVEN: A content entry followed by one outside content/
    let (dir, paths) = temp_paths();
    let archive = dir.path().join("content.zip");
    write_archive(
        &archive,
        &[
            ("content/first.bin", b"first"),
            ("other/x", b"x"),
            ("content/later.bin", b"later"),
        ],
    );
    let (runtime, _counters) = FakeRuntime::new(false);

    // WHEN
    let result = import::run(
        &archive,
        &paths.home,
        runtime,
        import::options_from_config(&HostConfig::default()),
    )
    .await;

    // THEN: A prefix failure naming the entry; the earlier file stays
    match result {
        Err(AppError::Core(CoreError::Import(ImportError::PrefixViolation {
            entry,
            summary,
            ..
        }))) => {
            assert_eq!(entry, "other/x");
            assert_eq!(summary.files_written, 1);
        }
        other => panic!("expected a prefix violation, got {other:?}"),
    }
    assert!(paths.home.join("content/first.bin").exists());
    assert!(!paths.home.join("content/later.bin").exists());
}

#[tokio::test]
async fn given_missing_archive_when_imported_then_core_import_error() {
    let (dir, paths) = temp_paths();
    let (runtime, _counters) = FakeRuntime::new(false);

    let result = import::run(
        &dir.path().join("missing.zip"),
        &paths.home,
        runtime,
        import::options_from_config(&HostConfig::default()),
    )
    .await;

    assert!(matches!(
        result,
        Err(AppError::Core(CoreError::Import(_)))
    ));
}
