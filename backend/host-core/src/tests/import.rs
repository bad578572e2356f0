use crate::error::import::ImportError;
use crate::import::{
    ContentImporter, ImportJob, ImportOptions, ImportState, PrefixViolationPolicy,
};

use std::io::{Cursor, Write};
use std::path::Path;

use flate2::write::DeflateEncoder;
use flate2::{Compression, Crc};
use regex::Regex;
use tempfile::TempDir;
use zip::ZipWriter;
use zip::write::SimpleFileOptions;

enum Entry<'a> {
    File(&'a str, &'a [u8]),
    Dir(&'a str),
}

fn build_archive(entries: &[Entry<'_>]) -> Vec<u8> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default();

    for entry in entries {
        match entry {
            Entry::File(name, data) => {
                writer.start_file(*name, options).expect("start file");
                writer.write_all(data).expect("write entry");
            }
            Entry::Dir(name) => {
                writer.add_directory(*name, options).expect("add dir");
            }
        }
    }

    writer.finish().expect("finish archive").into_inner()
}

/// Lays entries out the way a writer that cannot seek back does: the local
/// header carries flag bit 3 with CRC and sizes zeroed, the real values follow
/// the data in a descriptor and are repeated in the central directory.
fn build_archive_with_data_descriptors(files: &[(&str, &[u8])]) -> Vec<u8> {
    const FLAG_DATA_DESCRIPTOR: u16 = 1 << 3;
    const METHOD_DEFLATED: u16 = 8;
    const VERSION: u16 = 20;
    const DOS_DATE_1980_01_01: u16 = (1 << 5) | 1;

    fn u16le(out: &mut Vec<u8>, value: u16) {
        out.extend_from_slice(&value.to_le_bytes());
    }
    fn u32le(out: &mut Vec<u8>, value: u32) {
        out.extend_from_slice(&value.to_le_bytes());
    }

    let mut archive = Vec::new();
    let mut central = Vec::new();

    for (name, data) in files {
        let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(data).expect("deflate");
        let compressed = encoder.finish().expect("finish deflate");
        let mut crc = Crc::new();
        crc.update(data);
        let crc = crc.sum();
        let header_offset = archive.len() as u32;

        u32le(&mut archive, 0x0403_4b50);
        u16le(&mut archive, VERSION);
        u16le(&mut archive, FLAG_DATA_DESCRIPTOR);
        u16le(&mut archive, METHOD_DEFLATED);
        u16le(&mut archive, 0);
        u16le(&mut archive, DOS_DATE_1980_01_01);
        u32le(&mut archive, 0);
        u32le(&mut archive, 0);
        u32le(&mut archive, 0);
        u16le(&mut archive, name.len() as u16);
        u16le(&mut archive, 0);
        archive.extend_from_slice(name.as_bytes());
        archive.extend_from_slice(&compressed);

        u32le(&mut archive, 0x0807_4b50);
        u32le(&mut archive, crc);
        u32le(&mut archive, compressed.len() as u32);
        u32le(&mut archive, data.len() as u32);

        u32le(&mut central, 0x0201_4b50);
        u16le(&mut central, VERSION);
        u16le(&mut central, VERSION);
        u16le(&mut central, FLAG_DATA_DESCRIPTOR);
        u16le(&mut central, METHOD_DEFLATED);
        u16le(&mut central, 0);
        u16le(&mut central, DOS_DATE_1980_01_01);
        u32le(&mut central, crc);
        u32le(&mut central, compressed.len() as u32);
        u32le(&mut central, data.len() as u32);
        u16le(&mut central, name.len() as u16);
        u16le(&mut central, 0);
        u16le(&mut central, 0);
        u16le(&mut central, 0);
        u16le(&mut central, 0);
        u32le(&mut central, 0);
        u32le(&mut central, header_offset);
        central.extend_from_slice(name.as_bytes());
    }

    let central_offset = archive.len() as u32;
    let central_size = central.len() as u32;
    archive.extend_from_slice(&central);

    u32le(&mut archive, 0x0605_4b50);
    u16le(&mut archive, 0);
    u16le(&mut archive, 0);
    u16le(&mut archive, files.len() as u16);
    u16le(&mut archive, files.len() as u16);
    u32le(&mut archive, central_size);
    u32le(&mut archive, central_offset);
    u16le(&mut archive, 0);

    archive
}

fn importer(policy: PrefixViolationPolicy) -> ContentImporter {
    ContentImporter::new(ImportOptions {
        on_prefix_violation: policy,
    })
}

fn manifest_files(dest: &Path) -> Vec<String> {
    std::fs::read_dir(dest.join("content"))
        .expect("read content dir")
        .filter_map(|e| e.ok())
        .map(|e| e.file_name().to_string_lossy().to_string())
        .filter(|name| name.starts_with("manifest"))
        .collect()
}

/// **VALUE**: Happy path: data extracted byte for byte, manifest renamed.
///
/// **BUG THIS CATCHES**: Repeated imports overwriting an earlier manifest.
#[test]
fn given_valid_archive_when_imported_then_files_extracted_and_manifest_timestamped() {
    // GIVEN: An archive with a manifest and a data file
    let payload: Vec<u8> = (0..20_000u32).map(|i| (i % 251) as u8).collect();
    let archive = build_archive(&[
        Entry::File("content/manifest.json", br#"{"channels": []}"#),
        Entry::Dir("content/data/"),
        Entry::File("content/data/a.bin", &payload),
    ]);
    let dest = TempDir::new().expect("temp dir");

    // WHEN: Imported
    let summary = importer(PrefixViolationPolicy::Stop)
        .import(Cursor::new(archive), dest.path())
        .expect("import");

    // THEN: Data intact
    let written = std::fs::read(dest.path().join("content/data/a.bin")).expect("read a.bin");
    assert_eq!(written, payload);

    // THEN: Manifest stored under a timestamped name only
    let manifest_re = Regex::new(r"^content/manifest\.\d+\.json$").expect("regex");
    let manifest_name = summary.manifest_name.expect("manifest name");
    assert!(manifest_re.is_match(&manifest_name), "got {manifest_name}");
    assert!(!dest.path().join("content/manifest.json").exists());
    assert_eq!(manifest_files(dest.path()).len(), 1);

    assert_eq!(summary.files_written, 2);
    assert_eq!(summary.directories_created, 1);
}

/// **VALUE**: Archives from writers that cannot seek (Java `ZipOutputStream`,
/// `zip -` on a pipe) put sizes in a trailing data descriptor.
///
/// **BUG THIS CATCHES**: Reading entry lengths from local headers, which
/// rejects every such archive as unsupported before writing anything.
#[test]
fn given_entries_with_data_descriptors_when_imported_then_files_extracted() {
    // GIVEN: Two deflated entries whose local headers carry no sizes
    let payload: Vec<u8> = (0..10_000u32).map(|i| (i % 97) as u8).collect();
    let archive = build_archive_with_data_descriptors(&[
        ("content/data/a.bin", &payload),
        ("content/manifest.json", br#"{"channels": []}"#),
    ]);
    let dest = TempDir::new().expect("temp dir");

    // WHEN
    let summary = importer(PrefixViolationPolicy::Stop)
        .import(Cursor::new(archive), dest.path())
        .expect("import");

    // THEN: Both entries written, data intact
    assert_eq!(summary.files_written, 2);
    assert_eq!(
        std::fs::read(dest.path().join("content/data/a.bin")).expect("read a.bin"),
        payload
    );
    assert!(summary.manifest_name.is_some());
    assert_eq!(manifest_files(dest.path()).len(), 1);
}

/// **VALUE**: Under the default policy the first out-of-prefix entry ends
/// extraction and the caller is told, with what was already written.
///
/// **BUG THIS CATCHES**: An archive of the wrong shape reporting success
/// after importing nothing.
#[test]
fn given_prefix_violation_when_stop_policy_then_error_and_later_entries_not_written() {
    let archive = build_archive(&[
        Entry::File("content/ok.bin", b"ok"),
        Entry::File("other/bad.bin", b"bad"),
        Entry::File("content/later.bin", b"later"),
    ]);
    let dest = TempDir::new().expect("temp dir");

    let err = importer(PrefixViolationPolicy::Stop)
        .import(Cursor::new(archive), dest.path())
        .expect_err("import should stop");

    let (entry, summary) = match err {
        ImportError::PrefixViolation { entry, summary, .. } => (entry, summary),
        other => panic!("expected PrefixViolation, got {other}"),
    };
    assert_eq!(entry, "other/bad.bin");
    assert_eq!(summary.files_written, 1);
    assert!(dest.path().join("content/ok.bin").exists());
    assert!(!dest.path().join("other/bad.bin").exists());
    assert!(!dest.path().join("content/later.bin").exists());
}

#[test]
fn given_prefix_violation_in_job_when_run_then_error_state() {
    let archive = build_archive(&[Entry::File("other/x", b"x")]);
    let dest = TempDir::new().expect("temp dir");
    let mut job = ImportJob::new(Cursor::new(archive), dest.path());

    job.run(&importer(PrefixViolationPolicy::Stop))
        .expect_err("should fail");

    assert_eq!(job.state(), ImportState::Error);
    assert!(job.error_detail().is_some_and(|d| d.contains("other/x")));
}

#[test]
fn given_prefix_violation_when_skip_policy_then_later_entries_written() {
    let archive = build_archive(&[
        Entry::File("content/ok.bin", b"ok"),
        Entry::File("other/bad.bin", b"bad"),
        Entry::File("content/later.bin", b"later"),
    ]);
    let dest = TempDir::new().expect("temp dir");

    let summary = importer(PrefixViolationPolicy::Skip)
        .import(Cursor::new(archive), dest.path())
        .expect("import");

    assert!(dest.path().join("content/ok.bin").exists());
    assert!(!dest.path().join("other/bad.bin").exists());
    assert_eq!(
        std::fs::read(dest.path().join("content/later.bin")).expect("read later"),
        b"later"
    );
    assert_eq!(summary.skipped, vec!["other/bad.bin".to_string()]);
}

/// **VALUE**: A directory that cannot be created is logged and skipped.
///
/// **BUG THIS CATCHES**: One bad directory entry aborting an otherwise
/// usable content import.
#[test]
fn given_directory_creation_fails_when_imported_then_later_files_still_written() {
    // GIVEN: A regular file squatting on a directory entry's path
    let dest = TempDir::new().expect("temp dir");
    std::fs::create_dir_all(dest.path().join("content")).expect("content dir");
    std::fs::write(dest.path().join("content/blocked"), b"file").expect("blocker");

    let archive = build_archive(&[
        Entry::Dir("content/blocked/"),
        Entry::File("content/after.bin", b"after"),
    ]);

    // WHEN
    let mut job = ImportJob::new(Cursor::new(archive), dest.path());
    let summary = job
        .run(&importer(PrefixViolationPolicy::Stop))
        .expect("import");

    // THEN
    assert_eq!(job.state(), ImportState::Success);
    assert_eq!(summary.directory_failures, vec!["content/blocked/".to_string()]);
    assert!(dest.path().join("content/after.bin").exists());
}

#[test]
fn given_file_write_fails_when_imported_then_import_aborts() {
    // GIVEN: A file entry whose parent path is occupied by a regular file
    let dest = TempDir::new().expect("temp dir");
    std::fs::create_dir_all(dest.path().join("content")).expect("content dir");
    std::fs::write(dest.path().join("content/blocked"), b"file").expect("blocker");

    let archive = build_archive(&[
        Entry::File("content/blocked/inner.bin", b"inner"),
        Entry::File("content/after.bin", b"after"),
    ]);

    let err = importer(PrefixViolationPolicy::Stop)
        .import(Cursor::new(archive), dest.path())
        .expect_err("import should fail");

    assert!(matches!(err, ImportError::Write { .. }), "got {err}");
    assert!(!dest.path().join("content/after.bin").exists());
}

#[test]
fn given_entry_escaping_destination_when_imported_then_unsafe_path() {
    let archive = build_archive(&[Entry::File("content/../../evil.bin", b"evil")]);
    let root = TempDir::new().expect("temp dir");
    let dest = root.path().join("home");

    let err = importer(PrefixViolationPolicy::Stop)
        .import(Cursor::new(archive), &dest)
        .expect_err("import should fail");

    assert!(matches!(err, ImportError::UnsafePath { .. }), "got {err}");
    assert!(!root.path().join("evil.bin").exists());
}

#[test]
fn given_garbage_input_when_imported_then_archive_error() {
    let dest = TempDir::new().expect("temp dir");

    let err = importer(PrefixViolationPolicy::Stop)
        .import(Cursor::new(b"definitely not a zip file".to_vec()), dest.path())
        .expect_err("import should fail");

    assert!(matches!(err, ImportError::Archive { .. }));
}

/// **VALUE**: A job reports its outcome and refuses to run twice.
#[test]
fn given_finished_job_when_run_again_then_already_run() {
    let archive = build_archive(&[Entry::File("content/a.bin", b"a")]);
    let dest = TempDir::new().expect("temp dir");
    let importer = importer(PrefixViolationPolicy::Stop);

    let mut job = ImportJob::new(Cursor::new(archive), dest.path());
    assert_eq!(job.state(), ImportState::Idle);

    job.run(&importer).expect("first run");
    assert_eq!(job.state(), ImportState::Success);

    let err = job.run(&importer).expect_err("second run");
    assert!(matches!(err, ImportError::AlreadyRun { .. }));
    assert_eq!(job.state(), ImportState::Success);
}

#[test]
fn given_failing_job_when_run_then_error_state_with_detail() {
    let dest = TempDir::new().expect("temp dir");
    let mut job = ImportJob::new(Cursor::new(b"garbage".to_vec()), dest.path());

    job.run(&ContentImporter::default()).expect_err("should fail");

    assert_eq!(job.state(), ImportState::Error);
    assert!(job.error_detail().is_some_and(|d| d.contains("Archive Error")));
}

#[test]
fn given_missing_archive_when_job_created_then_archive_error() {
    let dest = TempDir::new().expect("temp dir");

    let result = ImportJob::from_path(&dest.path().join("missing.zip"), dest.path());

    assert!(matches!(result, Err(ImportError::Archive { .. })));
}
