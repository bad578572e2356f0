//! Logging for the device host.
//!
//! Colored stdout plus a plain `<home>/logs/endless-key.log`. The file rolls
//! over to `endless-key.log.1` .. `.5` once it passes 5 MiB, so the device
//! never holds more than about 30 MiB of logs. The level comes from
//! `ENDLESS_KEY_LOG` when set, otherwise Debug for debug builds and Info for
//! release.

use crate::error::AppError;

use common::ErrorLocation;

use std::fmt::{Arguments, Display};
use std::io::{Write, stdout};
use std::path::Path;
use std::sync::Once;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::SystemTime;

use fern::colors::Color::{Blue, Green, Magenta, Red, Yellow};
use fern::colors::ColoredLevelConfig;
use fern::{Dispatch, FormatCallback};
use file_rotate::compression::Compression;
use file_rotate::suffix::AppendCount;
use file_rotate::{ContentLimit, FileRotate};
use humantime::format_rfc3339;
use log::{LevelFilter, Record, info, warn};

static INIT_LOGGER_ONCE: Once = Once::new();

static LOGGER_ALREADY_CALLED: AtomicBool = AtomicBool::new(false);

pub const LOG_FILE_NAME: &str = "endless-key.log";

pub const LOG_LEVEL_ENV: &str = "ENDLESS_KEY_LOG";

pub const LOG_FILE_MAX_BYTES: usize = 5 << 20;

/// Rolled files kept next to the live one.
pub const LOG_FILES_KEPT: usize = 5;

#[cfg(debug_assertions)]
const DEFAULT_LOG_LEVEL: LevelFilter = LevelFilter::Debug;

#[cfg(not(debug_assertions))]
const DEFAULT_LOG_LEVEL: LevelFilter = LevelFilter::Info;

/// Dependencies that are chatty below Warn.
const QUIET_TARGETS: [&str; 4] = ["tungstenite", "tokio_tungstenite", "reqwest", "hyper_util"];

/// Parse a level name such as `trace` or `WARN`, falling back to the build default.
pub fn level_from(value: Option<&str>) -> LevelFilter {
    match value.map(str::trim).filter(|v| !v.is_empty()) {
        Some(raw) => raw.parse().unwrap_or_else(|_| {
            eprintln!("Ignoring {LOG_LEVEL_ENV}={raw}: not a log level");
            DEFAULT_LOG_LEVEL
        }),
        None => DEFAULT_LOG_LEVEL,
    }
}

/// Initialize logging once. Later calls warn and return Ok.
///
/// # Errors
///
/// Fails if the log file cannot be opened or another global logger is
/// already installed.
pub fn initialize(log_dir: &Path) -> Result<(), AppError> {
    if LOGGER_ALREADY_CALLED.swap(true, Ordering::SeqCst) {
        warn!("Logger already initialized");
        return Ok(());
    }

    let level = level_from(std::env::var(LOG_LEVEL_ENV).ok().as_deref());
    let mut result = Ok(());

    INIT_LOGGER_ONCE.call_once(|| {
        result = install(log_dir, level);
        if result.is_ok() {
            info!("Logging at {level:?} to {}", log_dir.join(LOG_FILE_NAME).display());
        }
    });

    result
}

/// Appending log writer inside `log_dir` that rolls over once the live file
/// passes `max_bytes`, keeping at most `keep` rolled files.
#[track_caller]
pub fn open_log_writer(
    log_dir: &Path,
    max_bytes: usize,
    keep: usize,
) -> Result<FileRotate<AppendCount>, AppError> {
    let log_file_path = log_dir.join(LOG_FILE_NAME);

    // FileRotate swallows open failures, so check the path is writable first.
    fern::log_file(&log_file_path).map_err(|e| AppError::App {
        message: format!(
            "Failed to create log file {}: {e}",
            log_file_path.display()
        ),
        location: ErrorLocation::here(),
    })?;

    Ok(FileRotate::new(
        &log_file_path,
        AppendCount::new(keep),
        ContentLimit::BytesSurpassed(max_bytes),
        Compression::None,
        #[cfg(unix)]
        None,
    ))
}

fn write_line(
    out: FormatCallback<'_>,
    message: &Arguments<'_>,
    record: &Record<'_>,
    level: impl Display,
) {
    out.finish(format_args!(
        "[{date} - {level}] {message} [{target}]",
        date = format_rfc3339(SystemTime::now()),
        target = record.target(),
    ))
}

#[track_caller]
fn install(log_dir: &Path, level: LevelFilter) -> Result<(), AppError> {
    let colors = ColoredLevelConfig::new()
        .debug(Blue)
        .info(Green)
        .warn(Yellow)
        .error(Red)
        .trace(Magenta);

    let mut root = Dispatch::new().level(level);
    for target in QUIET_TARGETS {
        root = root.level_for(target, LevelFilter::Warn);
    }

    let console = Dispatch::new()
        .format(move |out, message, record| {
            write_line(out, message, record, colors.color(record.level()))
        })
        .chain(stdout());

    let writer: Box<dyn Write + Send> = Box::new(open_log_writer(
        log_dir,
        LOG_FILE_MAX_BYTES,
        LOG_FILES_KEPT,
    )?);
    let file = Dispatch::new()
        .format(|out, message, record| write_line(out, message, record, record.level()))
        .chain(writer);

    root.chain(console)
        .chain(file)
        .apply()
        .map_err(|e| AppError::App {
            message: format!("Failed to install logger: {e}"),
            location: ErrorLocation::here(),
        })
}
