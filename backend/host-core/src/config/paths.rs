//! Platform-aware resolution of the host's private storage.
//!
//! Lookup order:
//! 1. `ENDLESS_KEY_HOME` environment variable (explicit home override)
//! 2. Platform local data directory via `dirs` crate
//!
//! Returns Result, never silently falls back to a wrong path.

use crate::error::config::ConfigError;

use common::ErrorLocation;

use std::env;
use std::panic::Location;
use std::path::{Path, PathBuf};

use log::{debug, info};

pub const HOME_ENV_VAR: &str = "ENDLESS_KEY_HOME";

const APP_DIR_NAME: &str = "endless-key";
const HOME_DIR_NAME: &str = "kolibri";
const LOCK_FILE_SUFFIX: &str = ".setup.lock";
const ENDPOINT_FILE_NAME: &str = "ipc.json";

/// Where everything the host owns lives on disk.
#[derive(Debug, Clone)]
pub struct HostPaths {
    /// Kolibri home directory (the shared data root).
    pub home: PathBuf,
    /// Directory holding `config.json` and `ipc.json`.
    pub config_dir: PathBuf,
    /// How the paths were determined.
    pub source: PathSource,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathSource {
    EnvVar,
    PlatformDefault,
}

impl std::fmt::Display for PathSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PathSource::EnvVar => write!(f, "{HOME_ENV_VAR}"),
            PathSource::PlatformDefault => write!(f, "platform default"),
        }
    }
}

impl HostPaths {
    /// Build paths around an explicit home directory.
    pub fn for_home(home: impl Into<PathBuf>, source: PathSource) -> Self {
        let home = home.into();
        let config_dir = home
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| home.clone());

        Self {
            home,
            config_dir,
            source,
        }
    }

    /// Sentinel file used only for the setup lock.
    pub fn lock_file(&self) -> PathBuf {
        setup_lock_path(&self.home)
    }

    /// File advertising the running IPC endpoint to UI clients.
    pub fn endpoint_file(&self) -> PathBuf {
        self.config_dir.join(ENDPOINT_FILE_NAME)
    }
}

/// The setup lock lives beside the home directory, never inside it, so it
/// can be created before the home exists.
pub fn setup_lock_path(home: &Path) -> PathBuf {
    let mut name = home
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| HOME_DIR_NAME.into());
    name.push(LOCK_FILE_SUFFIX);

    match home.parent() {
        Some(parent) => parent.join(name),
        None => PathBuf::from(name),
    }
}

/// Resolve host paths.
///
/// # Errors
///
/// Returns [`ConfigError::HomeUnresolved`] if neither the override nor a
/// platform data directory is available.
#[track_caller]
pub fn resolve_host_paths() -> Result<HostPaths, ConfigError> {
    if let Ok(custom_home) = env::var(HOME_ENV_VAR)
        && !custom_home.trim().is_empty()
    {
        info!("Using {HOME_ENV_VAR} override: {custom_home}");
        return Ok(HostPaths::for_home(custom_home, PathSource::EnvVar));
    }

    if let Some(data_dir) = dirs::data_local_dir() {
        let home = data_dir.join(APP_DIR_NAME).join(HOME_DIR_NAME);
        debug!("Platform home dir: {}", home.display());
        return Ok(HostPaths::for_home(home, PathSource::PlatformDefault));
    }

    Err(ConfigError::HomeUnresolved {
        env_var: HOME_ENV_VAR,
        location: ErrorLocation::from(Location::caller()),
    })
}
