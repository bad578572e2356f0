pub mod paths;

pub use paths::{HostPaths, PathSource, resolve_host_paths};

use crate::error::config::ConfigError;
use crate::import::PrefixViolationPolicy;

use common::ErrorLocation;

use std::panic::Location;
use std::path::Path;
use std::time::Duration;

use log::{info, warn};
use serde::{Deserialize, Serialize};

const CONFIG_FILE_NAME: &str = "config.json";
const CONFIG_VERSION: u32 = 1;

// ============================================
// CONFIG STRUCTS
// ============================================

/// How to launch the embedded Kolibri server.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerConfig {
    #[serde(default = "default_server_program")]
    pub program: String,
    #[serde(default = "default_server_args")]
    pub args: Vec<String>,
    #[serde(default = "default_health_path")]
    pub health_path: String,
    #[serde(default = "default_startup_timeout_secs")]
    pub startup_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            program: default_server_program(),
            args: default_server_args(),
            health_path: default_health_path(),
            startup_timeout_secs: default_startup_timeout_secs(),
        }
    }
}

impl ServerConfig {
    pub fn startup_timeout(&self) -> Duration {
        Duration::from_secs(self.startup_timeout_secs)
    }
}

/// How to launch the background worker.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkerConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_server_program")]
    pub program: String,
    #[serde(default = "default_worker_args")]
    pub args: Vec<String>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            program: default_server_program(),
            args: default_worker_args(),
        }
    }
}

/// One-time home initialization.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SetupConfig {
    /// Optional command run once under the setup lock (e.g. migrations).
    pub program: Option<String>,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default = "default_run_mode")]
    pub run_mode: String,
    /// Exported to the runtime when the file exists.
    pub provision_file: Option<String>,
}

impl Default for SetupConfig {
    fn default() -> Self {
        Self {
            program: None,
            args: Vec::new(),
            run_mode: default_run_mode(),
            provision_file: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct IpcSettings {
    /// 0 binds an ephemeral port.
    #[serde(default)]
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ImportConfig {
    #[serde(default)]
    pub on_prefix_violation: PrefixViolationPolicy,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HostConfig {
    #[serde(default = "default_version")]
    pub version: u32,

    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub worker: WorkerConfig,

    #[serde(default)]
    pub setup: SetupConfig,

    #[serde(default)]
    pub ipc: IpcSettings,

    #[serde(default = "default_readiness_timeout_ms")]
    pub readiness_timeout_ms: u64,

    #[serde(default)]
    pub import: ImportConfig,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION,
            server: ServerConfig::default(),
            worker: WorkerConfig::default(),
            setup: SetupConfig::default(),
            ipc: IpcSettings::default(),
            readiness_timeout_ms: default_readiness_timeout_ms(),
            import: ImportConfig::default(),
        }
    }
}

// ============================================
// DEFAULT FUNCTIONS
// ============================================

fn default_version() -> u32 {
    CONFIG_VERSION
}
fn default_true() -> bool {
    true
}
fn default_server_program() -> String {
    "kolibri".to_string()
}
fn default_server_args() -> Vec<String> {
    vec!["start".to_string(), "--foreground".to_string()]
}
fn default_worker_args() -> Vec<String> {
    vec!["services".to_string(), "--foreground".to_string()]
}
fn default_health_path() -> String {
    "/api/public/info/".to_string()
}
fn default_startup_timeout_secs() -> u64 {
    20
}
fn default_run_mode() -> String {
    "device".to_string()
}
fn default_readiness_timeout_ms() -> u64 {
    5_000
}

// ============================================
// IMPLEMENTATION
// ============================================

impl HostConfig {
    pub fn readiness_timeout(&self) -> Duration {
        Duration::from_millis(self.readiness_timeout_ms)
    }

    /// Load `{config_dir}/config.json`, falling back to defaults if absent.
    ///
    /// # Errors
    ///
    /// Fails if the file exists but cannot be read, parsed or validated.
    pub fn load(config_dir: &Path) -> Result<Self, ConfigError> {
        let config_path = config_dir.join(CONFIG_FILE_NAME);

        if !config_path.exists() {
            info!(
                "No config at {}, using defaults",
                config_path.display()
            );
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(&config_path).map_err(|e| ConfigError::Read {
            path: config_path.clone(),
            location: ErrorLocation::from(Location::caller()),
            source: e,
        })?;

        let config: HostConfig = serde_json::from_str(&contents).map_err(|e| {
            warn!("{} is not valid config JSON: {e}", config_path.display());
            ConfigError::Parse {
                path: config_path.clone(),
                reason: e.to_string(),
                location: ErrorLocation::from(Location::caller()),
            }
        })?;

        config.validate()?;

        info!("Config loaded from {}", config_path.display());
        Ok(config)
    }

    /// Save to `{config_dir}/config.json` via temp file + rename.
    pub fn save(&self, config_dir: &Path) -> Result<(), ConfigError> {
        self.validate()?;

        let write_error = |path: &Path, source: std::io::Error| ConfigError::Write {
            path: path.to_path_buf(),
            location: ErrorLocation::from(Location::caller()),
            source,
        };

        std::fs::create_dir_all(config_dir).map_err(|e| write_error(config_dir, e))?;

        let config_path = config_dir.join(CONFIG_FILE_NAME);
        let temp_path = config_dir.join(format!("{CONFIG_FILE_NAME}.tmp"));

        let json = serde_json::to_string_pretty(self).map_err(|e| ConfigError::Serialize {
            reason: e.to_string(),
            location: ErrorLocation::from(Location::caller()),
        })?;

        std::fs::write(&temp_path, json).map_err(|e| write_error(&temp_path, e))?;
        std::fs::rename(&temp_path, &config_path).map_err(|e| write_error(&config_path, e))?;

        info!("Config saved to {}", config_path.display());
        Ok(())
    }

    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.version == 0 || self.version > CONFIG_VERSION {
            return Err(invalid(
                "version",
                format!("{} is outside 1-{CONFIG_VERSION}", self.version),
            ));
        }

        if self.server.program.trim().is_empty() {
            return Err(invalid("server.program", "cannot be empty"));
        }

        if !self.server.health_path.starts_with('/') {
            return Err(invalid(
                "server.health_path",
                format!("must start with '/': {}", self.server.health_path),
            ));
        }

        if self.server.startup_timeout_secs == 0 {
            return Err(invalid("server.startup_timeout_secs", "must be greater than 0"));
        }

        if self.worker.enabled && self.worker.program.trim().is_empty() {
            return Err(invalid(
                "worker.program",
                "cannot be empty while the worker is enabled",
            ));
        }

        if let Some(ref program) = self.setup.program
            && program.trim().is_empty()
        {
            return Err(invalid("setup.program", "omit it instead of leaving it blank"));
        }

        if self.readiness_timeout_ms == 0 {
            return Err(invalid("readiness_timeout_ms", "must be greater than 0"));
        }

        Ok(())
    }
}

#[track_caller]
fn invalid(field: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        field,
        reason: reason.into(),
        location: ErrorLocation::from(Location::caller()),
    }
}
