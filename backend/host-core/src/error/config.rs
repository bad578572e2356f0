use common::ErrorLocation;

use std::path::PathBuf;

use thiserror::Error;

/// Failures loading, saving or locating the host configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Config Read Error: {}: {source} {location}", path.display())]
    Read {
        path: PathBuf,
        location: ErrorLocation,
        #[source]
        source: std::io::Error,
    },

    #[error("Config Parse Error: {}: {reason} {location}", path.display())]
    Parse {
        path: PathBuf,
        reason: String,
        location: ErrorLocation,
    },

    #[error("Config Write Error: {}: {source} {location}", path.display())]
    Write {
        path: PathBuf,
        location: ErrorLocation,
        #[source]
        source: std::io::Error,
    },

    #[error("Config Serialize Error: {reason} {location}")]
    Serialize {
        reason: String,
        location: ErrorLocation,
    },

    /// No home override and no platform data directory.
    #[error("Home Unresolved Error: set {env_var} to choose a home directory {location}")]
    HomeUnresolved {
        env_var: &'static str,
        location: ErrorLocation,
    },

    #[error("Config Invalid Error: {field}: {reason} {location}")]
    Invalid {
        field: &'static str,
        reason: String,
        location: ErrorLocation,
    },
}
