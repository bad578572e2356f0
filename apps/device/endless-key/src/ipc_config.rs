//! The IPC endpoint file (`ipc.json`).
//!
//! Written by `serve` once the IPC server is listening, read by UI clients in
//! other processes to find the port and auth token.

use crate::error::AppError;

use common::{ErrorLocation, RedactedToken};

use std::path::Path;

use log::{debug, warn};
use serde::{Deserialize, Serialize};

#[derive(Clone)]
pub struct IpcConfig {
    port: u16,
    auth_token: RedactedToken,
}

/// On-disk shape. Only ever built transiently around a read or write.
#[derive(Serialize, Deserialize)]
struct EndpointFile {
    port: u16,
    auth_token: String,
}

impl IpcConfig {
    pub fn new(port: u16, auth_token: RedactedToken) -> Self {
        Self { port, auth_token }
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn auth_token(&self) -> &RedactedToken {
        &self.auth_token
    }

    /// Atomically write the endpoint file, readable by the owner only.
    #[track_caller]
    pub fn write(&self, path: &Path) -> Result<(), AppError> {
        let location = ErrorLocation::here();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| AppError::App {
                message: format!("Failed to create {}: {e}", parent.display()),
                location,
            })?;
        }

        let contents = serde_json::to_string_pretty(&EndpointFile {
            port: self.port,
            auth_token: self.auth_token.expose().to_string(),
        })
        .map_err(|e| AppError::App {
            message: format!("Failed to serialize IPC endpoint: {e}"),
            location,
        })?;

        let temp_path = path.with_extension("json.tmp");
        std::fs::write(&temp_path, contents).map_err(|e| AppError::App {
            message: format!("Failed to write {}: {e}", temp_path.display()),
            location,
        })?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&temp_path, std::fs::Permissions::from_mode(0o600)).map_err(
                |e| AppError::App {
                    message: format!("Failed to restrict {}: {e}", temp_path.display()),
                    location,
                },
            )?;
        }

        std::fs::rename(&temp_path, path).map_err(|e| AppError::App {
            message: format!("Failed to move endpoint file into {}: {e}", path.display()),
            location,
        })?;

        debug!("IPC endpoint written to {}", path.display());
        Ok(())
    }

    #[track_caller]
    pub fn read(path: &Path) -> Result<Self, AppError> {
        let location = ErrorLocation::here();

        let contents = std::fs::read_to_string(path).map_err(|e| AppError::App {
            message: format!(
                "Failed to read {} (is `endless-key serve` running?): {e}",
                path.display()
            ),
            location,
        })?;

        let file: EndpointFile = serde_json::from_str(&contents).map_err(|e| AppError::App {
            message: format!("Malformed endpoint file {}: {e}", path.display()),
            location,
        })?;

        Ok(Self::new(file.port, RedactedToken::new(file.auth_token)))
    }

    /// Best effort: a stale file only costs clients a failed connect.
    pub fn remove(path: &Path) {
        if let Err(e) = std::fs::remove_file(path)
            && e.kind() != std::io::ErrorKind::NotFound
        {
            warn!("Failed to remove {}: {e}", path.display());
        }
    }
}
