use crate::LOCAL_HOSTNAME;
use crate::config::SetupConfig;
use crate::error::runtime::RuntimeError;
use crate::runtime::HomeInitializer;

use common::ErrorLocation;

use std::ffi::OsString;
use std::fs::create_dir_all;
use std::panic::Location;
use std::path::{Path, PathBuf};
use std::process::Command;

use log::{debug, info, warn};

pub const HOME_ENV: &str = "KOLIBRI_HOME";
pub const LISTEN_ADDRESS_ENV: &str = "KOLIBRI_DEPLOYMENT_LISTEN_ADDRESS";
pub const RUN_MODE_ENV: &str = "KOLIBRI_RUN_MODE";
pub const PROVISION_FILE_ENV: &str = "KOLIBRI_AUTOMATIC_PROVISION_FILE";

pub const LOGS_DIR: &str = "logs";
pub const CONTENT_DIR: &str = "content";

/// Environment handed to every runtime command.
pub fn runtime_env(home: &Path, setup: &SetupConfig) -> Vec<(&'static str, OsString)> {
    let mut env = vec![
        (HOME_ENV, home.as_os_str().to_os_string()),
        (LISTEN_ADDRESS_ENV, OsString::from(LOCAL_HOSTNAME)),
        (RUN_MODE_ENV, OsString::from(&setup.run_mode)),
    ];

    if let Some(ref provision_file) = setup.provision_file {
        let path = PathBuf::from(provision_file);
        if path.is_file() {
            env.push((PROVISION_FILE_ENV, path.into_os_string()));
        } else {
            debug!("Provision file {provision_file} not found, not exporting it");
        }
    }

    env
}

/// Lays out the home directory and optionally runs a setup command.
pub struct HomeLayoutInitializer {
    setup: SetupConfig,
}

impl HomeLayoutInitializer {
    pub fn new(setup: SetupConfig) -> Self {
        Self { setup }
    }

    fn create_layout(&self, home: &Path) -> Result<(), RuntimeError> {
        for dir in [home.to_path_buf(), home.join(LOGS_DIR), home.join(CONTENT_DIR)] {
            create_dir_all(&dir).map_err(|e| RuntimeError::Io {
                message: format!("Failed to create {}", dir.display()),
                location: ErrorLocation::from(Location::caller()),
                source: e,
            })?;
        }
        Ok(())
    }

    fn run_setup_command(&self, program: &str, home: &Path) -> Result<(), RuntimeError> {
        info!("Running setup command: {program} {}", self.setup.args.join(" "));

        let status = Command::new(program)
            .args(&self.setup.args)
            .envs(runtime_env(home, &self.setup))
            .current_dir(home)
            .status()
            .map_err(|e| RuntimeError::Spawn {
                message: format!("Failed to run setup command {program}: {e}"),
                location: ErrorLocation::from(Location::caller()),
                source: Box::new(e),
            })?;

        if !status.success() {
            warn!("Setup command {program} exited with {status}");
            return Err(RuntimeError::Command {
                message: format!("Setup command {program} exited with {status}"),
                location: ErrorLocation::from(Location::caller()),
            });
        }

        Ok(())
    }
}

impl HomeInitializer for HomeLayoutInitializer {
    fn setup(&self, home: &Path) -> Result<(), RuntimeError> {
        self.create_layout(home)?;

        match self.setup.program {
            Some(ref program) => self.run_setup_command(program, home),
            None => {
                debug!("No setup command configured");
                Ok(())
            }
        }
    }
}
