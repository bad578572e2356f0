//! One-time, cross-process initialization of the Kolibri home directory.
//!
//! Two layers:
//!
//! - An exclusive advisory lock on a sentinel file beside the home directory.
//!   This is the only mechanism that serializes setup across processes. The OS
//!   drops the lock when the holder dies, so a crash mid-setup needs no recovery.
//! - A process-local [`SetupState`] flag that lets repeat calls in the same
//!   process skip the lock entirely once setup has succeeded.

use crate::config::paths::setup_lock_path;
use crate::error::setup::SetupError;
use crate::runtime::HomeInitializer;

use common::ErrorLocation;

use std::fs::{File, OpenOptions, create_dir_all};
use std::panic::Location;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use log::{debug, info, warn};

/// Process-local setup bookkeeping.
///
/// Owned by the composition root and handed to [`SetupGuard`]. The flag is an
/// optimization; correctness across processes rests on the lock file.
#[derive(Debug)]
pub struct SetupState {
    initialized: AtomicBool,
    lock_path: PathBuf,
}

impl SetupState {
    pub fn new(lock_path: impl Into<PathBuf>) -> Self {
        Self {
            initialized: AtomicBool::new(false),
            lock_path: lock_path.into(),
        }
    }

    /// State whose lock file sits beside `home`.
    pub fn for_home(home: &Path) -> Self {
        Self::new(setup_lock_path(home))
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    pub fn lock_path(&self) -> &Path {
        &self.lock_path
    }

    fn mark_initialized(&self) {
        self.initialized.store(true, Ordering::Release);
    }
}

/// Runs [`HomeInitializer::setup`] at most once per process and never
/// concurrently with another process doing the same.
pub struct SetupGuard {
    state: SetupState,
    initializer: Arc<dyn HomeInitializer>,
}

impl SetupGuard {
    pub fn new(state: SetupState, initializer: Arc<dyn HomeInitializer>) -> Self {
        Self { state, initializer }
    }

    pub fn state(&self) -> &SetupState {
        &self.state
    }

    /// Ensure the home directory has been initialized.
    ///
    /// Blocks until the setup lock is acquired and initialization finishes.
    /// Call from a blocking context (e.g. `spawn_blocking`) in async code.
    ///
    /// # Errors
    ///
    /// - [`SetupError::Lock`] - lock file could not be created or locked
    /// - [`SetupError::Initialization`] - the initializer failed
    pub fn ensure_setup(&self, home: &Path) -> Result<(), SetupError> {
        if self.state.is_initialized() {
            debug!("Skipping setup of {}: already initialized", home.display());
            return Ok(());
        }

        let _lock = SetupLock::acquire(self.state.lock_path())?;

        // A sibling thread may have finished while we waited on the lock.
        if self.state.is_initialized() {
            debug!("Setup of {} completed while waiting for lock", home.display());
            return Ok(());
        }

        info!("Running setup in {}", home.display());

        self.initializer
            .setup(home)
            .map_err(|e| SetupError::Initialization {
                message: format!("Setup of {} failed", home.display()),
                location: ErrorLocation::from(Location::caller()),
                source: e,
            })?;

        self.state.mark_initialized();
        info!("Setup of {} complete", home.display());

        Ok(())
    }
}

/// Held exclusive lock on the sentinel file. Released on drop.
struct SetupLock {
    file: File,
    path: PathBuf,
}

impl SetupLock {
    #[track_caller]
    fn acquire(path: &Path) -> Result<Self, SetupError> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            create_dir_all(parent).map_err(|e| SetupError::Lock {
                message: "Failed to create lock directory".to_string(),
                path: parent.to_path_buf(),
                location: ErrorLocation::from(Location::caller()),
                source: e,
            })?;
        }

        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(path)
            .map_err(|e| SetupError::Lock {
                message: "Failed to open lock file".to_string(),
                path: path.to_path_buf(),
                location: ErrorLocation::from(Location::caller()),
                source: e,
            })?;

        debug!("Waiting for setup lock {}", path.display());

        file.lock().map_err(|e| SetupError::Lock {
            message: "Failed to acquire exclusive lock".to_string(),
            path: path.to_path_buf(),
            location: ErrorLocation::from(Location::caller()),
            source: e,
        })?;

        debug!("Acquired setup lock {}", path.display());

        Ok(Self {
            file,
            path: path.to_path_buf(),
        })
    }
}

impl Drop for SetupLock {
    fn drop(&mut self) {
        match self.file.unlock() {
            Ok(()) => debug!("Released setup lock {}", self.path.display()),
            // Closing the descriptor still drops the lock.
            Err(e) => warn!("Failed to unlock {}: {e}", self.path.display()),
        }
    }
}
