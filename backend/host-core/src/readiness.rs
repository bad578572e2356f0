//! One-shot "server is up" signal between the supervisor and its waiters.
//!
//! The signal side is consumed on use so readiness fires at most once. If it
//! is dropped without firing (start failed), waiters see
//! [`ReadinessError::Abandoned`] immediately instead of running out the clock.

use crate::error::readiness::ReadinessError;

use common::ErrorLocation;

use std::panic::Location;
use std::time::Duration;

use log::{debug, warn};
use tokio::sync::oneshot;
use tokio::time::timeout as TokioTimeout;

pub const DEFAULT_READINESS_TIMEOUT: Duration = Duration::from_secs(5);

pub fn readiness_channel() -> (ReadinessSignal, ReadinessWait) {
    let (tx, rx) = oneshot::channel();
    (ReadinessSignal { tx }, ReadinessWait { rx })
}

#[derive(Debug)]
pub struct ReadinessSignal {
    tx: oneshot::Sender<String>,
}

impl ReadinessSignal {
    /// Announce the server URL. A waiter that already gave up is not an error.
    pub fn signal(self, url: impl Into<String>) {
        if self.tx.send(url.into()).is_err() {
            debug!("Readiness signalled with no waiter left");
        }
    }
}

#[derive(Debug)]
pub struct ReadinessWait {
    rx: oneshot::Receiver<String>,
}

impl ReadinessWait {
    /// Wait up to `timeout` for the server URL.
    ///
    /// # Errors
    ///
    /// - [`ReadinessError::Timeout`] - nothing arrived in time
    /// - [`ReadinessError::Abandoned`] - the signal was dropped without firing
    pub async fn wait(self, timeout: Duration) -> Result<String, ReadinessError> {
        let location = ErrorLocation::from(Location::caller());

        match TokioTimeout(timeout, self.rx).await {
            Ok(Ok(url)) => Ok(url),
            Ok(Err(_)) => Err(ReadinessError::Abandoned {
                message: "Server start ended without signalling readiness".to_string(),
                location,
            }),
            Err(_) => Err(ReadinessError::Timeout {
                message: format!("Server not ready after {timeout:?}"),
                location,
            }),
        }
    }

    /// Like [`wait`](Self::wait) but logs the failure and lets the caller carry on.
    pub async fn wait_or_continue(self, timeout: Duration) -> Option<String> {
        match self.wait(timeout).await {
            Ok(url) => Some(url),
            Err(e) => {
                warn!("Continuing without a ready server: {e}");
                None
            }
        }
    }
}
