//! In-memory stand-ins for the Kolibri executables.

use endless_key::commands::serve::HostRuntime;

use host_core::config::{HostPaths, PathSource};
use host_core::error::runtime::RuntimeError;
use host_core::runtime::{HomeInitializer, ServerBus, ServerFactory, WorkerBus, WorkerFactory};

use common::ErrorLocation;

use std::panic::Location;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use tempfile::TempDir;

pub const FAKE_SERVER_URL: &str = "http://127.0.0.1:8080/";

#[derive(Default)]
pub struct Counters {
    pub setups: AtomicUsize,
    pub server_starts: AtomicUsize,
    pub server_stops: AtomicUsize,
    pub worker_starts: AtomicUsize,
    pub worker_stops: AtomicUsize,
}

impl Counters {
    pub fn get(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }
}

pub struct FakeRuntime {
    counters: Arc<Counters>,
    fail_server: bool,
}

impl FakeRuntime {
    pub fn new(fail_server: bool) -> (Arc<Self>, Arc<Counters>) {
        let counters = Arc::new(Counters::default());
        let runtime = Arc::new(Self {
            counters: Arc::clone(&counters),
            fail_server,
        });
        (runtime, counters)
    }

    pub fn host_runtime(self: &Arc<Self>) -> HostRuntime {
        HostRuntime {
            initializer: self.clone(),
            server_factory: self.clone(),
            worker_factory: self.clone(),
        }
    }
}

impl HomeInitializer for FakeRuntime {
    fn setup(&self, home: &Path) -> Result<(), RuntimeError> {
        self.counters.setups.fetch_add(1, Ordering::SeqCst);
        std::fs::create_dir_all(home.join("content")).map_err(|e| RuntimeError::Io {
            message: "create content dir".to_string(),
            location: ErrorLocation::from(Location::caller()),
            source: e,
        })
    }
}

struct FakeServer {
    counters: Arc<Counters>,
    fail: bool,
}

#[async_trait]
impl ServerBus for FakeServer {
    async fn start(&mut self) -> Result<(), RuntimeError> {
        self.counters.server_starts.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(RuntimeError::Command {
                message: "kolibri exited during startup".to_string(),
                location: ErrorLocation::from(Location::caller()),
            });
        }
        Ok(())
    }

    async fn stop(&mut self) -> Result<(), RuntimeError> {
        self.counters.server_stops.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn get_url(&self) -> Result<String, RuntimeError> {
        Ok(FAKE_SERVER_URL.to_string())
    }
}

struct FakeWorker {
    counters: Arc<Counters>,
}

#[async_trait]
impl WorkerBus for FakeWorker {
    async fn start(&mut self) -> Result<(), RuntimeError> {
        self.counters.worker_starts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn stop(&mut self) -> Result<(), RuntimeError> {
        self.counters.worker_stops.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

impl ServerFactory for FakeRuntime {
    fn create_server(&self, _home: &Path) -> Box<dyn ServerBus> {
        Box::new(FakeServer {
            counters: Arc::clone(&self.counters),
            fail: self.fail_server,
        })
    }
}

impl WorkerFactory for FakeRuntime {
    fn create_worker(&self, _home: &Path) -> Box<dyn WorkerBus> {
        Box::new(FakeWorker {
            counters: Arc::clone(&self.counters),
        })
    }
}

/// Paths rooted in a temp dir. Keep the `TempDir` alive for the test.
pub fn temp_paths() -> (TempDir, HostPaths) {
    let dir = TempDir::new().expect("temp dir");
    let paths = HostPaths::for_home(dir.path().join("kolibri"), PathSource::EnvVar);
    (dir, paths)
}
