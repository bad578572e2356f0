//! Test doubles for the runtime collaborators.

use crate::error::runtime::RuntimeError;
use crate::runtime::{HomeInitializer, ServerBus, ServerFactory, WorkerBus, WorkerFactory};
use crate::setup::{SetupGuard, SetupState};

use common::ErrorLocation;

use std::panic::Location;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;

pub const MOCK_URL: &str = "http://127.0.0.1:8765/";

pub fn runtime_failure(message: &str) -> RuntimeError {
    RuntimeError::Command {
        message: message.to_string(),
        location: ErrorLocation::from(Location::caller()),
    }
}

/// Counts setup calls; optionally fails.
#[derive(Default)]
pub struct CountingInitializer {
    pub calls: AtomicUsize,
    pub fail: AtomicBool,
}

impl HomeInitializer for CountingInitializer {
    fn setup(&self, _home: &Path) -> Result<(), RuntimeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(runtime_failure("initializer failed"));
        }
        Ok(())
    }
}

pub fn guard_for(home: &Path, initializer: Arc<CountingInitializer>) -> Arc<SetupGuard> {
    Arc::new(SetupGuard::new(SetupState::for_home(home), initializer))
}

/// Shared counters observed across every bus a factory creates.
#[derive(Default)]
pub struct BusCounters {
    pub created: AtomicUsize,
    pub starts: AtomicUsize,
    pub stops: AtomicUsize,
}

#[derive(Default, Clone, Copy)]
pub struct BusBehaviour {
    pub fail_start: bool,
    pub fail_stop: bool,
    pub fail_url: bool,
    pub start_delay: Option<Duration>,
}

pub struct MockFactory {
    pub counters: Arc<BusCounters>,
    pub behaviour: BusBehaviour,
}

impl MockFactory {
    pub fn new(behaviour: BusBehaviour) -> Arc<Self> {
        Arc::new(Self {
            counters: Arc::new(BusCounters::default()),
            behaviour,
        })
    }

    fn bus(&self) -> MockBus {
        self.counters.created.fetch_add(1, Ordering::SeqCst);
        MockBus {
            counters: Arc::clone(&self.counters),
            behaviour: self.behaviour,
            running: false,
        }
    }
}

impl ServerFactory for MockFactory {
    fn create_server(&self, _home: &Path) -> Box<dyn ServerBus> {
        Box::new(self.bus())
    }
}

impl WorkerFactory for MockFactory {
    fn create_worker(&self, _home: &Path) -> Box<dyn WorkerBus> {
        Box::new(self.bus())
    }
}

pub struct MockBus {
    counters: Arc<BusCounters>,
    behaviour: BusBehaviour,
    running: bool,
}

impl MockBus {
    async fn do_start(&mut self) -> Result<(), RuntimeError> {
        if let Some(delay) = self.behaviour.start_delay {
            tokio::time::sleep(delay).await;
        }
        self.counters.starts.fetch_add(1, Ordering::SeqCst);
        if self.behaviour.fail_start {
            return Err(runtime_failure("start failed"));
        }
        self.running = true;
        Ok(())
    }

    async fn do_stop(&mut self) -> Result<(), RuntimeError> {
        self.counters.stops.fetch_add(1, Ordering::SeqCst);
        self.running = false;
        if self.behaviour.fail_stop {
            return Err(runtime_failure("stop failed"));
        }
        Ok(())
    }
}

#[async_trait]
impl ServerBus for MockBus {
    async fn start(&mut self) -> Result<(), RuntimeError> {
        self.do_start().await
    }

    async fn stop(&mut self) -> Result<(), RuntimeError> {
        self.do_stop().await
    }

    async fn get_url(&self) -> Result<String, RuntimeError> {
        if self.behaviour.fail_url || !self.running {
            return Err(RuntimeError::NotRunning {
                message: "no url".to_string(),
                location: ErrorLocation::from(Location::caller()),
            });
        }
        Ok(MOCK_URL.to_string())
    }
}

#[async_trait]
impl WorkerBus for MockBus {
    async fn start(&mut self) -> Result<(), RuntimeError> {
        self.do_start().await
    }

    async fn stop(&mut self) -> Result<(), RuntimeError> {
        self.do_stop().await
    }
}
