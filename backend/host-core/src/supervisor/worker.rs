use crate::error::supervisor::{StartError, StopError};
use crate::runtime::{WorkerBus, WorkerFactory};
use crate::setup::SetupGuard;
use crate::supervisor::{COMMAND_CHANNEL_CAPACITY, LifecycleStatus, WorkerHandle, run_setup};

use common::ErrorLocation;

use std::panic::Location;
use std::path::PathBuf;
use std::sync::Arc;

use log::{debug, error, info, warn};
use tokio::sync::{Mutex, RwLock, mpsc, oneshot};

#[derive(Debug)]
enum WorkerCommand {
    Start(oneshot::Sender<Result<(), StartError>>),
    Stop(oneshot::Sender<Result<(), StopError>>),
}

struct WorkerContext {
    home: PathBuf,
    setup_guard: Arc<SetupGuard>,
    factory: Arc<dyn WorkerFactory>,
}

/// Owns the background worker's lifecycle.
///
/// Independent of [`ServerSupervisor`](crate::supervisor::ServerSupervisor):
/// the two only share the [`SetupGuard`].
#[derive(Clone)]
pub struct WorkerSupervisor {
    command_tx: Arc<Mutex<Option<mpsc::Sender<WorkerCommand>>>>,
    handle: Arc<RwLock<WorkerHandle>>,
    actor_init: Arc<Mutex<bool>>,
    context: Arc<WorkerContext>,
}

impl WorkerSupervisor {
    pub fn new(
        home: impl Into<PathBuf>,
        setup_guard: Arc<SetupGuard>,
        factory: Arc<dyn WorkerFactory>,
    ) -> Self {
        Self {
            command_tx: Arc::new(Mutex::new(None)),
            handle: Arc::new(RwLock::new(WorkerHandle::default())),
            actor_init: Arc::new(Mutex::new(false)),
            context: Arc::new(WorkerContext {
                home: home.into(),
                setup_guard,
                factory,
            }),
        }
    }

    pub async fn start(&self) -> Result<(), StartError> {
        let (tx, rx) = oneshot::channel();
        self.send(WorkerCommand::Start(tx))
            .await
            .map_err(|message| StartError::Unavailable {
                message,
                location: ErrorLocation::from(Location::caller()),
            })?;

        rx.await.map_err(|_| StartError::Unavailable {
            message: "Worker actor dropped the start request".to_string(),
            location: ErrorLocation::from(Location::caller()),
        })?
    }

    pub async fn stop(&self) -> Result<(), StopError> {
        let (tx, rx) = oneshot::channel();
        self.send(WorkerCommand::Stop(tx))
            .await
            .map_err(|message| StopError::Unavailable {
                message,
                location: ErrorLocation::from(Location::caller()),
            })?;

        rx.await.map_err(|_| StopError::Unavailable {
            message: "Worker actor dropped the stop request".to_string(),
            location: ErrorLocation::from(Location::caller()),
        })?
    }

    pub async fn status(&self) -> LifecycleStatus {
        self.handle.read().await.status
    }

    async fn send(&self, cmd: WorkerCommand) -> Result<(), String> {
        self.ensure_actor().await;

        let tx_guard = self.command_tx.lock().await;
        let tx = tx_guard
            .as_ref()
            .ok_or_else(|| "Worker actor not initialized".to_string())?;

        tx.send(cmd)
            .await
            .map_err(|e| format!("Worker actor died: {e}"))
    }

    async fn ensure_actor(&self) {
        let mut init_guard = self.actor_init.lock().await;
        if !*init_guard {
            let (tx, rx) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);

            let mut tx_guard = self.command_tx.lock().await;
            *tx_guard = Some(tx);
            drop(tx_guard);

            tokio::spawn(worker_actor(
                rx,
                Arc::clone(&self.context),
                Arc::clone(&self.handle),
            ));
            *init_guard = true;
            debug!("Worker supervisor actor spawned");
        }
    }
}

async fn set_status(handle: &RwLock<WorkerHandle>, status: LifecycleStatus) {
    let mut handle = handle.write().await;
    debug!("Worker {} -> {status}", handle.status);
    handle.status = status;
}

async fn worker_actor(
    mut command_rx: mpsc::Receiver<WorkerCommand>,
    context: Arc<WorkerContext>,
    handle: Arc<RwLock<WorkerHandle>>,
) {
    let mut bus: Option<Box<dyn WorkerBus>> = None;

    while let Some(cmd) = command_rx.recv().await {
        match cmd {
            WorkerCommand::Start(reply) => {
                let result = start_worker(&context, &handle, &mut bus).await;
                let _ = reply.send(result);
            }
            WorkerCommand::Stop(reply) => {
                let result = stop_worker(&handle, &mut bus).await;
                let _ = reply.send(result);
            }
        }
    }

    if let Err(e) = stop_worker(&handle, &mut bus).await {
        warn!("Failed to stop worker on shutdown: {e}");
    }
    debug!("Worker supervisor actor stopped");
}

async fn start_worker(
    context: &WorkerContext,
    handle: &RwLock<WorkerHandle>,
    bus: &mut Option<Box<dyn WorkerBus>>,
) -> Result<(), StartError> {
    let status = handle.read().await.status;
    if status != LifecycleStatus::Stopped {
        return Err(StartError::InvalidState {
            message: format!("Cannot start worker while {status}"),
            location: ErrorLocation::from(Location::caller()),
        });
    }

    set_status(handle, LifecycleStatus::Starting).await;

    if let Err(e) = run_setup(Arc::clone(&context.setup_guard), context.home.clone()).await {
        error!("Worker setup failed: {e}");
        set_status(handle, LifecycleStatus::Stopped).await;
        return Err(StartError::Setup {
            message: "Setup failed, worker not started".to_string(),
            location: ErrorLocation::from(Location::caller()),
            source: e,
        });
    }

    let mut worker = context.factory.create_worker(&context.home);

    if let Err(e) = worker.start().await {
        error!("Worker failed to start: {e}");
        set_status(handle, LifecycleStatus::Stopped).await;
        return Err(StartError::Runtime {
            message: "Worker failed to start".to_string(),
            location: ErrorLocation::from(Location::caller()),
            source: e,
        });
    }

    *bus = Some(worker);
    set_status(handle, LifecycleStatus::Running).await;
    info!("Worker running");

    Ok(())
}

async fn stop_worker(
    handle: &RwLock<WorkerHandle>,
    bus: &mut Option<Box<dyn WorkerBus>>,
) -> Result<(), StopError> {
    let Some(mut worker) = bus.take() else {
        debug!("Worker already stopped");
        return Ok(());
    };

    set_status(handle, LifecycleStatus::Stopping).await;
    let result = worker.stop().await;
    set_status(handle, LifecycleStatus::Stopped).await;

    result.map_err(|e| {
        error!("Worker stop reported an error: {e}");
        StopError::Runtime {
            message: "Worker stop failed".to_string(),
            location: ErrorLocation::from(Location::caller()),
            source: e,
        }
    })?;

    info!("Worker stopped");
    Ok(())
}
