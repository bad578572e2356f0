use crate::error::supervisor::{StartError, StopError};
use crate::readiness::{ReadinessWait, readiness_channel};
use crate::runtime::{ServerBus, ServerFactory};
use crate::setup::SetupGuard;
use crate::supervisor::{COMMAND_CHANNEL_CAPACITY, LifecycleStatus, ServerHandle, run_setup};

use common::ErrorLocation;

use std::panic::Location;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::{debug, error, info, warn};
use tokio::sync::{Mutex, RwLock, mpsc, oneshot};

type StartReply = oneshot::Sender<Result<String, StartError>>;
type StopReply = oneshot::Sender<Result<(), StopError>>;

#[derive(Debug)]
enum ServerCommand {
    /// Start from `Stopped`; any other state is rejected.
    Start(StartReply),
    /// Return the running URL, starting first if needed.
    Bind(StartReply),
    Stop(StopReply),
}

struct ServerContext {
    home: PathBuf,
    setup_guard: Arc<SetupGuard>,
    factory: Arc<dyn ServerFactory>,
}

/// Owns the embedded server's lifecycle.
///
/// This type is `Clone`; all clones drive the same server and observe the
/// same cached URL. Construct one per process and hand out clones.
#[derive(Clone)]
pub struct ServerSupervisor {
    command_tx: Arc<Mutex<Option<mpsc::Sender<ServerCommand>>>>,
    handle: Arc<RwLock<ServerHandle>>,
    actor_init: Arc<Mutex<bool>>,
    context: Arc<ServerContext>,
}

impl ServerSupervisor {
    pub fn new(
        home: impl Into<PathBuf>,
        setup_guard: Arc<SetupGuard>,
        factory: Arc<dyn ServerFactory>,
    ) -> Self {
        Self {
            command_tx: Arc::new(Mutex::new(None)),
            handle: Arc::new(RwLock::new(ServerHandle::default())),
            actor_init: Arc::new(Mutex::new(false)),
            context: Arc::new(ServerContext {
                home: home.into(),
                setup_guard,
                factory,
            }),
        }
    }

    pub fn home(&self) -> &Path {
        &self.context.home
    }

    /// Run setup, start the server and cache its URL.
    ///
    /// # Errors
    ///
    /// - [`StartError::InvalidState`] - not currently `Stopped`
    /// - [`StartError::Setup`] - setup failed; the server was never created
    /// - [`StartError::Runtime`] - the server failed to start or report a URL
    pub async fn start(&self) -> Result<String, StartError> {
        let (tx, rx) = oneshot::channel();
        self.send(ServerCommand::Start(tx))
            .await
            .map_err(|message| StartError::Unavailable {
                message,
                location: ErrorLocation::from(Location::caller()),
            })?;

        rx.await.map_err(|_| StartError::Unavailable {
            message: "Server actor dropped the start request".to_string(),
            location: ErrorLocation::from(Location::caller()),
        })?
    }

    /// Attach to the server: the cached URL if running, otherwise start it.
    pub async fn bind(&self) -> Result<String, StartError> {
        if let Some(url) = self.get_url().await {
            return Ok(url);
        }

        let (tx, rx) = oneshot::channel();
        self.send(ServerCommand::Bind(tx))
            .await
            .map_err(|message| StartError::Unavailable {
                message,
                location: ErrorLocation::from(Location::caller()),
            })?;

        rx.await.map_err(|_| StartError::Unavailable {
            message: "Server actor dropped the bind request".to_string(),
            location: ErrorLocation::from(Location::caller()),
        })?
    }

    /// Stop the server. A no-op when already stopped.
    pub async fn stop(&self) -> Result<(), StopError> {
        let (tx, rx) = oneshot::channel();
        self.send(ServerCommand::Stop(tx))
            .await
            .map_err(|message| StopError::Unavailable {
                message,
                location: ErrorLocation::from(Location::caller()),
            })?;

        rx.await.map_err(|_| StopError::Unavailable {
            message: "Server actor dropped the stop request".to_string(),
            location: ErrorLocation::from(Location::caller()),
        })?
    }

    /// Cached URL while `Running`, `None` otherwise. Never waits.
    pub async fn get_url(&self) -> Option<String> {
        self.handle.read().await.url.clone()
    }

    pub async fn status(&self) -> LifecycleStatus {
        self.handle.read().await.status
    }

    pub async fn snapshot(&self) -> ServerHandle {
        self.handle.read().await.clone()
    }

    /// Start on a separate task and hand back a one-shot readiness wait.
    ///
    /// The wait resolves with the URL once start succeeds. A failed start
    /// drops the signal, so waiters see `Abandoned` without timing out.
    pub fn start_in_background(&self) -> ReadinessWait {
        let (signal, wait) = readiness_channel();
        let supervisor = self.clone();

        tokio::spawn(async move {
            match supervisor.start().await {
                Ok(url) => signal.signal(url),
                Err(e) => error!("Background server start failed: {e}"),
            }
        });

        wait
    }

    async fn send(&self, cmd: ServerCommand) -> Result<(), String> {
        self.ensure_actor().await;

        let tx_guard = self.command_tx.lock().await;
        let tx = tx_guard
            .as_ref()
            .ok_or_else(|| "Server actor not initialized".to_string())?;

        tx.send(cmd)
            .await
            .map_err(|e| format!("Server actor died: {e}"))
    }

    async fn ensure_actor(&self) {
        let mut init_guard = self.actor_init.lock().await;
        if !*init_guard {
            let (tx, rx) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);

            let mut tx_guard = self.command_tx.lock().await;
            *tx_guard = Some(tx);
            drop(tx_guard);

            let actor = ServerActor {
                context: Arc::clone(&self.context),
                handle: Arc::clone(&self.handle),
                bus: None,
            };
            tokio::spawn(actor.run(rx));
            *init_guard = true;
            debug!("Server supervisor actor spawned");
        }
    }
}

/// Owns the live [`ServerBus`]; the only writer of the shared handle.
struct ServerActor {
    context: Arc<ServerContext>,
    handle: Arc<RwLock<ServerHandle>>,
    bus: Option<Box<dyn ServerBus>>,
}

impl ServerActor {
    async fn run(mut self, mut command_rx: mpsc::Receiver<ServerCommand>) {
        while let Some(cmd) = command_rx.recv().await {
            match cmd {
                ServerCommand::Start(reply) => {
                    let result = self.start().await;
                    let _ = reply.send(result);
                }
                ServerCommand::Bind(reply) => {
                    let result = match self.running_url().await {
                        Some(url) => Ok(url),
                        None => self.start().await,
                    };
                    let _ = reply.send(result);
                }
                ServerCommand::Stop(reply) => {
                    let result = self.stop().await;
                    let _ = reply.send(result);
                }
            }
        }

        // Last supervisor handle dropped.
        if let Err(e) = self.stop().await {
            warn!("Failed to stop server on shutdown: {e}");
        }
        debug!("Server supervisor actor stopped");
    }

    async fn running_url(&self) -> Option<String> {
        let handle = self.handle.read().await;
        match handle.status {
            LifecycleStatus::Running => handle.url.clone(),
            _ => None,
        }
    }

    async fn set(&self, status: LifecycleStatus, url: Option<String>) {
        let mut handle = self.handle.write().await;
        debug!("Server {} -> {status}", handle.status);
        handle.status = status;
        handle.url = url;
    }

    async fn start(&mut self) -> Result<String, StartError> {
        let status = self.handle.read().await.status;
        if status != LifecycleStatus::Stopped {
            return Err(StartError::InvalidState {
                message: format!("Cannot start server while {status}"),
                location: ErrorLocation::from(Location::caller()),
            });
        }

        self.set(LifecycleStatus::Starting, None).await;

        let home = self.context.home.clone();
        if let Err(e) = run_setup(Arc::clone(&self.context.setup_guard), home.clone()).await {
            error!("Server setup failed: {e}");
            self.set(LifecycleStatus::Stopped, None).await;
            return Err(StartError::Setup {
                message: "Setup failed, server not started".to_string(),
                location: ErrorLocation::from(Location::caller()),
                source: e,
            });
        }

        let mut bus = self.context.factory.create_server(&home);

        if let Err(e) = bus.start().await {
            error!("Server failed to start: {e}");
            self.set(LifecycleStatus::Stopped, None).await;
            return Err(StartError::Runtime {
                message: "Server failed to start".to_string(),
                location: ErrorLocation::from(Location::caller()),
                source: e,
            });
        }

        match bus.get_url().await {
            Ok(url) => {
                info!("Server running at {url}");
                self.bus = Some(bus);
                self.set(LifecycleStatus::Running, Some(url.clone())).await;
                Ok(url)
            }
            Err(e) => {
                error!("Server started but reported no URL: {e}");
                if let Err(stop_err) = bus.stop().await {
                    warn!("Failed to stop server without URL: {stop_err}");
                }
                self.set(LifecycleStatus::Stopped, None).await;
                Err(StartError::Runtime {
                    message: "Server did not report a URL".to_string(),
                    location: ErrorLocation::from(Location::caller()),
                    source: e,
                })
            }
        }
    }

    async fn stop(&mut self) -> Result<(), StopError> {
        let Some(mut bus) = self.bus.take() else {
            debug!("Server already stopped");
            return Ok(());
        };

        self.set(LifecycleStatus::Stopping, None).await;
        let result = bus.stop().await;
        self.set(LifecycleStatus::Stopped, None).await;

        match result {
            Ok(()) => {
                info!("Server stopped");
                Ok(())
            }
            Err(e) => {
                error!("Server stop reported an error: {e}");
                Err(StopError::Runtime {
                    message: "Server stop failed".to_string(),
                    location: ErrorLocation::from(Location::caller()),
                    source: e,
                })
            }
        }
    }
}
