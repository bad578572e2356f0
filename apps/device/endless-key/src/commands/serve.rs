use crate::error::AppError;
use crate::ipc_config::IpcConfig;

use host_core::config::{HostConfig, HostPaths};
use host_core::error::CoreError;
use host_core::error::supervisor::StartError;
use host_core::ipc::{IpcServerHandle, start_ipc_server};
use host_core::runtime::{
    HomeInitializer, HomeLayoutInitializer, ProcessRuntime, ServerFactory, WorkerFactory,
};
use host_core::setup::{SetupGuard, SetupState};
use host_core::supervisor::{ServerSupervisor, WorkerSupervisor};

use common::{ErrorLocation, RedactedToken};

use std::path::PathBuf;
use std::sync::Arc;

use log::{error, info, warn};
use tokio::task::JoinHandle;
use uuid::Uuid;

/// Collaborators the host drives. Production uses child processes.
#[derive(Clone)]
pub struct HostRuntime {
    pub initializer: Arc<dyn HomeInitializer>,
    pub server_factory: Arc<dyn ServerFactory>,
    pub worker_factory: Arc<dyn WorkerFactory>,
}

impl HostRuntime {
    pub fn from_config(config: &HostConfig) -> Self {
        let process = Arc::new(ProcessRuntime::new(config));
        Self {
            initializer: Arc::new(HomeLayoutInitializer::new(config.setup.clone())),
            server_factory: process.clone(),
            worker_factory: process,
        }
    }
}

/// A running host: server, optional worker and the IPC endpoint.
pub struct Host {
    server: ServerSupervisor,
    worker: Option<WorkerSupervisor>,
    worker_start: Option<JoinHandle<Result<(), StartError>>>,
    ipc: IpcServerHandle,
    endpoint_file: PathBuf,
    server_url: Option<String>,
}

impl Host {
    /// Bring everything up.
    ///
    /// Waits for the server at most `readiness_timeout`; past that the host
    /// keeps running without a URL and clients poll over IPC.
    pub async fn start(
        paths: &HostPaths,
        config: &HostConfig,
        runtime: HostRuntime,
    ) -> Result<Self, AppError> {
        let setup_guard = Arc::new(SetupGuard::new(
            SetupState::for_home(&paths.home),
            runtime.initializer,
        ));

        let server = ServerSupervisor::new(
            &paths.home,
            Arc::clone(&setup_guard),
            runtime.server_factory,
        );

        let token = RedactedToken::new(Uuid::new_v4().to_string());
        let ipc = start_ipc_server(config.ipc.port, token.clone(), server.clone())
            .await
            .map_err(CoreError::from)?;

        let endpoint_file = paths.endpoint_file();
        IpcConfig::new(ipc.port(), token).write(&endpoint_file)?;
        info!(
            "IPC endpoint on port {} advertised in {}",
            ipc.port(),
            endpoint_file.display()
        );

        let readiness = server.start_in_background();

        let (worker, worker_start) = if config.worker.enabled {
            let worker = WorkerSupervisor::new(&paths.home, setup_guard, runtime.worker_factory);
            let starter = worker.clone();
            let task = tokio::spawn(async move {
                let result = starter.start().await;
                if let Err(ref e) = result {
                    error!("Worker failed to start: {e}");
                }
                result
            });
            (Some(worker), Some(task))
        } else {
            info!("Worker disabled by configuration");
            (None, None)
        };

        let server_url = readiness
            .wait_or_continue(config.readiness_timeout())
            .await;

        match server_url {
            Some(ref url) => info!("Kolibri ready at {url}"),
            None => warn!("Continuing without a server URL; clients will poll over IPC"),
        }

        Ok(Self {
            server,
            worker,
            worker_start,
            ipc,
            endpoint_file,
            server_url,
        })
    }

    pub fn server(&self) -> &ServerSupervisor {
        &self.server
    }

    pub fn worker(&self) -> Option<&WorkerSupervisor> {
        self.worker.as_ref()
    }

    pub fn ipc_port(&self) -> u16 {
        self.ipc.port()
    }

    /// URL observed within the readiness window, if any.
    pub fn ready_url(&self) -> Option<&str> {
        self.server_url.as_deref()
    }

    /// Stop everything. Every component is stopped even if an earlier one fails.
    pub async fn shutdown(self) -> Result<(), AppError> {
        info!("Shutting down host");

        self.ipc.shutdown();
        IpcConfig::remove(&self.endpoint_file);

        // Let a pending start land before stopping so it cannot restart the worker.
        if let Some(task) = self.worker_start {
            let _ = task.await;
        }

        let worker_result = match &self.worker {
            Some(worker) => worker.stop().await,
            None => Ok(()),
        };
        let server_result = self.server.stop().await;

        server_result.map_err(CoreError::from)?;
        worker_result.map_err(CoreError::from)?;

        info!("Host stopped");
        Ok(())
    }
}

/// `endless-key serve`: run until Ctrl-C.
pub async fn run(paths: &HostPaths, config: &HostConfig) -> Result<(), AppError> {
    let host = Host::start(paths, config, HostRuntime::from_config(config)).await?;

    let signal = tokio::signal::ctrl_c().await.map_err(|e| AppError::App {
        message: format!("Failed to listen for shutdown signal: {e}"),
        location: ErrorLocation::here(),
    });

    if signal.is_ok() {
        info!("Shutdown requested");
    }

    host.shutdown().await?;
    signal
}
