use std::net::SocketAddr;

use log::info;
use tokio::task::JoinHandle;

/// Handle to a running IPC server.
///
/// Dropping the handle leaves the server running; call [`shutdown`](Self::shutdown)
/// to stop accepting connections.
pub struct IpcServerHandle {
    local_addr: SocketAddr,
    task: JoinHandle<()>,
}

impl IpcServerHandle {
    pub(crate) fn new(local_addr: SocketAddr, task: JoinHandle<()>) -> Self {
        Self { local_addr, task }
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn port(&self) -> u16 {
        self.local_addr.port()
    }

    /// Stop accepting connections. Open connections finish on their own.
    pub fn shutdown(self) {
        self.task.abort();
        info!("IPC server on {} shut down", self.local_addr);
    }
}
