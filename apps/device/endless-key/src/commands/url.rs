use crate::error::AppError;
use crate::ipc_config::IpcConfig;

use host_core::error::CoreError;
use host_core::ipc::IpcClient;

use std::path::Path;
use std::time::Duration;

use log::debug;

/// `endless-key url`: ask a running host for the server URL over IPC.
pub async fn run(endpoint_file: &Path, wait: Duration) -> Result<String, AppError> {
    let endpoint = IpcConfig::read(endpoint_file)?;
    debug!("Connecting to IPC endpoint on port {}", endpoint.port());

    let mut client = IpcClient::connect(endpoint.port(), endpoint.auth_token())
        .await
        .map_err(CoreError::from)?;

    let url = client
        .wait_for_server_url(wait)
        .await
        .map_err(CoreError::from)?;

    if let Err(e) = client.close().await {
        debug!("IPC close failed: {e}");
    }

    Ok(url)
}
