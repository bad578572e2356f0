//! IPC WebSocket server.
//!
//! Lets a UI process ask a running [`ServerSupervisor`] for its URL. The server:
//!
//! - Listens on localhost only
//! - Uses binary protobuf messages (see [`crate::proto`])
//! - Requires an authentication handshake as the first message
//!
//! A `GetServerUrl` request is answered immediately with whatever the
//! supervisor has cached. It is never parked until the server is ready.

use crate::LOCAL_HOSTNAME;
use crate::error::ipc::IpcError;
use crate::ipc::connection_state::ConnectionState;
use crate::ipc::handle::IpcServerHandle;
use crate::proto::IpcErrorCode::InvalidMessage;
use crate::proto::{
    AUTH_REQUEST_ID, IpcAuthHandshakeResponse, IpcClientMessage, IpcErrorCode, IpcErrorResponse,
    IpcGetServerUrlRequest, IpcServerMessage, IpcServerUrlReply, ipc_client_message,
    ipc_server_message,
};
use crate::supervisor::ServerSupervisor;

use common::{ErrorLocation, RedactedToken};

use std::net::SocketAddr;
use std::panic::Location;

use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use log::{debug, error, info, warn};
use prost::Message as ProstMessage;
use tokio::net::{TcpListener, TcpStream};
use tokio::spawn as TokioSpawn;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message;

type WsWriter = SplitSink<WebSocketStream<TcpStream>, Message>;

/// Start the IPC server on `127.0.0.1:<ipc_port>`. Port 0 picks a free port.
///
/// # Errors
///
/// Returns [`IpcError::Io`] if the port cannot be bound.
pub async fn start_ipc_server(
    ipc_port: u16,
    auth_token: RedactedToken,
    supervisor: ServerSupervisor,
) -> Result<IpcServerHandle, IpcError> {
    let listener = TcpListener::bind((LOCAL_HOSTNAME, ipc_port)).await?;
    let local_addr = listener.local_addr()?;

    info!("IPC server listening on {local_addr}");

    let task = TokioSpawn(async move {
        while let Ok((stream, addr)) = listener.accept().await {
            debug!("Client connecting from {addr}");
            let token = auth_token.clone();
            let supervisor = supervisor.clone();
            TokioSpawn(async move {
                if let Err(e) = handle_connection(stream, addr, token, supervisor).await {
                    error!("IPC connection {addr} failed: {e}");
                }
            });
        }
    });

    Ok(IpcServerHandle::new(local_addr, task))
}

/// Serve one client: loopback check, auth handshake, then requests until disconnect.
async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    auth_token: RedactedToken,
    supervisor: ServerSupervisor,
) -> Result<(), IpcError> {
    if !addr.ip().is_loopback() {
        warn!("Rejected non-loopback connection from {addr}");
        return Ok(());
    }

    let ws_stream = accept_async(stream).await.map_err(|e| IpcError::Handshake {
        message: format!("WebSocket handshake failed: {e}"),
        location: ErrorLocation::from(Location::caller()),
    })?;

    let (mut write, mut read) = ws_stream.split();
    let mut state = ConnectionState::new(auth_token);

    // First message must be the auth handshake.
    match read.next().await {
        Some(Ok(Message::Binary(data))) => {
            let client_msg = IpcClientMessage::decode(&data[..])?;

            match client_msg.payload {
                Some(ipc_client_message::Payload::AuthHandshake(auth)) => {
                    if state.validate_token(&auth.token) {
                        info!("Client {addr} authenticated");
                        send_auth_response(&mut write, true, None).await?;
                    } else {
                        warn!("Client {addr} auth failed: invalid token");
                        send_auth_response(
                            &mut write,
                            false,
                            Some("Invalid authentication token"),
                        )
                        .await?;
                        return Ok(());
                    }
                }
                _ => {
                    warn!("Client {addr} auth failed: first message was not auth handshake");
                    return Ok(());
                }
            }
        }
        Some(Ok(_)) => {
            warn!("Client {addr} sent non-binary first message");
            return Ok(());
        }
        Some(Err(e)) => {
            return Err(IpcError::Read {
                message: format!("Error reading first message: {e}"),
                location: ErrorLocation::from(Location::caller()),
            });
        }
        None => {
            debug!("Client {addr} disconnected before sending auth");
            return Ok(());
        }
    }

    while let Some(msg) = read.next().await {
        match msg {
            Ok(Message::Binary(data)) => {
                let client_msg = match IpcClientMessage::decode(&data[..]) {
                    Ok(msg) => msg,
                    Err(e) => {
                        warn!("Failed to decode protobuf from {addr}: {e}");
                        send_error_response(
                            &mut write,
                            0,
                            InvalidMessage,
                            "Invalid protobuf message",
                        )
                        .await?;
                        continue;
                    }
                };

                let request_id = client_msg.request_id;
                match client_msg.payload {
                    Some(ipc_client_message::Payload::GetServerUrl(request)) => {
                        handle_get_server_url(&mut write, request_id, request, &supervisor).await?;
                    }
                    Some(ipc_client_message::Payload::AuthHandshake(_)) => {
                        send_error_response(
                            &mut write,
                            request_id,
                            InvalidMessage,
                            "Already authenticated",
                        )
                        .await?;
                    }
                    None => {
                        warn!("Client {addr} sent message with no payload");
                        send_error_response(
                            &mut write,
                            request_id,
                            InvalidMessage,
                            "No payload in message",
                        )
                        .await?;
                    }
                }
            }
            Ok(Message::Close(_)) => break,
            Ok(_) => debug!("Ignoring non-binary message from {addr}"),
            Err(e) => {
                return Err(IpcError::Read {
                    message: format!("Error reading message: {e}"),
                    location: ErrorLocation::from(Location::caller()),
                });
            }
        }
    }

    debug!("Client {addr} disconnected");
    Ok(())
}

async fn handle_get_server_url(
    write: &mut WsWriter,
    request_id: u64,
    request: IpcGetServerUrlRequest,
    supervisor: &ServerSupervisor,
) -> Result<(), IpcError> {
    let server_url = supervisor.get_url().await;

    if server_url.is_none() {
        debug!("GetServerUrl #{request_id}: server not ready");
    }

    let response = IpcServerMessage {
        request_id,
        payload: Some(ipc_server_message::Payload::ServerUrl(IpcServerUrlReply {
            reply_kind: request.reply_kind,
            server_url,
        })),
    };

    send_message(write, &response).await
}

async fn send_message(write: &mut WsWriter, message: &IpcServerMessage) -> Result<(), IpcError> {
    let mut buf = Vec::with_capacity(message.encoded_len());
    message.encode(&mut buf)?;

    write
        .send(Message::Binary(buf.into()))
        .await
        .map_err(|e| IpcError::Send {
            message: format!("Failed to send response: {e}"),
            location: ErrorLocation::from(Location::caller()),
        })
}

async fn send_auth_response(
    write: &mut WsWriter,
    success: bool,
    error: Option<&str>,
) -> Result<(), IpcError> {
    let response = IpcServerMessage {
        request_id: AUTH_REQUEST_ID,
        payload: Some(ipc_server_message::Payload::AuthHandshakeResponse(
            IpcAuthHandshakeResponse {
                success,
                error: error.map(|s| s.to_string()),
            },
        )),
    };

    send_message(write, &response).await
}

async fn send_error_response(
    write: &mut WsWriter,
    request_id: u64,
    error_code: IpcErrorCode,
    error_message: &str,
) -> Result<(), IpcError> {
    let response = IpcServerMessage {
        request_id,
        payload: Some(ipc_server_message::Payload::Error(IpcErrorResponse {
            code: error_code as i32,
            message: error_message.to_string(),
        })),
    };

    send_message(write, &response).await
}
