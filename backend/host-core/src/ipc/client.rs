//! Client side of the IPC protocol, used by UI processes and the `url` command.

use crate::LOCAL_HOSTNAME;
use crate::error::ipc::IpcError;
use crate::proto::{
    AUTH_REQUEST_ID, DEFAULT_REPLY_KIND, IpcAuthHandshake, IpcClientMessage,
    IpcGetServerUrlRequest, IpcServerMessage, ipc_client_message, ipc_server_message,
};

use common::{ErrorLocation, RedactedToken};

use std::panic::Location;
use std::time::Duration;

use backoff::{ExponentialBackoff, backoff::Backoff};
use futures_util::{SinkExt, StreamExt};
use log::{debug, info, trace};
use prost::Message as ProstMessage;
use tokio::net::TcpStream;
use tokio::time::sleep as TokioSleep;
use tokio::time::timeout as TokioTimeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

const REPLY_TIMEOUT: Duration = Duration::from_secs(5);

/// An authenticated connection to a host's IPC server.
pub struct IpcClient {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
    next_request_id: u64,
}

impl IpcClient {
    /// Connect to `127.0.0.1:<port>` and complete the auth handshake.
    ///
    /// # Errors
    ///
    /// - [`IpcError::Connect`] - nothing is listening or the upgrade failed
    /// - [`IpcError::Auth`] - the server rejected the token
    pub async fn connect(port: u16, token: &RedactedToken) -> Result<Self, IpcError> {
        let url = format!("ws://{LOCAL_HOSTNAME}:{port}");

        let (stream, _) = connect_async(url.as_str())
            .await
            .map_err(|e| IpcError::Connect {
                message: format!("Failed to connect to {url}: {e}"),
                location: ErrorLocation::from(Location::caller()),
            })?;

        let mut client = Self {
            stream,
            next_request_id: AUTH_REQUEST_ID + 1,
        };

        client
            .send(IpcClientMessage {
                request_id: AUTH_REQUEST_ID,
                payload: Some(ipc_client_message::Payload::AuthHandshake(
                    IpcAuthHandshake {
                        token: token.expose().to_string(),
                    },
                )),
            })
            .await?;

        match client.recv_reply(AUTH_REQUEST_ID).await? {
            ipc_server_message::Payload::AuthHandshakeResponse(resp) if resp.success => {
                info!("Authenticated with IPC server on port {port}");
                Ok(client)
            }
            ipc_server_message::Payload::AuthHandshakeResponse(resp) => Err(IpcError::Auth {
                message: resp
                    .error
                    .unwrap_or_else(|| "Authentication rejected".to_string()),
                location: ErrorLocation::from(Location::caller()),
            }),
            other => Err(IpcError::Handshake {
                message: format!("Unexpected handshake reply: {other:?}"),
                location: ErrorLocation::from(Location::caller()),
            }),
        }
    }

    /// Ask once for the server URL.
    ///
    /// `Ok(None)` means the host answered but its server is not running yet.
    pub async fn get_server_url(&mut self) -> Result<Option<String>, IpcError> {
        let request_id = self.next_request_id;
        self.next_request_id += 1;

        self.send(IpcClientMessage {
            request_id,
            payload: Some(ipc_client_message::Payload::GetServerUrl(
                IpcGetServerUrlRequest {
                    reply_kind: DEFAULT_REPLY_KIND,
                },
            )),
        })
        .await?;

        match self.recv_reply(request_id).await? {
            ipc_server_message::Payload::ServerUrl(reply) => Ok(reply.server_url),
            other => Err(IpcError::UnexpectedReply {
                message: format!("Expected ServerUrl, got {other:?}"),
                location: ErrorLocation::from(Location::caller()),
            }),
        }
    }

    /// Poll [`get_server_url`](Self::get_server_url) with exponential backoff
    /// until a URL is reported or `max_elapsed` runs out.
    pub async fn wait_for_server_url(&mut self, max_elapsed: Duration) -> Result<String, IpcError> {
        let mut backoff = ExponentialBackoff {
            max_elapsed_time: Some(max_elapsed),
            ..Default::default()
        };

        loop {
            if let Some(url) = self.get_server_url().await? {
                return Ok(url);
            }

            match backoff.next_backoff() {
                Some(duration) => {
                    trace!("Server not ready, asking again after {duration:?}");
                    TokioSleep(duration).await;
                }
                None => {
                    return Err(IpcError::Timeout {
                        message: format!("Server URL not available within {max_elapsed:?}"),
                        location: ErrorLocation::from(Location::caller()),
                    });
                }
            }
        }
    }

    pub async fn close(mut self) -> Result<(), IpcError> {
        self.stream.close(None).await.map_err(|e| IpcError::Send {
            message: format!("Failed to close connection: {e}"),
            location: ErrorLocation::from(Location::caller()),
        })
    }

    async fn send(&mut self, message: IpcClientMessage) -> Result<(), IpcError> {
        let mut buf = Vec::with_capacity(message.encoded_len());
        message.encode(&mut buf)?;

        self.stream
            .send(Message::Binary(buf.into()))
            .await
            .map_err(|e| IpcError::Send {
                message: format!("Failed to send request #{}: {e}", message.request_id),
                location: ErrorLocation::from(Location::caller()),
            })
    }

    /// Read until the reply for `request_id` arrives. Replies to other requests are dropped.
    async fn recv_reply(&mut self, request_id: u64) -> Result<ipc_server_message::Payload, IpcError> {
        loop {
            let frame = TokioTimeout(REPLY_TIMEOUT, self.stream.next())
                .await
                .map_err(|_| IpcError::Timeout {
                    message: format!("No reply to request #{request_id} within {REPLY_TIMEOUT:?}"),
                    location: ErrorLocation::from(Location::caller()),
                })?;

            let data = match frame {
                Some(Ok(Message::Binary(data))) => data,
                Some(Ok(Message::Close(_))) | None => {
                    return Err(IpcError::Read {
                        message: format!("Connection closed awaiting reply #{request_id}"),
                        location: ErrorLocation::from(Location::caller()),
                    });
                }
                Some(Ok(_)) => continue,
                Some(Err(e)) => {
                    return Err(IpcError::Read {
                        message: format!("Error reading reply: {e}"),
                        location: ErrorLocation::from(Location::caller()),
                    });
                }
            };

            let reply = IpcServerMessage::decode(&data[..])?;

            if reply.request_id != request_id {
                debug!(
                    "Dropping reply #{} while waiting for #{request_id}",
                    reply.request_id
                );
                continue;
            }

            return match reply.payload {
                Some(ipc_server_message::Payload::Error(err)) => Err(IpcError::Remote {
                    code: err.code(),
                    message: err.message,
                    location: ErrorLocation::from(Location::caller()),
                }),
                Some(payload) => Ok(payload),
                None => Err(IpcError::UnexpectedReply {
                    message: format!("Empty reply to request #{request_id}"),
                    location: ErrorLocation::from(Location::caller()),
                }),
            };
        }
    }
}
