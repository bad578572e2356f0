//! Shared fixtures for integration tests.
//!
//! - An in-memory server runtime so supervisors can start without Kolibri
//! - Raw WebSocket helpers for poking the IPC wire format directly

use host_core::error::runtime::RuntimeError;
use host_core::runtime::{HomeInitializer, ServerBus, ServerFactory};
use host_core::setup::{SetupGuard, SetupState};
use host_core::supervisor::ServerSupervisor;

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use prost::Message as ProstMessage;
use tempfile::TempDir;
use tokio::net::TcpStream;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async, tungstenite::Message};

pub const TEST_AUTH_TOKEN: &str = "test-token-12345";
pub const FAKE_SERVER_URL: &str = "http://127.0.0.1:8080/";

pub type TestSocket = WebSocketStream<MaybeTlsStream<TcpStream>>;

struct NoopInitializer;

impl HomeInitializer for NoopInitializer {
    fn setup(&self, _home: &Path) -> Result<(), RuntimeError> {
        Ok(())
    }
}

struct FakeServer;

#[async_trait]
impl ServerBus for FakeServer {
    async fn start(&mut self) -> Result<(), RuntimeError> {
        Ok(())
    }

    async fn stop(&mut self) -> Result<(), RuntimeError> {
        Ok(())
    }

    async fn get_url(&self) -> Result<String, RuntimeError> {
        Ok(FAKE_SERVER_URL.to_string())
    }
}

struct FakeServerFactory;

impl ServerFactory for FakeServerFactory {
    fn create_server(&self, _home: &Path) -> Box<dyn ServerBus> {
        Box::new(FakeServer)
    }
}

/// Supervisor over a temp home. Keep the `TempDir` alive for the test.
pub fn fake_supervisor() -> (TempDir, ServerSupervisor) {
    let dir = TempDir::new().expect("temp dir");
    let home = dir.path().join("kolibri");
    let guard = Arc::new(SetupGuard::new(
        SetupState::for_home(&home),
        Arc::new(NoopInitializer),
    ));
    let supervisor = ServerSupervisor::new(&home, guard, Arc::new(FakeServerFactory));
    (dir, supervisor)
}

pub async fn connect_raw(port: u16) -> TestSocket {
    let url = format!("ws://127.0.0.1:{port}");
    let (ws_stream, _) = connect_async(url.as_str())
        .await
        .expect("Failed to connect to WebSocket server");
    ws_stream
}

pub async fn send_protobuf<T: ProstMessage>(ws: &mut TestSocket, message: &T) {
    let mut buf = Vec::new();
    message.encode(&mut buf).expect("Failed to encode protobuf");
    ws.send(Message::Binary(buf.into()))
        .await
        .expect("Failed to send message");
}

pub async fn receive_protobuf<T: ProstMessage + Default>(ws: &mut TestSocket) -> T {
    let msg = ws
        .next()
        .await
        .expect("No message received")
        .expect("Error receiving message");

    let bytes = msg.into_data();
    T::decode(&bytes[..]).expect("Failed to decode protobuf")
}
