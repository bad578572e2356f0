//! Cross-process request/reply channel between a UI client and the host.
//!
//! - WebSocket server bound to `127.0.0.1` only, non-loopback peers rejected
//! - Binary protobuf frames (see [`crate::proto`])
//! - Auth token required in the first message
//!
//! Every request carries a `request_id` that its reply echoes. A client that
//! asks before the server is running gets an empty URL back, not an error;
//! [`IpcClient::wait_for_server_url`] polls with backoff until one appears.

mod client;
mod connection_state;
mod handle;
mod server;

pub use client::IpcClient;
pub use handle::IpcServerHandle;
pub use server::start_ipc_server;
