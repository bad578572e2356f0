//! IPC wire messages (protobuf, package `endless_key.ipc`).
//!
//! Every frame is one binary WebSocket message holding either an
//! [`IpcClientMessage`] or an [`IpcServerMessage`]. Replies echo the
//! `request_id` of the request they answer.
//!
//! ```text
//! message IpcClientMessage {
//!   uint64 request_id = 1;
//!   oneof payload {
//!     IpcAuthHandshake auth_handshake = 10;
//!     IpcGetServerUrlRequest get_server_url = 11;
//!   }
//! }
//!
//! message IpcServerMessage {
//!   uint64 request_id = 1;
//!   oneof payload {
//!     IpcAuthHandshakeResponse auth_handshake_response = 10;
//!     IpcServerUrlReply server_url = 11;
//!     IpcErrorResponse error = 99;
//!   }
//! }
//! ```

/// Request id the server uses for the handshake reply.
pub const AUTH_REQUEST_ID: u64 = 1;

/// Reply kind a client asks for when it does not care.
pub const DEFAULT_REPLY_KIND: i32 = 1;

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct IpcClientMessage {
    #[prost(uint64, tag = "1")]
    pub request_id: u64,
    #[prost(oneof = "ipc_client_message::Payload", tags = "10, 11")]
    pub payload: ::core::option::Option<ipc_client_message::Payload>,
}

pub mod ipc_client_message {
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Payload {
        #[prost(message, tag = "10")]
        AuthHandshake(super::IpcAuthHandshake),
        #[prost(message, tag = "11")]
        GetServerUrl(super::IpcGetServerUrlRequest),
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct IpcServerMessage {
    #[prost(uint64, tag = "1")]
    pub request_id: u64,
    #[prost(oneof = "ipc_server_message::Payload", tags = "10, 11, 99")]
    pub payload: ::core::option::Option<ipc_server_message::Payload>,
}

pub mod ipc_server_message {
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Payload {
        #[prost(message, tag = "10")]
        AuthHandshakeResponse(super::IpcAuthHandshakeResponse),
        #[prost(message, tag = "11")]
        ServerUrl(super::IpcServerUrlReply),
        #[prost(message, tag = "99")]
        Error(super::IpcErrorResponse),
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct IpcAuthHandshake {
    #[prost(string, tag = "1")]
    pub token: ::prost::alloc::string::String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct IpcAuthHandshakeResponse {
    #[prost(bool, tag = "1")]
    pub success: bool,
    #[prost(string, optional, tag = "2")]
    pub error: ::core::option::Option<::prost::alloc::string::String>,
}

/// Ask for the current server URL.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct IpcGetServerUrlRequest {
    /// Echoed back in [`IpcServerUrlReply::reply_kind`].
    #[prost(int32, tag = "1")]
    pub reply_kind: i32,
}

/// `server_url` is absent while the server is not running.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct IpcServerUrlReply {
    #[prost(int32, tag = "1")]
    pub reply_kind: i32,
    #[prost(string, optional, tag = "2")]
    pub server_url: ::core::option::Option<::prost::alloc::string::String>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct IpcErrorResponse {
    #[prost(enumeration = "IpcErrorCode", tag = "1")]
    pub code: i32,
    #[prost(string, tag = "2")]
    pub message: ::prost::alloc::string::String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum IpcErrorCode {
    Unspecified = 0,
    InvalidMessage = 1,
    AuthError = 2,
    InternalError = 3,
    NotImplemented = 4,
}
