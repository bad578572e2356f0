//! Shared building blocks for the Endless Key host.
//!
//! ## Architecture
//!
//! - **common** (this crate): error location capture and secret handling
//! - **host-core**: setup, supervision, IPC and content import
//! - **endless-key**: the device binary wiring everything together

pub mod error;
pub mod redacted_token;

pub use error::error_location::ErrorLocation;
pub use error::redact_error::RedactError;
pub use redacted_token::RedactedToken;
