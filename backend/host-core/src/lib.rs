pub mod config;
pub mod error;
pub mod import;
pub mod ipc;
pub mod proto;
pub mod readiness;
pub mod runtime;
pub mod setup;
pub mod supervisor;

#[cfg(test)]
mod tests;

pub const LOCAL_HOSTNAME: &str = "127.0.0.1";
pub const LOCAL_BASE_URL: &str = const_format::concatcp!("http://", LOCAL_HOSTNAME);
