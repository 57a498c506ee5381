//! Server wiring for the chatwire stream: environment configuration and
//! logging bootstrap shared by the `chatwire-server` binary.
//!
//! The protocol, gate and client live in the workspace crates:
//! `wire_protocol`, `chat_server`, `chat_client`, `session_store` and the
//! `agent_provider` pair.

pub mod config;
pub mod logging;

pub use config::{ConfigError, ServerConfig};
