//! # pagesync-server
//!
//! Axum WebSocket transport for the pagesync engine.
//!
//! - One WebSocket route per namespace; each connection gets a session id and
//!   a serialized dispatch task
//! - `[event, ...args]` JSON frames in both directions
//! - Heartbeat pings and dead-client cleanup
//! - `/health` and Prometheus `/metrics`
//! - Graceful shutdown that lets each connection drain its dispatch queue

pub mod client;
pub mod config;
pub mod connection;
pub mod health;
pub mod metrics;
pub mod server;
pub mod shutdown;

pub use client::ClientRegistry;
pub use config::{load_config, ConfigError, LogFormat, ServerConfig};
pub use server::{build_router, AppState, PageSyncServer, ServerHandle, StartError};
pub use shutdown::ShutdownCoordinator;
