//! # hostrpc-server
//!
//! Axum HTTP + `WebSocket` server in front of one RPC session.
//!
//! - `WebSocket` gateway on every path, optionally behind the digest-auth
//!   close-and-reconnect handshake
//! - Socket tasks only enqueue; one session task owns the registry and
//!   writes replies, notifications and broadcasts
//! - Heartbeat Pings, bounded per-connection outbound queues
//! - `/health` and Prometheus `/metrics`
//! - Graceful shutdown via `CancellationToken`

#![deny(unsafe_code)]

pub mod config;
pub mod health;
pub mod metrics;
pub mod server;
pub mod session;
pub mod shutdown;
pub mod websocket;

pub use config::ServerConfig;
pub use server::{AppState, HostRpcServer};
pub use session::{SessionActor, SessionEvent, SessionInbox, SessionQueue, SessionStats};
pub use shutdown::ShutdownCoordinator;
