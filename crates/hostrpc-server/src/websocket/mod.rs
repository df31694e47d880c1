//! WebSocket upgrade, per-connection state and socket I/O.

pub mod connection;
pub mod handler;
pub mod socket;
