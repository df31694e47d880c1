//! Server configuration.

use std::time::Duration;

use hostrpc_settings::HostRpcSettings;

/// Runtime configuration of a [`HostRpcServer`](crate::server::HostRpcServer).
#[derive(Clone, Debug)]
pub struct ServerConfig {
    /// Host to bind.
    pub host: String,
    /// Port to bind (`0` for auto-assign).
    pub port: u16,
    /// Max WebSocket message size in bytes.
    pub max_message_size: usize,
    /// Bound of each connection's outbound queue.
    pub send_queue_size: usize,
    /// Interval between server Ping frames.
    pub heartbeat_interval: Duration,
    /// Disconnect a client silent for this long.
    pub heartbeat_timeout: Duration,
    /// Delay before a first subscriber's current-value replay.
    pub replay_delay: Duration,
}

impl ServerConfig {
    /// Derive the server configuration from loaded settings.
    pub fn from_settings(settings: &HostRpcSettings) -> Self {
        Self {
            host: settings.server.host.clone(),
            port: settings.server.port,
            max_message_size: settings.server.max_message_size,
            send_queue_size: settings.server.send_queue_size,
            heartbeat_interval: settings.server.heartbeat_interval(),
            heartbeat_timeout: settings.server.heartbeat_timeout(),
            replay_delay: settings.rpc.replay_delay(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 0,
            ..Self::from_settings(&HostRpcSettings::default())
        }
    }
}
