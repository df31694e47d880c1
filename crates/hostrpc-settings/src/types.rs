//! Settings type definitions.
//!
//! All types use `#[serde(rename_all = "camelCase", default)]`, so a partial
//! JSON file only needs the keys it changes.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Root settings type.
///
/// ```json
/// {
///   "server": { "port": 9000 },
///   "auth": { "enabled": true }
/// }
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HostRpcSettings {
    /// Network and connection settings.
    pub server: ServerSettings,
    /// Dispatch and event settings.
    pub rpc: RpcSettings,
    /// Digest authentication.
    pub auth: AuthSettings,
    /// Log output.
    pub logging: LoggingSettings,
    /// Sizes of the simulated host graph.
    pub host: HostSettings,
}

/// Network and connection settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    /// Bind address.
    pub host: String,
    /// WebSocket/HTTP port.
    pub port: u16,
    /// Largest accepted WebSocket message in bytes.
    pub max_message_size: usize,
    /// Per-connection outbound queue length.
    pub send_queue_size: usize,
    /// Ping interval in milliseconds.
    pub heartbeat_interval_ms: u64,
    /// Time without a pong before a connection is dropped, in milliseconds.
    pub heartbeat_timeout_ms: u64,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8887,
            max_message_size: 16 * 1024 * 1024,
            send_queue_size: 256,
            heartbeat_interval_ms: 30_000,
            heartbeat_timeout_ms: 60_000,
        }
    }
}

impl ServerSettings {
    /// Ping interval.
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    /// Pong timeout.
    pub fn heartbeat_timeout(&self) -> Duration {
        Duration::from_millis(self.heartbeat_timeout_ms)
    }
}

/// Dispatch and event settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RpcSettings {
    /// Wait before replaying an event's current value to a new subscriber.
    pub replay_delay_ms: u64,
    /// Longest accessor chain the registry builder walks.
    pub max_chain_depth: usize,
    /// Publish shortened node names (`trackBank.getItemAt.volume` becomes
    /// `trs.at.vol`).
    pub abbreviated_method_names: bool,
}

impl Default for RpcSettings {
    fn default() -> Self {
        Self {
            replay_delay_ms: 150,
            max_chain_depth: 5,
            abbreviated_method_names: false,
        }
    }
}

impl RpcSettings {
    /// Replay delay.
    pub fn replay_delay(&self) -> Duration {
        Duration::from_millis(self.replay_delay_ms)
    }
}

/// Digest authentication.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AuthSettings {
    /// Require the digest handshake.
    pub enabled: bool,
    /// Password file; `~/.hostrpc/auth.json` when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password_file: Option<PathBuf>,
    /// Accepted user name.
    pub username: String,
    /// Realm sent in challenges.
    pub realm: String,
    /// Challenge validity window in milliseconds.
    pub challenge_ttl_ms: u64,
    /// Challenge store capacity.
    pub max_challenges: usize,
}

impl Default for AuthSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            password_file: None,
            username: "bitwig".to_string(),
            realm: "biwig-websocket-rpc".to_string(),
            challenge_ttl_ms: 30_000,
            max_challenges: 200,
        }
    }
}

impl AuthSettings {
    /// Challenge validity window.
    pub fn challenge_ttl(&self) -> Duration {
        Duration::from_millis(self.challenge_ttl_ms)
    }

    /// Configured password file, or the default under [`data_dir`](crate::data_dir).
    pub fn password_path(&self) -> PathBuf {
        self.password_file
            .clone()
            .unwrap_or_else(|| crate::loader::data_dir().join("auth.json"))
    }
}

/// Log output.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Minimum level (`trace`..`error`), overridden by `RUST_LOG`.
    pub level: String,
    /// Emit JSON lines instead of human-readable output.
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

/// Sizes of the simulated host graph served by the binary.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HostSettings {
    /// Tracks in the main track bank.
    pub track_count: usize,
    /// Sends per track.
    pub send_count: usize,
    /// Scenes in the scene bank.
    pub scene_count: usize,
}

impl Default for HostSettings {
    fn default() -> Self {
        Self {
            track_count: 8,
            send_count: 2,
            scene_count: 8,
        }
    }
}
