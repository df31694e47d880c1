//! `/health` endpoint.

use serde::Serialize;
use std::time::Instant;

use crate::session::SessionStats;

/// Health check response body.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Always `"ok"` when the server is running.
    pub status: String,
    /// Seconds since the server started.
    pub uptime_secs: u64,
    /// Open WebSocket connections.
    pub connections: usize,
    /// Registered event nodes.
    pub events: usize,
    /// Dispatchable methods, built-ins included.
    pub methods: usize,
}

/// Build a health response from the session counters.
pub fn health_check(start_time: Instant, stats: &SessionStats) -> HealthResponse {
    HealthResponse {
        status: "ok".into(),
        uptime_secs: start_time.elapsed().as_secs(),
        connections: stats.connections(),
        events: stats.events(),
        methods: stats.methods(),
    }
}
