//! `/health` endpoint.

use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::relay::RelayStats;

/// Health check response body.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Always `"ok"` when the server is running.
    pub status: String,
    /// RFC 3339 start timestamp.
    pub started_at: String,
    /// Seconds since the server started.
    pub uptime_secs: u64,
    /// Current WebSocket connection count.
    pub connections: usize,
    /// Whether a debounced broadcast is waiting to fire.
    pub pending_broadcast: bool,
    /// Broadcasts performed so far.
    pub broadcasts: u64,
}

/// Build a health response from live counters.
pub fn health_check(start_time: Instant, started_at: DateTime<Utc>, stats: &RelayStats) -> HealthResponse {
    HealthResponse {
        status: "ok".into(),
        started_at: started_at.to_rfc3339(),
        uptime_secs: start_time.elapsed().as_secs(),
        connections: stats.connections,
        pending_broadcast: stats.pending_broadcast,
        broadcasts: stats.broadcasts,
    }
}
