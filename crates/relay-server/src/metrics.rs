//! Prometheus metrics recorder and `/metrics` endpoint handler.

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tracing::info;

use crate::errors::RelayError;

/// Install the Prometheus metrics recorder (global).
///
/// Returns the `PrometheusHandle` used to render the `/metrics` endpoint.
/// Fails if a recorder is already installed in this process.
pub fn install_recorder() -> Result<PrometheusHandle, RelayError> {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| RelayError::Metrics(e.to_string()))?;
    info!("prometheus metrics recorder installed");
    Ok(handle)
}

/// Render Prometheus text format from the installed recorder.
pub fn render(handle: &PrometheusHandle) -> String {
    handle.render()
}

// Metric name constants to avoid typos across modules.

/// WebSocket connections opened total (counter).
pub const WS_CONNECTIONS_TOTAL: &str = "ws_connections_total";
/// WebSocket disconnections total (counter).
pub const WS_DISCONNECTIONS_TOTAL: &str = "ws_disconnections_total";
/// Active WebSocket connections (gauge).
pub const WS_CONNECTIONS_ACTIVE: &str = "ws_connections_active";
/// Upgrades refused at the connection limit (counter).
pub const WS_CONNECTIONS_REJECTED_TOTAL: &str = "ws_connections_rejected_total";
/// Connection lifetime seconds (histogram).
pub const WS_CONNECTION_DURATION_SECONDS: &str = "ws_connection_duration_seconds";
/// Inbound payload frames total (counter).
pub const RELAY_MESSAGES_RECEIVED_TOTAL: &str = "relay_messages_received_total";
/// Inbound frames dropped as malformed JSON (counter).
pub const RELAY_MESSAGES_REJECTED_TOTAL: &str = "relay_messages_rejected_total";
/// Broadcasts performed (counter).
pub const RELAY_BROADCASTS_TOTAL: &str = "relay_broadcasts_total";
/// Recipients per broadcast (histogram).
pub const RELAY_BROADCAST_RECIPIENTS: &str = "relay_broadcast_recipients";
/// Frames not queued because a client's queue was full or closed (counter).
pub const RELAY_BROADCAST_DROPS_TOTAL: &str = "relay_broadcast_drops_total";
/// Debounced payloads replaced by a newer one before firing (counter).
pub const RELAY_DEBOUNCE_SUPERSEDED_TOTAL: &str = "relay_debounce_superseded_total";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_from_local_recorder() {
        // Build a recorder + handle (no global install to avoid test conflicts).
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();

        metrics::with_local_recorder(&recorder, || {
            metrics::counter!(RELAY_BROADCASTS_TOTAL).increment(2);
        });

        let output = render(&handle);
        assert!(output.contains(RELAY_BROADCASTS_TOTAL));
    }

    #[test]
    fn metric_constants_are_snake_case() {
        let names = [
            WS_CONNECTIONS_TOTAL,
            WS_DISCONNECTIONS_TOTAL,
            WS_CONNECTIONS_ACTIVE,
            WS_CONNECTIONS_REJECTED_TOTAL,
            WS_CONNECTION_DURATION_SECONDS,
            RELAY_MESSAGES_RECEIVED_TOTAL,
            RELAY_MESSAGES_REJECTED_TOTAL,
            RELAY_BROADCASTS_TOTAL,
            RELAY_BROADCAST_RECIPIENTS,
            RELAY_BROADCAST_DROPS_TOTAL,
            RELAY_DEBOUNCE_SUPERSEDED_TOTAL,
        ];
        for name in names {
            assert!(
                name.chars().all(|c| c.is_ascii_lowercase() || c == '_'),
                "metric name '{name}' must be snake_case"
            );
        }
    }
}
