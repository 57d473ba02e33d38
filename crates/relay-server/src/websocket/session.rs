//! WebSocket session lifecycle: one connected client from upgrade through
//! disconnect.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, Utf8Bytes, WebSocket};
use futures::{SinkExt, StreamExt};
use metrics::{counter, gauge, histogram};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::connection::{ClientConnection, ConnectionId};
use super::heartbeat::{HeartbeatVerdict, Liveness};
use crate::config::ServerConfig;
use crate::metrics::{
    WS_CONNECTION_DURATION_SECONDS, WS_CONNECTIONS_ACTIVE, WS_CONNECTIONS_TOTAL,
    WS_DISCONNECTIONS_TOTAL,
};
use crate::relay::RelayHandle;

/// How long a cancelled session waits for its writer to send the close frame.
const CLOSE_GRACE: Duration = Duration::from_secs(1);

/// Per-session queue and heartbeat settings.
#[derive(Clone, Copy, Debug)]
pub struct SessionLimits {
    /// Outbound frames buffered before broadcasts to this client are dropped.
    pub send_queue_capacity: usize,
    /// Interval between server pings.
    pub heartbeat_interval: Duration,
    /// Silence after which the client is disconnected.
    pub heartbeat_timeout: Duration,
}

impl From<&ServerConfig> for SessionLimits {
    fn from(config: &ServerConfig) -> Self {
        Self {
            send_queue_capacity: config.send_queue_capacity.max(1),
            heartbeat_interval: config.heartbeat_interval().max(Duration::from_millis(1)),
            heartbeat_timeout: config.heartbeat_timeout(),
        }
    }
}

/// Run a WebSocket session for a connected client.
///
/// 1. Registers the connection with the relay engine, which queues the
///    welcome frame
/// 2. Hands incoming text (and UTF-8 binary) frames to the engine
/// 3. Forwards queued broadcasts to the socket
/// 4. Sends periodic pings and disconnects unresponsive clients
/// 5. Reports the close to the engine exactly once
#[instrument(skip_all, fields(conn_id = %conn_id))]
pub async fn run_ws_session(
    ws: WebSocket,
    conn_id: ConnectionId,
    relay: RelayHandle,
    limits: SessionLimits,
    cancel: CancellationToken,
) {
    let (mut ws_tx, mut ws_rx) = ws.split();

    let (send_tx, mut send_rx) = mpsc::channel::<Utf8Bytes>(limits.send_queue_capacity);
    let connection = ClientConnection::new(conn_id.clone(), send_tx);
    let liveness = Arc::new(Liveness::new(limits.heartbeat_timeout));

    let connection_start = std::time::Instant::now();
    if relay.connect(connection).await.is_err() {
        warn!("relay engine unavailable, dropping connection");
        let _ = ws_tx.send(Message::Close(None)).await;
        return;
    }
    info!("client connected");
    counter!(WS_CONNECTIONS_TOTAL).increment(1);
    gauge!(WS_CONNECTIONS_ACTIVE).increment(1.0);

    // Outbound forwarder with periodic pings.
    let writer_live = Arc::clone(&liveness);
    let writer_cancel = cancel.clone();
    let mut outbound = tokio::spawn(async move {
        let mut ping_interval = tokio::time::interval(limits.heartbeat_interval);
        // Skip the immediate first tick
        let _ = ping_interval.tick().await;

        loop {
            tokio::select! {
                msg = send_rx.recv() => {
                    match msg {
                        Some(text) => {
                            if ws_tx.send(Message::Text(text)).await.is_err() {
                                break;
                            }
                        }
                        None => break,
                    }
                }
                _ = ping_interval.tick() => {
                    if writer_live.tick() == HeartbeatVerdict::TimedOut {
                        warn!(
                            silent_ms = u64::try_from(writer_live.last_pong_elapsed().as_millis()).unwrap_or(u64::MAX),
                            "client unresponsive, disconnecting"
                        );
                        let _ = ws_tx.send(Message::Close(None)).await;
                        break;
                    }
                    if ws_tx.send(Message::Ping(vec![].into())).await.is_err() {
                        break;
                    }
                }
                () = writer_cancel.cancelled() => {
                    let _ = ws_tx.send(Message::Close(None)).await;
                    break;
                }
            }
        }
    });

    loop {
        let msg = tokio::select! {
            msg = ws_rx.next() => msg,
            _ = &mut outbound => break,
            () = cancel.cancelled() => {
                // Let the writer flush its close frame.
                let _ = tokio::time::timeout(CLOSE_GRACE, &mut outbound).await;
                break;
            }
        };

        let text = match msg {
            Some(Ok(Message::Text(t))) => t.to_string(),
            Some(Ok(Message::Binary(data))) => match String::from_utf8(data.to_vec()) {
                Ok(s) => s,
                Err(_) => {
                    info!(len = data.len(), "received non-UTF8 binary frame, ignoring");
                    continue;
                }
            },
            Some(Ok(Message::Ping(_) | Message::Pong(_))) => {
                liveness.mark_alive();
                continue;
            }
            Some(Ok(Message::Close(_))) => {
                debug!("client sent close frame");
                break;
            }
            Some(Err(e)) => {
                let _ = relay.error(conn_id.clone(), e.to_string()).await;
                break;
            }
            None => break,
        };

        if relay.message(conn_id.clone(), text).await.is_err() {
            warn!("relay engine stopped, closing session");
            break;
        }
    }

    info!("client disconnected");
    counter!(WS_DISCONNECTIONS_TOTAL).increment(1);
    gauge!(WS_CONNECTIONS_ACTIVE).decrement(1.0);
    histogram!(WS_CONNECTION_DURATION_SECONDS).record(connection_start.elapsed().as_secs_f64());
    outbound.abort();
    let _ = relay.close(conn_id).await;
}
