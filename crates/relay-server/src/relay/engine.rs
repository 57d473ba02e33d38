//! The relay engine: one task that owns the connection registry and the
//! debounce slot, and processes connection events strictly in arrival order.

use std::future;

use axum::extract::ws::Utf8Bytes;
use metrics::{counter, histogram};
use serde::Serialize;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{self, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::debounce::DebounceSlot;
use crate::config::{EchoPolicy, RelayConfig};
use crate::metrics::{
    RELAY_BROADCAST_RECIPIENTS, RELAY_BROADCASTS_TOTAL, RELAY_DEBOUNCE_SUPERSEDED_TOTAL,
    RELAY_MESSAGES_RECEIVED_TOTAL, RELAY_MESSAGES_REJECTED_TOTAL,
};
use crate::payload::{JointPayload, welcome_frame};
use crate::websocket::connection::{ClientConnection, ConnectionId};
use crate::websocket::registry::{BroadcastReport, ConnectionRegistry};

/// Events fed to the engine by session tasks.
#[derive(Debug)]
pub enum RelayEvent {
    /// A socket finished its upgrade.
    Connect(ClientConnection),
    /// Raw text received from a connection.
    Message {
        /// Sender.
        conn_id: ConnectionId,
        /// Frame text, not yet parsed.
        raw: String,
    },
    /// A connection closed.
    Close {
        /// Closed connection.
        conn_id: ConnectionId,
    },
    /// A connection reported a transport error.
    Error {
        /// Failing connection.
        conn_id: ConnectionId,
        /// Error description.
        error: String,
    },
    /// Snapshot request.
    Stats(oneshot::Sender<RelayStats>),
}

/// What happened to one inbound message.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MessageOutcome {
    /// Broadcast right away (immediate mode).
    Relayed(BroadcastReport),
    /// Stored in the debounce slot until `fire_at`.
    Scheduled {
        /// Deadline of the (re)started window.
        fire_at: Instant,
    },
    /// Not valid JSON; dropped.
    Rejected,
}

/// Point-in-time view of the engine.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct RelayStats {
    /// Registered connections.
    pub connections: usize,
    /// Whether a debounced payload is waiting.
    pub pending_broadcast: bool,
    /// Inbound messages seen.
    pub messages_received: u64,
    /// Inbound messages rejected as malformed.
    pub messages_rejected: u64,
    /// Broadcasts performed.
    pub broadcasts: u64,
    /// Debounced payloads replaced before firing.
    pub superseded: u64,
}

/// Relay state plus the operations that mutate it.
///
/// Every method is synchronous; [`RelayEngine::run`] drives them from a
/// single task.
#[derive(Debug)]
pub struct RelayEngine {
    config: RelayConfig,
    registry: ConnectionRegistry,
    debounce: Option<DebounceSlot>,
    messages_received: u64,
    messages_rejected: u64,
    broadcasts: u64,
}

impl RelayEngine {
    /// Create an engine with an empty registry.
    pub fn new(config: RelayConfig) -> Self {
        Self {
            config,
            registry: ConnectionRegistry::new(),
            debounce: config.mode.window().map(DebounceSlot::new),
            messages_received: 0,
            messages_rejected: 0,
            broadcasts: 0,
        }
    }

    /// Register `connection` and queue the welcome frame for it alone.
    pub fn on_connect(&mut self, connection: ClientConnection) {
        let conn = self.registry.add(connection);
        let conn_id = conn.id().clone();
        if !conn.send(welcome_frame().into()) {
            warn!(conn_id = %conn_id, "failed to queue welcome frame");
        }
        info!(conn_id = %conn_id, connections = self.registry.len(), "client registered");
    }

    /// Parse `raw` and relay or schedule it according to the mode.
    pub fn on_message(&mut self, conn_id: &ConnectionId, raw: &str, now: Instant) -> MessageOutcome {
        // A payload whose window already closed fires before anything replaces it.
        if let Some(report) = self.fire_pending(now) {
            debug!(delivered = report.delivered, "overdue debounced payload fired");
        }

        self.messages_received += 1;
        counter!(RELAY_MESSAGES_RECEIVED_TOTAL).increment(1);

        let payload = match JointPayload::parse(raw) {
            Ok(p) => p,
            Err(e) => {
                self.messages_rejected += 1;
                counter!(RELAY_MESSAGES_REJECTED_TOTAL).increment(1);
                warn!(conn_id = %conn_id, len = raw.len(), error = %e, "invalid JSON payload, dropping");
                return MessageOutcome::Rejected;
            }
        };
        debug!(conn_id = %conn_id, joints = ?payload.joint_count(), "payload received");

        match self.debounce.as_mut() {
            None => MessageOutcome::Relayed(self.broadcast(&payload, Some(conn_id))),
            Some(slot) => {
                let before = slot.superseded();
                let fire_at = slot.schedule(payload, conn_id.clone(), now);
                if slot.superseded() > before {
                    counter!(RELAY_DEBOUNCE_SUPERSEDED_TOTAL).increment(1);
                }
                MessageOutcome::Scheduled { fire_at }
            }
        }
    }

    /// Broadcast the debounced payload if its window has closed.
    pub fn fire_pending(&mut self, now: Instant) -> Option<BroadcastReport> {
        let pending = self.debounce.as_mut()?.take_due(now)?;
        Some(self.broadcast(&pending.payload, Some(&pending.origin)))
    }

    /// Serialize `payload` once and queue it on every open connection.
    ///
    /// `origin` is skipped only under [`EchoPolicy::ExcludeSender`].
    pub fn broadcast(&mut self, payload: &JointPayload, origin: Option<&ConnectionId>) -> BroadcastReport {
        let text = match payload.to_json() {
            Ok(t) => Utf8Bytes::from(t),
            Err(e) => {
                warn!(error = %e, "failed to serialize payload");
                return BroadcastReport::default();
            }
        };
        let exclude = match self.config.echo {
            EchoPolicy::IncludeSender => None,
            EchoPolicy::ExcludeSender => origin,
        };
        let report = self.registry.broadcast(&text, exclude);
        self.broadcasts += 1;
        counter!(RELAY_BROADCASTS_TOTAL).increment(1);
        #[allow(clippy::cast_precision_loss)]
        histogram!(RELAY_BROADCAST_RECIPIENTS).record(report.delivered as f64);
        report
    }

    /// Remove `conn_id` from the active set. The pending slot is untouched.
    ///
    /// Returns `false` if the connection was not registered.
    pub fn on_close(&mut self, conn_id: &ConnectionId) -> bool {
        match self.registry.remove(conn_id) {
            Some(conn) => {
                info!(
                    conn_id = %conn_id,
                    age_ms = u64::try_from(conn.age().as_millis()).unwrap_or(u64::MAX),
                    dropped = conn.drop_count(),
                    connections = self.registry.len(),
                    "client unregistered"
                );
                true
            }
            None => {
                debug!(conn_id = %conn_id, "close for unknown connection");
                false
            }
        }
    }

    /// Log a transport error. Removal is left to the close event.
    pub fn on_error(&self, conn_id: &ConnectionId, error: &str) {
        warn!(conn_id = %conn_id, error, "connection error");
    }

    /// Current counters.
    pub fn stats(&self) -> RelayStats {
        RelayStats {
            connections: self.registry.len(),
            pending_broadcast: self.debounce.as_ref().is_some_and(DebounceSlot::is_pending),
            messages_received: self.messages_received,
            messages_rejected: self.messages_rejected,
            broadcasts: self.broadcasts,
            superseded: self.debounce.as_ref().map_or(0, DebounceSlot::superseded),
        }
    }

    fn next_deadline(&self) -> Option<Instant> {
        self.debounce.as_ref().and_then(DebounceSlot::deadline)
    }

    fn dispatch(&mut self, event: RelayEvent) {
        match event {
            RelayEvent::Connect(connection) => self.on_connect(connection),
            RelayEvent::Message { conn_id, raw } => {
                let _ = self.on_message(&conn_id, &raw, Instant::now());
            }
            RelayEvent::Close { conn_id } => {
                let _ = self.on_close(&conn_id);
            }
            RelayEvent::Error { conn_id, error } => self.on_error(&conn_id, &error),
            RelayEvent::Stats(reply) => {
                let _ = reply.send(self.stats());
            }
        }
    }

    /// Process events until `cancel` fires or every sender is gone.
    ///
    /// A payload still waiting in the debounce slot at that point is dropped.
    pub async fn run(mut self, mut events: mpsc::Receiver<RelayEvent>, cancel: CancellationToken) {
        info!(mode = ?self.config.mode, echo = ?self.config.echo, "relay engine started");
        loop {
            let deadline = self.next_deadline();
            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                event = events.recv() => match event {
                    Some(event) => self.dispatch(event),
                    None => break,
                },
                () = sleep_until(deadline) => {
                    if let Some(report) = self.fire_pending(Instant::now()) {
                        debug!(delivered = report.delivered, "debounced payload fired");
                    }
                }
            }
        }
        if let Some(discarded) = self.debounce.as_mut().and_then(DebounceSlot::clear) {
            debug!(origin = %discarded.origin, "discarding pending broadcast");
        }
        info!(connections = self.registry.len(), "relay engine stopped");
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(at) => time::sleep_until(at).await,
        None => future::pending().await,
    }
}
