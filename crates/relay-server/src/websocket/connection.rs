//! WebSocket client connection state.

use std::fmt;
use std::time::Duration;

use axum::extract::ws::Utf8Bytes;
use tokio::sync::mpsc;
use tokio::time::Instant;
use uuid::Uuid;

/// Unique connection identifier (`conn_<uuid v7>`).
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ConnectionId(String);

impl ConnectionId {
    /// Generate a fresh ID.
    pub fn new() -> Self {
        Self(format!("conn_{}", Uuid::now_v7()))
    }

    /// Borrow the ID as a string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<&str> for ConnectionId {
    fn from(id: &str) -> Self {
        Self(id.to_owned())
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lifecycle of a connection: `Connecting → Open → Closed`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    /// Upgraded but not yet registered with the relay engine.
    Connecting,
    /// Registered and eligible for broadcasts.
    Open,
    /// Removed from the registry. Terminal.
    Closed,
}

/// A connected client as seen by the relay engine.
///
/// Owned by the registry; the session task keeps only the receiving end of
/// the outbound queue.
pub struct ClientConnection {
    id: ConnectionId,
    tx: mpsc::Sender<Utf8Bytes>,
    state: ConnectionState,
    connected_at: Instant,
    dropped_messages: u64,
}

impl ClientConnection {
    /// Create a connection in the `Connecting` state.
    pub fn new(id: ConnectionId, tx: mpsc::Sender<Utf8Bytes>) -> Self {
        Self {
            id,
            tx,
            state: ConnectionState::Connecting,
            connected_at: Instant::now(),
            dropped_messages: 0,
        }
    }

    /// Connection ID.
    pub fn id(&self) -> &ConnectionId {
        &self.id
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub(crate) fn mark_open(&mut self) {
        self.state = ConnectionState::Open;
    }

    pub(crate) fn mark_closed(&mut self) {
        self.state = ConnectionState::Closed;
    }

    /// Whether frames can still be queued for this client.
    ///
    /// False once closed or once the session's writer has gone away.
    pub fn is_open(&self) -> bool {
        self.state == ConnectionState::Open && !self.tx.is_closed()
    }

    /// Queue a text frame for the client.
    ///
    /// Returns `false` if the queue is full or closed, and increments the
    /// dropped message counter.
    pub fn send(&mut self, message: Utf8Bytes) -> bool {
        if self.tx.try_send(message).is_ok() {
            true
        } else {
            self.dropped_messages += 1;
            false
        }
    }

    /// Total frames dropped for this connection.
    pub fn drop_count(&self) -> u64 {
        self.dropped_messages
    }

    /// Connection age.
    pub fn age(&self) -> Duration {
        self.connected_at.elapsed()
    }
}

impl fmt::Debug for ClientConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConnection")
            .field("id", &self.id)
            .field("state", &self.state)
            .field("dropped_messages", &self.dropped_messages)
            .finish_non_exhaustive()
    }
}
