//! Active-connection set and payload fan-out.
//!
//! Owned by the relay engine task, so no locking is involved.

use std::collections::HashMap;
use std::collections::hash_map::Entry;

use axum::extract::ws::Utf8Bytes;
use metrics::counter;
use tracing::{debug, warn};

use super::connection::{ClientConnection, ConnectionId};
use crate::metrics::RELAY_BROADCAST_DROPS_TOTAL;

/// Per-broadcast delivery tally.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    /// Frames queued successfully.
    pub delivered: usize,
    /// Peers whose queue was full or closed mid-send.
    pub failed: usize,
    /// Registered peers skipped because their channel was no longer open.
    pub skipped_closed: usize,
    /// Whether the sender was skipped by the echo policy.
    pub excluded_sender: bool,
}

/// Connections currently eligible for broadcasts.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    connections: HashMap<ConnectionId, ClientConnection>,
}

impl ConnectionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection and mark it open.
    ///
    /// Returns a mutable handle so the caller can queue the first frame.
    pub fn add(&mut self, mut connection: ClientConnection) -> &mut ClientConnection {
        connection.mark_open();
        match self.connections.entry(connection.id().clone()) {
            Entry::Occupied(mut entry) => {
                warn!(conn_id = %entry.key(), "connection id registered twice, replacing");
                entry.insert(connection).mark_closed();
                entry.into_mut()
            }
            Entry::Vacant(entry) => entry.insert(connection),
        }
    }

    /// Remove a connection, marking it closed. `None` if it was not registered.
    pub fn remove(&mut self, id: &ConnectionId) -> Option<ClientConnection> {
        let mut connection = self.connections.remove(id)?;
        connection.mark_closed();
        Some(connection)
    }

    /// Whether `id` is registered.
    pub fn contains(&self, id: &ConnectionId) -> bool {
        self.connections.contains_key(id)
    }

    /// Number of registered connections.
    pub fn len(&self) -> usize {
        self.connections.len()
    }

    /// Whether no connection is registered.
    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// Queue `text` on every open connection, optionally skipping `exclude`.
    ///
    /// A failure on one peer is logged and counted; delivery to the rest
    /// continues.
    pub fn broadcast(&mut self, text: &Utf8Bytes, exclude: Option<&ConnectionId>) -> BroadcastReport {
        let mut report = BroadcastReport::default();
        for conn in self.connections.values_mut() {
            if exclude == Some(conn.id()) {
                report.excluded_sender = true;
                continue;
            }
            if !conn.is_open() {
                report.skipped_closed += 1;
                continue;
            }
            if conn.send(text.clone()) {
                report.delivered += 1;
            } else {
                report.failed += 1;
                counter!(RELAY_BROADCAST_DROPS_TOTAL).increment(1);
                warn!(
                    conn_id = %conn.id(),
                    dropped = conn.drop_count(),
                    "failed to queue payload for client"
                );
            }
        }
        debug!(
            delivered = report.delivered,
            failed = report.failed,
            skipped_closed = report.skipped_closed,
            "broadcast payload"
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::websocket::connection::ConnectionState;
    use tokio::sync::mpsc;

    fn make_connection(id: &str) -> (ClientConnection, mpsc::Receiver<Utf8Bytes>) {
        let (tx, rx) = mpsc::channel(8);
        (ClientConnection::new(id.into(), tx), rx)
    }

    fn text(s: &str) -> Utf8Bytes {
        Utf8Bytes::from(s)
    }

    #[test]
    fn add_marks_open() {
        let mut reg = ConnectionRegistry::new();
        let (conn, _rx) = make_connection("c1");
        let added = reg.add(conn);
        assert_eq!(added.state(), ConnectionState::Open);
        assert_eq!(reg.len(), 1);
        assert!(reg.contains(&"c1".into()));
    }

    #[test]
    fn remove_exactly_once() {
        let mut reg = ConnectionRegistry::new();
        let (conn, _rx) = make_connection("c1");
        let _ = reg.add(conn);

        let removed = reg.remove(&"c1".into()).unwrap();
        assert_eq!(removed.state(), ConnectionState::Closed);
        assert!(reg.remove(&"c1".into()).is_none());
        assert!(reg.is_empty());
    }

    #[test]
    fn broadcast_reaches_everyone() {
        let mut reg = ConnectionRegistry::new();
        let (c1, mut rx1) = make_connection("c1");
        let (c2, mut rx2) = make_connection("c2");
        let (c3, mut rx3) = make_connection("c3");
        let _ = reg.add(c1);
        let _ = reg.add(c2);
        let _ = reg.add(c3);

        let report = reg.broadcast(&text(r#"{"a":1}"#), None);
        assert_eq!(report.delivered, 3);
        assert_eq!(report.failed, 0);
        assert!(!report.excluded_sender);

        for rx in [&mut rx1, &mut rx2, &mut rx3] {
            assert_eq!(rx.try_recv().unwrap().as_str(), r#"{"a":1}"#);
        }
    }

    #[test]
    fn broadcast_skips_excluded_sender() {
        let mut reg = ConnectionRegistry::new();
        let (c1, mut rx1) = make_connection("c1");
        let (c2, mut rx2) = make_connection("c2");
        let _ = reg.add(c1);
        let _ = reg.add(c2);

        let report = reg.broadcast(&text("1"), Some(&"c1".into()));
        assert_eq!(report.delivered, 1);
        assert!(report.excluded_sender);
        assert!(rx1.try_recv().is_err());
        assert!(rx2.try_recv().is_ok());
    }

    #[test]
    fn broadcast_skips_closed_channels_silently() {
        let mut reg = ConnectionRegistry::new();
        let (c1, rx1) = make_connection("c1");
        let (c2, mut rx2) = make_connection("c2");
        let _ = reg.add(c1);
        let _ = reg.add(c2);
        drop(rx1);

        let report = reg.broadcast(&text("true"), None);
        assert_eq!(report.delivered, 1);
        assert_eq!(report.skipped_closed, 1);
        assert_eq!(report.failed, 0);
        assert!(rx2.try_recv().is_ok());
    }

    #[test]
    fn full_queue_does_not_block_other_peers() {
        let mut reg = ConnectionRegistry::new();
        let (tx_slow, _rx_slow) = mpsc::channel(1);
        let _ = reg.add(ClientConnection::new("slow".into(), tx_slow));
        let (fast, mut rx_fast) = make_connection("fast");
        let _ = reg.add(fast);

        let first = reg.broadcast(&text("1"), None);
        assert_eq!(first.delivered, 2);

        let second = reg.broadcast(&text("2"), None);
        assert_eq!(second.delivered, 1);
        assert_eq!(second.failed, 1);

        assert_eq!(rx_fast.try_recv().unwrap().as_str(), "1");
        assert_eq!(rx_fast.try_recv().unwrap().as_str(), "2");
    }

    #[test]
    fn broadcast_shares_one_buffer() {
        let mut reg = ConnectionRegistry::new();
        let (c1, mut rx1) = make_connection("c1");
        let (c2, mut rx2) = make_connection("c2");
        let _ = reg.add(c1);
        let _ = reg.add(c2);

        let payload = text(r#"{"x":0}"#);
        let _ = reg.broadcast(&payload, None);
        let a = rx1.try_recv().unwrap();
        let b = rx2.try_recv().unwrap();
        assert_eq!(a.as_str().as_ptr(), b.as_str().as_ptr());
    }

    #[test]
    fn empty_registry_broadcast_is_noop() {
        let mut reg = ConnectionRegistry::new();
        assert_eq!(reg.broadcast(&text("{}"), None), BroadcastReport::default());
    }
}
