//! Single-slot debounce buffer.

use std::time::Duration;

use tokio::time::Instant;

use crate::payload::JointPayload;
use crate::websocket::connection::ConnectionId;

/// The coalesced payload waiting for its window to close.
#[derive(Clone, Debug)]
pub struct PendingBroadcast {
    /// Most recent payload.
    pub payload: JointPayload,
    /// Connection that sent it.
    pub origin: ConnectionId,
    /// When it becomes due.
    pub fire_at: Instant,
}

/// At most one pending broadcast, replaced by every newer payload.
#[derive(Debug)]
pub struct DebounceSlot {
    window: Duration,
    pending: Option<PendingBroadcast>,
    superseded: u64,
}

impl DebounceSlot {
    /// Empty slot with the given window.
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            pending: None,
            superseded: 0,
        }
    }

    /// Store `payload`, replacing any pending one, and restart the window.
    ///
    /// Returns the new deadline.
    pub fn schedule(&mut self, payload: JointPayload, origin: ConnectionId, now: Instant) -> Instant {
        let fire_at = now + self.window;
        if self.pending.replace(PendingBroadcast {
            payload,
            origin,
            fire_at,
        })
        .is_some()
        {
            self.superseded += 1;
        }
        fire_at
    }

    /// Deadline of the pending payload, if any.
    pub fn deadline(&self) -> Option<Instant> {
        self.pending.as_ref().map(|p| p.fire_at)
    }

    /// Take the pending payload if its deadline has passed.
    pub fn take_due(&mut self, now: Instant) -> Option<PendingBroadcast> {
        match &self.pending {
            Some(p) if p.fire_at <= now => self.pending.take(),
            _ => None,
        }
    }

    /// Whether a payload is waiting.
    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Discard the pending payload.
    pub fn clear(&mut self) -> Option<PendingBroadcast> {
        self.pending.take()
    }

    /// Payloads replaced before they fired.
    pub fn superseded(&self) -> u64 {
        self.superseded
    }
}
