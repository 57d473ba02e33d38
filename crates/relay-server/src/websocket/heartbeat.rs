//! Heartbeat ping/pong liveness tracking.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;

/// Outcome of a heartbeat tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeartbeatVerdict {
    /// Send the next ping.
    Ping,
    /// No pong within the timeout; close the connection.
    TimedOut,
}

/// Liveness shared between a session's reader (which sees pongs) and its
/// writer (which sends pings).
#[derive(Debug)]
pub struct Liveness {
    is_alive: AtomicBool,
    last_pong: Mutex<Instant>,
    timeout: Duration,
}

impl Liveness {
    /// Start out alive with the pong clock at now.
    pub fn new(timeout: Duration) -> Self {
        Self {
            is_alive: AtomicBool::new(true),
            last_pong: Mutex::new(Instant::now()),
            timeout,
        }
    }

    /// Record a pong (or any ping from the client).
    pub fn mark_alive(&self) {
        self.is_alive.store(true, Ordering::Relaxed);
        *self.last_pong.lock() = Instant::now();
    }

    /// Time since the last pong or since creation.
    pub fn last_pong_elapsed(&self) -> Duration {
        self.last_pong.lock().elapsed()
    }

    /// Decide what to do at a ping tick, resetting the alive flag.
    ///
    /// A single missed cycle is tolerated; only a silence longer than the
    /// timeout ends the connection.
    pub fn tick(&self) -> HeartbeatVerdict {
        let was_alive = self.is_alive.swap(false, Ordering::Relaxed);
        if !was_alive && self.last_pong_elapsed() > self.timeout {
            HeartbeatVerdict::TimedOut
        } else {
            HeartbeatVerdict::Ping
        }
    }
}
