//! Cloneable front door to the relay engine task.

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::engine::{RelayEngine, RelayEvent, RelayStats};
use crate::config::RelayConfig;
use crate::errors::RelayError;
use crate::websocket::connection::{ClientConnection, ConnectionId};

/// Capacity of the engine's event queue.
const EVENT_QUEUE_CAPACITY: usize = 1024;

/// Sends [`RelayEvent`]s to the engine task.
///
/// Every method fails with [`RelayError::EngineClosed`] once the engine has
/// stopped.
#[derive(Clone, Debug)]
pub struct RelayHandle {
    tx: mpsc::Sender<RelayEvent>,
}

impl RelayHandle {
    async fn send(&self, event: RelayEvent) -> Result<(), RelayError> {
        self.tx.send(event).await.map_err(|_| RelayError::EngineClosed)
    }

    /// Register a freshly upgraded connection.
    pub async fn connect(&self, connection: ClientConnection) -> Result<(), RelayError> {
        self.send(RelayEvent::Connect(connection)).await
    }

    /// Hand a received text frame to the engine.
    pub async fn message(&self, conn_id: ConnectionId, raw: String) -> Result<(), RelayError> {
        self.send(RelayEvent::Message { conn_id, raw }).await
    }

    /// Report that a connection closed.
    pub async fn close(&self, conn_id: ConnectionId) -> Result<(), RelayError> {
        self.send(RelayEvent::Close { conn_id }).await
    }

    /// Report a transport error on a connection.
    pub async fn error(&self, conn_id: ConnectionId, error: String) -> Result<(), RelayError> {
        self.send(RelayEvent::Error { conn_id, error }).await
    }

    /// Snapshot of the engine counters.
    pub async fn stats(&self) -> Result<RelayStats, RelayError> {
        let (reply, rx) = oneshot::channel();
        self.send(RelayEvent::Stats(reply)).await?;
        rx.await.map_err(|_| RelayError::EngineClosed)
    }

    /// Whether the engine task is gone.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Spawn the engine on the current runtime.
///
/// The task ends when `cancel` fires or every handle is dropped.
pub fn spawn_engine(config: RelayConfig, cancel: CancellationToken) -> (RelayHandle, JoinHandle<()>) {
    let (tx, rx) = mpsc::channel(EVENT_QUEUE_CAPACITY);
    let engine = RelayEngine::new(config);
    let task = tokio::spawn(engine.run(rx, cancel));
    (RelayHandle { tx }, task)
}
