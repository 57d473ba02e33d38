//! Stop signal shared by the listener, the WebSocket sessions and the relay
//! engine.

use std::time::Duration;

use tokio::task::{AbortHandle, JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// How long [`RunningServer::stop`](crate::RunningServer::stop) waits for
/// the listener and the engine to wind down.
pub const DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

/// One cancellation token handed to every relay task.
///
/// The listener stops accepting, sessions send a close frame, and the
/// engine discards its pending broadcast once the token fires.
#[derive(Debug, Default)]
pub struct ShutdownCoordinator {
    token: CancellationToken,
}

impl ShutdownCoordinator {
    /// Fresh, untriggered coordinator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Token for a task that must stop with the relay.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Fire the token. Repeated calls are no-ops.
    pub fn shutdown(&self) {
        if !self.token.is_cancelled() {
            info!("relay shutdown requested");
            self.token.cancel();
        }
    }

    /// Whether the token has fired.
    pub fn is_shutting_down(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Fire the token and wait up to `timeout` for `tasks` to finish.
    ///
    /// Returns how many tasks were still running at the deadline; those are
    /// aborted.
    pub async fn drain(&self, tasks: Vec<JoinHandle<()>>, timeout: Duration) -> usize {
        self.shutdown();
        let aborts: Vec<AbortHandle> = tasks.iter().map(JoinHandle::abort_handle).collect();
        if tokio::time::timeout(timeout, futures::future::join_all(tasks))
            .await
            .is_ok()
        {
            return 0;
        }

        let stragglers = aborts
            .iter()
            .filter(|task| !task.is_finished())
            .inspect(|task| task.abort())
            .count();
        warn!(stragglers, "relay tasks still running after {timeout:?}, aborting");
        stragglers
    }
}
