//! Server transition notifications.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::pool::types::{PoolId, ServerId};

/// Notification emitted when a server changes status inside a pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum PoolEvent {
    ServerFailed { pool: PoolId, server: ServerId },
    ServerRecovered { pool: PoolId, server: ServerId },
}

/// Best-effort fan-out of pool events.
///
/// Publishing never blocks; slow subscribers see `Lagged` and lose events.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<PoolEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PoolEvent> {
        self.tx.subscribe()
    }

    pub fn publish(&self, event: PoolEvent) {
        // No subscribers is not an error
        let _ = self.tx.send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
