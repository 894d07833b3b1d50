//! Per-user fan-out of chore change events to live connections.
//!
//! Delivery is best effort: events are pushed into an unbounded channel per
//! connection and never queued for users with no open connection.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::db::Chore;

/// Serialized as `{"type": "CHORE_CREATED", "chore": {...}}` and friends.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChoreEvent {
    ChoreCreated {
        chore: Chore,
    },
    ChoreUpdated {
        chore: Chore,
    },
    ChoreDeleted {
        #[serde(rename = "choreId")]
        chore_id: i64,
    },
}

pub type ConnectionId = u64;

type Senders = HashMap<ConnectionId, mpsc::UnboundedSender<String>>;

#[derive(Default)]
pub struct Notifier {
    next_id: AtomicU64,
    connections: Mutex<HashMap<i64, Senders>>,
}

impl Notifier {
    pub fn new() -> Self {
        Self::default()
    }

    fn connections(&self) -> std::sync::MutexGuard<'_, HashMap<i64, Senders>> {
        self.connections.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Register a live connection for `user_id`. Dropping the subscription deregisters it.
    pub fn subscribe(self: &Arc<Self>, user_id: i64) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::unbounded_channel();
        self.connections().entry(user_id).or_default().insert(id, tx);
        debug!(user_id, connection = id, "Connection registered");

        Subscription {
            notifier: Arc::clone(self),
            user_id,
            id,
            receiver: rx,
        }
    }

    pub fn unregister(&self, user_id: i64, id: ConnectionId) {
        let mut connections = self.connections();
        if let Some(senders) = connections.get_mut(&user_id) {
            senders.remove(&id);
            if senders.is_empty() {
                connections.remove(&user_id);
            }
        }
        debug!(user_id, connection = id, "Connection deregistered");
    }

    /// Send `event` to every open connection of `user_id`.
    ///
    /// Returns how many connections accepted it. Connections whose receiver is
    /// gone are dropped from the registry.
    pub fn broadcast_to_user(&self, user_id: i64, event: &ChoreEvent) -> usize {
        let message = match serde_json::to_string(event) {
            Ok(message) => message,
            Err(e) => {
                warn!("Failed to serialize chore event: {}", e);
                return 0;
            }
        };

        let mut connections = self.connections();
        let Some(senders) = connections.get_mut(&user_id) else {
            return 0;
        };

        let before = senders.len();
        senders.retain(|_, tx| tx.send(message.clone()).is_ok());
        let delivered = senders.len();
        if delivered < before {
            debug!(user_id, dropped = before - delivered, "Dropped closed connections");
        }
        if senders.is_empty() {
            connections.remove(&user_id);
        }
        delivered
    }

    pub fn connection_count(&self, user_id: i64) -> usize {
        self.connections().get(&user_id).map_or(0, HashMap::len)
    }
}

/// A registered connection's event stream.
pub struct Subscription {
    notifier: Arc<Notifier>,
    user_id: i64,
    id: ConnectionId,
    receiver: mpsc::UnboundedReceiver<String>,
}

impl Subscription {
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub async fn recv(&mut self) -> Option<String> {
        self.receiver.recv().await
    }

    pub fn try_recv(&mut self) -> Option<String> {
        self.receiver.try_recv().ok()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.notifier.unregister(self.user_id, self.id);
    }
}
