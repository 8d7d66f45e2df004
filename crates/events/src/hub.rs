//! Owner-scoped registry of live realtime connections.
//!
//! [`NotificationHub`] maps each owner to at most one push channel. It is
//! the only shared mutable structure on the notification path: workers,
//! the change bridge, and the WebSocket acceptor all go through its
//! interior `RwLock`. Share it via `Arc<NotificationHub>`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use harmonia_core::realtime::ChannelFrame;
use harmonia_core::types::OwnerId;
use tokio::sync::{mpsc, RwLock};

/// Outbound item for a single connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HubMessage {
    /// A JSON frame for the client.
    Frame(ChannelFrame),
    /// Transport-level keepalive.
    Ping,
    /// Ask the connection to close.
    Close,
}

/// Channel sender half for pushing messages to a connection.
pub type HubSender = mpsc::UnboundedSender<HubMessage>;

/// Receiver half handed back to the connection task on registration.
pub type HubReceiver = mpsc::UnboundedReceiver<HubMessage>;

/// Identifies one registration so a superseded connection cannot
/// unregister its replacement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// A registered connection.
struct Registration {
    conn_id: ConnectionId,
    sender: HubSender,
}

/// Concurrency-safe owner → connection registry.
pub struct NotificationHub {
    connections: RwLock<HashMap<OwnerId, Registration>>,
    next_id: AtomicU64,
}

impl NotificationHub {
    /// Create a new, empty hub.
    pub fn new() -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Register a connection for `owner_id`.
    ///
    /// Silently supersedes any existing registration for the same owner.
    /// Returns the connection id and the receiver the caller forwards to
    /// its socket.
    pub async fn register(&self, owner_id: OwnerId) -> (ConnectionId, HubReceiver) {
        let (sender, rx) = mpsc::unbounded_channel();
        let conn_id = ConnectionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let registration = Registration { conn_id, sender };

        let previous = self
            .connections
            .write()
            .await
            .insert(owner_id, registration);

        if previous.is_some() {
            tracing::info!(owner_id, "Realtime connection superseded");
        } else {
            tracing::info!(owner_id, "Realtime connection registered");
        }
        (conn_id, rx)
    }

    /// Remove whatever connection is registered for `owner_id`.
    ///
    /// Returns `true` if an entry was removed.
    pub async fn unregister(&self, owner_id: OwnerId) -> bool {
        self.connections.write().await.remove(&owner_id).is_some()
    }

    /// Remove the registration for `owner_id` only if it is still `conn_id`.
    ///
    /// Used on disconnect so a superseded socket closing late does not
    /// drop the newer connection.
    pub async fn release(&self, owner_id: OwnerId, conn_id: ConnectionId) -> bool {
        let mut conns = self.connections.write().await;
        match conns.get(&owner_id) {
            Some(reg) if reg.conn_id == conn_id => {
                conns.remove(&owner_id);
                tracing::info!(owner_id, "Realtime connection released");
                true
            }
            _ => false,
        }
    }

    /// Push `frame` to the owner's connection, if any.
    ///
    /// Fire-and-forget: returns `true` if the frame was handed to a live
    /// channel. A channel whose receiver is gone is evicted.
    pub async fn publish(&self, owner_id: OwnerId, frame: ChannelFrame) -> bool {
        let failed = {
            let conns = self.connections.read().await;
            let Some(reg) = conns.get(&owner_id) else {
                tracing::trace!(owner_id, "No realtime connection for owner");
                return false;
            };
            match reg.sender.send(HubMessage::Frame(frame)) {
                Ok(()) => return true,
                Err(_) => reg.conn_id,
            }
        };

        tracing::warn!(owner_id, "Realtime delivery failed, evicting dead connection");
        self.release(owner_id, failed).await;
        false
    }

    /// Whether `owner_id` currently has a registered connection.
    pub async fn is_registered(&self, owner_id: OwnerId) -> bool {
        self.connections.read().await.contains_key(&owner_id)
    }

    /// Return the current number of registered connections.
    pub async fn connection_count(&self) -> usize {
        self.connections.read().await.len()
    }

    /// Send a Ping to every registered connection.
    pub async fn ping_all(&self) {
        let conns = self.connections.read().await;
        for reg in conns.values() {
            let _ = reg.sender.send(HubMessage::Ping);
        }
    }

    /// Send Close to every connection, then clear the registry.
    pub async fn shutdown_all(&self) {
        let mut conns = self.connections.write().await;
        let count = conns.len();
        for reg in conns.values() {
            let _ = reg.sender.send(HubMessage::Close);
        }
        conns.clear();
        tracing::info!(count, "Closed all realtime connections");
    }
}

impl Default for NotificationHub {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
