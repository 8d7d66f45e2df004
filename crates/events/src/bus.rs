//! In-process job event bus backed by a `tokio::sync::broadcast` channel.
//!
//! Workers publish a [`JobEvent`] whenever they move an arrangement into a
//! new status. Subscribers (the [`NotificationRouter`](crate::router::NotificationRouter),
//! test probes) each receive every event independently.

use chrono::{DateTime, Utc};
use harmonia_core::types::{DbId, OwnerId};
use harmonia_db::models::status::ArrangementStatus;
use tokio::sync::broadcast;

// ---------------------------------------------------------------------------
// JobEvent
// ---------------------------------------------------------------------------

/// A status change of one arrangement, attributed to its owner.
#[derive(Debug, Clone, PartialEq)]
pub struct JobEvent {
    pub arrangement_id: DbId,
    pub owner_id: OwnerId,
    pub status: ArrangementStatus,
    pub timestamp: DateTime<Utc>,
}

impl JobEvent {
    pub fn new(arrangement_id: DbId, owner_id: OwnerId, status: ArrangementStatus) -> Self {
        Self {
            arrangement_id,
            owner_id,
            status,
            timestamp: Utc::now(),
        }
    }
}

// ---------------------------------------------------------------------------
// EventBus
// ---------------------------------------------------------------------------

/// Default buffer capacity for the broadcast channel.
const DEFAULT_CAPACITY: usize = 1024;

/// In-process fan-out bus for [`JobEvent`]s. Share via `Arc<EventBus>`.
pub struct EventBus {
    sender: broadcast::Sender<JobEvent>,
}

impl EventBus {
    /// Create a bus with a specific channel capacity.
    ///
    /// When the buffer is full the oldest unconsumed events are dropped and
    /// slow receivers observe `RecvError::Lagged`.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all current subscribers.
    ///
    /// With no subscribers the event is dropped.
    pub fn publish(&self, event: JobEvent) {
        let _ = self.sender.send(event);
    }

    /// Subscribe to every event published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
