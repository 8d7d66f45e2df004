//! Forwards worker status changes to the owner's realtime channel.
//!
//! [`NotificationRouter`] subscribes to the [`EventBus`](crate::bus::EventBus)
//! and pushes one `"Data updated"` frame through the [`NotificationHub`] per
//! [`JobEvent`]. It exits when the bus is dropped.

use std::sync::Arc;

use harmonia_core::realtime::ChannelFrame;
use tokio::sync::broadcast;

use crate::bus::JobEvent;
use crate::hub::NotificationHub;

/// Background service bridging the job event bus to the hub.
pub struct NotificationRouter {
    hub: Arc<NotificationHub>,
}

impl NotificationRouter {
    pub fn new(hub: Arc<NotificationHub>) -> Self {
        Self { hub }
    }

    /// Run the routing loop until the bus closes.
    pub async fn run(self, mut receiver: broadcast::Receiver<JobEvent>) {
        loop {
            match receiver.recv().await {
                Ok(event) => self.route(&event).await,
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!(skipped = n, "Notification router lagged, some updates were dropped");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    tracing::info!("Event bus closed, notification router shutting down");
                    break;
                }
            }
        }
    }

    async fn route(&self, event: &JobEvent) {
        let delivered = self
            .hub
            .publish(event.owner_id, ChannelFrame::data_updated())
            .await;
        tracing::debug!(
            arrangement_id = event.arrangement_id,
            owner_id = event.owner_id,
            status = %event.status,
            delivered,
            "Routed job event",
        );
    }
}
