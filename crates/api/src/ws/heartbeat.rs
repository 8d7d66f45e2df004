use std::sync::Arc;
use std::time::Duration;

use harmonia_events::NotificationHub;
use tokio_util::sync::CancellationToken;

/// Interval between heartbeat pings.
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(25);

/// Spawn a task that pings every registered connection until `cancel` fires.
pub fn start_heartbeat(
    hub: Arc<NotificationHub>,
    cancel: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(HEARTBEAT_INTERVAL);
        // The first tick completes immediately.
        interval.tick().await;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = interval.tick() => {
                    let count = hub.connection_count().await;
                    tracing::debug!(count, "Realtime heartbeat ping");
                    hub.ping_all().await;
                }
            }
        }
    })
}
