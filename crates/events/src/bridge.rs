//! Republishes cross-process change notices through the local hub.
//!
//! [`ChangeBridge`] polls a [`ChangeFeed`] on a fixed interval and, for each
//! notice, pushes a generic `"Data updated"` frame to the owner's connection
//! in this process. Notices written by this process itself (matched on
//! `origin`) are skipped because the local worker already published them.
//! While the feed is unavailable the poll delay backs off exponentially.

use std::sync::Arc;
use std::time::Duration;

use harmonia_core::realtime::ChannelFrame;
use tokio_util::sync::CancellationToken;

use crate::feed::ChangeFeed;
use crate::hub::NotificationHub;

/// Tunable parameters for the bridge loop.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Delay between polls while the feed is healthy.
    pub poll_interval: Duration,
    /// Upper bound on the delay after consecutive feed errors.
    pub max_backoff: Duration,
    /// Factor by which the delay grows after each feed error.
    pub multiplier: f64,
    /// This process's write origin; matching notices are not republished.
    pub local_origin: Option<String>,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(500),
            max_backoff: Duration::from_secs(30),
            multiplier: 2.0,
            local_origin: None,
        }
    }
}

impl BridgeConfig {
    pub fn with_local_origin(mut self, origin: impl Into<String>) -> Self {
        self.local_origin = Some(origin.into());
        self
    }
}

/// Calculate the next backoff delay, clamped to [`BridgeConfig::max_backoff`].
pub fn next_delay(current: Duration, config: &BridgeConfig) -> Duration {
    let next_ms = (current.as_millis() as f64 * config.multiplier) as u64;
    Duration::from_millis(next_ms).min(config.max_backoff)
}

/// Background service feeding change notices into the hub.
pub struct ChangeBridge<F> {
    feed: F,
    hub: Arc<NotificationHub>,
    config: BridgeConfig,
}

impl<F: ChangeFeed> ChangeBridge<F> {
    pub fn new(feed: F, hub: Arc<NotificationHub>, config: BridgeConfig) -> Self {
        Self { feed, hub, config }
    }

    /// Run the poll loop until `cancel` is triggered.
    pub async fn run(mut self, cancel: CancellationToken) {
        let mut delay = self.config.poll_interval;
        tracing::info!(
            interval_ms = delay.as_millis() as u64,
            "Change bridge started",
        );

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Change bridge stopping");
                    break;
                }
                _ = tokio::time::sleep(delay) => {}
            }

            match self.feed.poll().await {
                Ok(notices) => {
                    delay = self.config.poll_interval;
                    for notice in notices {
                        if self.is_local(notice.origin.as_deref()) {
                            continue;
                        }
                        let delivered = self
                            .hub
                            .publish(notice.owner_id, ChannelFrame::data_updated())
                            .await;
                        tracing::debug!(
                            arrangement_id = notice.arrangement_id,
                            owner_id = notice.owner_id,
                            operation = %notice.operation,
                            delivered,
                            "Bridged change notice",
                        );
                    }
                }
                Err(e) => {
                    delay = next_delay(delay, &self.config);
                    tracing::warn!(
                        error = %e,
                        retry_in_ms = delay.as_millis() as u64,
                        "Change feed unavailable",
                    );
                }
            }
        }
    }

    fn is_local(&self, origin: Option<&str>) -> bool {
        match (self.config.local_origin.as_deref(), origin) {
            (Some(local), Some(origin)) => !local.is_empty() && local == origin,
            _ => false,
        }
    }
}
