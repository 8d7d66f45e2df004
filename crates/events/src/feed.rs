//! Cross-process change feed.
//!
//! Every write to the `arrangements` table fires a Postgres `NOTIFY` on
//! [`CHANGE_CHANNEL`](harmonia_db::CHANGE_CHANNEL). [`PgChangeFeed`] listens on
//! that channel and hands batches of parsed [`ChangeNotice`]s to the
//! [`ChangeBridge`](crate::bridge::ChangeBridge). Delivery is at-least-once
//! and unordered.

use std::time::Duration;

use async_trait::async_trait;
use harmonia_core::types::{DbId, OwnerId};
use harmonia_db::{DbPool, CHANGE_CHANNEL};
use serde::Deserialize;
use sqlx::postgres::PgListener;

/// How long [`PgChangeFeed::poll`] waits for each further notification
/// before returning the batch collected so far.
const DRAIN_WAIT: Duration = Duration::from_millis(25);

/// Upper bound on notices returned by one poll.
const MAX_BATCH: usize = 256;

/// One row change, as emitted by the `arrangements` notify trigger.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ChangeNotice {
    pub arrangement_id: DbId,
    pub owner_id: OwnerId,
    #[serde(default)]
    pub status_id: Option<i16>,
    /// `INSERT`, `UPDATE` or `DELETE`.
    pub operation: String,
    /// `application_name` of the connection that made the write.
    #[serde(default)]
    pub origin: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum FeedError {
    #[error("Change feed database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Change feed connection lost")]
    Disconnected,
}

/// A source of change notices polled by the bridge.
#[async_trait]
pub trait ChangeFeed: Send {
    /// Return every notice that arrived since the previous poll.
    ///
    /// An empty batch is normal. An error means the feed is temporarily
    /// unavailable; the caller keeps polling.
    async fn poll(&mut self) -> Result<Vec<ChangeNotice>, FeedError>;
}

/// [`ChangeFeed`] backed by Postgres `LISTEN`.
pub struct PgChangeFeed {
    listener: PgListener,
}

impl PgChangeFeed {
    /// Open a dedicated listener connection and subscribe to the change channel.
    pub async fn connect(pool: &DbPool) -> Result<Self, sqlx::Error> {
        let mut listener = PgListener::connect_with(pool).await?;
        listener.listen(CHANGE_CHANNEL).await?;
        tracing::info!(channel = CHANGE_CHANNEL, "Listening for arrangement changes");
        Ok(Self { listener })
    }
}

#[async_trait]
impl ChangeFeed for PgChangeFeed {
    async fn poll(&mut self) -> Result<Vec<ChangeNotice>, FeedError> {
        let mut batch = Vec::new();

        while batch.len() < MAX_BATCH {
            match tokio::time::timeout(DRAIN_WAIT, self.listener.try_recv()).await {
                Err(_) => break,
                Ok(Ok(Some(notification))) => {
                    if let Some(notice) = parse_notice(notification.payload()) {
                        batch.push(notice);
                    }
                }
                // The listener reconnects on the next call.
                Ok(Ok(None)) if batch.is_empty() => return Err(FeedError::Disconnected),
                Ok(Ok(None)) => break,
                Ok(Err(e)) => return Err(e.into()),
            }
        }

        Ok(batch)
    }
}

/// Parse a trigger payload, logging and dropping malformed ones.
pub fn parse_notice(payload: &str) -> Option<ChangeNotice> {
    match serde_json::from_str(payload) {
        Ok(notice) => Some(notice),
        Err(e) => {
            tracing::warn!(error = %e, payload, "Ignoring malformed change notice");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_trigger_payload() {
        let notice = parse_notice(
            r#"{"arrangement_id": 12, "owner_id": 9, "status_id": 3,
                "operation": "UPDATE", "origin": "harmonia-a1"}"#,
        )
        .unwrap();

        assert_eq!(notice.arrangement_id, 12);
        assert_eq!(notice.owner_id, 9);
        assert_eq!(notice.status_id, Some(3));
        assert_eq!(notice.operation, "UPDATE");
        assert_eq!(notice.origin.as_deref(), Some("harmonia-a1"));
    }

    #[test]
    fn origin_is_optional() {
        let notice =
            parse_notice(r#"{"arrangement_id": 1, "owner_id": 2, "operation": "DELETE"}"#).unwrap();
        assert!(notice.origin.is_none());
        assert!(notice.status_id.is_none());
    }

    #[test]
    fn malformed_payload_is_dropped() {
        assert!(parse_notice("not json").is_none());
        assert!(parse_notice(r#"{"arrangement_id": 1}"#).is_none());
    }
}
