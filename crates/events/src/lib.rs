//! Realtime notification infrastructure.
//!
//! - [`NotificationHub`]: the owner → live channel registry.
//! - [`EventBus`] / [`JobEvent`]: typed in-process status-change events
//!   emitted by workers.
//! - [`NotificationRouter`]: consumes the bus and publishes through the hub.
//! - [`ChangeBridge`]: polls a cross-process change feed and republishes
//!   through the hub.

pub mod bridge;
pub mod bus;
pub mod feed;
pub mod hub;
pub mod router;

pub use bridge::{BridgeConfig, ChangeBridge};
pub use bus::{EventBus, JobEvent};
pub use feed::{ChangeFeed, ChangeNotice, FeedError, PgChangeFeed};
pub use hub::{ConnectionId, HubMessage, HubReceiver, NotificationHub};
pub use router::NotificationRouter;
