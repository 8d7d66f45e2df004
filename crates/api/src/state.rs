use std::sync::Arc;

use harmonia_events::NotificationHub;
use harmonia_pipeline::JobDispatcher;
use harmonia_storage::BlobStore;

use crate::auth::IdentityResolver;
use crate::config::ServerConfig;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// Cheaply cloneable: everything is behind an `Arc` or already `Clone`.
#[derive(Clone)]
pub struct AppState {
    pub pool: harmonia_db::DbPool,
    pub config: Arc<ServerConfig>,
    /// Per-owner realtime connections.
    pub hub: Arc<NotificationHub>,
    /// Bounded pool running generation jobs.
    pub dispatcher: Arc<JobDispatcher>,
    /// Where mixed arrangements are read from and deleted.
    pub blobs: Arc<dyn BlobStore>,
    /// Resolves bearer and realtime credentials to owner ids.
    pub identity: Arc<dyn IdentityResolver>,
}
