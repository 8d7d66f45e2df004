pub mod arrangements;
pub mod health;

use axum::routing::get;
use axum::Router;

use crate::state::AppState;
use crate::ws;

/// Build the `/api` route tree plus the realtime channel.
///
/// ```text
/// /websocket                               realtime channel (WebSocket)
///
/// /api/arrangements                        list, create
/// /api/arrangements/{id}                   get, rename, delete
/// /api/arrangements/{id}/file              download the mixed WAV
/// ```
pub fn app_routes() -> Router<AppState> {
    Router::new()
        .route("/websocket", get(ws::ws_handler))
        .nest("/api/arrangements", arrangements::router())
}
