//! Route definitions for the `/api/arrangements` resource.

use axum::extract::DefaultBodyLimit;
use axum::routing::get;
use axum::Router;
use harmonia_core::arrangement::MAX_SOURCE_BYTES;

use crate::handlers::arrangements;
use crate::state::AppState;

/// Room for the multipart framing and text fields around the upload.
const FORM_OVERHEAD_BYTES: usize = 64 * 1024;

/// Routes mounted at `/api/arrangements`.
///
/// ```text
/// GET    /            -> list
/// POST   /            -> create (multipart)
/// GET    /{id}        -> get_by_id
/// PATCH  /{id}        -> rename
/// DELETE /{id}        -> delete
/// GET    /{id}/file   -> download
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/",
            get(arrangements::list)
                .post(arrangements::create)
                .layer(DefaultBodyLimit::max(MAX_SOURCE_BYTES + FORM_OVERHEAD_BYTES)),
        )
        .route(
            "/{id}",
            get(arrangements::get_by_id)
                .patch(arrangements::rename)
                .delete(arrangements::delete),
        )
        .route("/{id}/file", get(arrangements::download))
}
