//! Bearer-credential authentication extractor for Axum handlers.

use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use harmonia_core::error::CoreError;
use harmonia_core::types::OwnerId;

use crate::error::AppError;
use crate::state::AppState;

/// Owner resolved from the `Authorization: Bearer <credential>` header.
///
/// Add as a handler parameter to require authentication:
///
/// ```ignore
/// async fn my_handler(user: AuthUser) -> AppResult<Json<()>> {
///     tracing::info!(owner_id = user.owner_id, "handling request");
///     Ok(Json(()))
/// }
/// ```
#[derive(Debug, Clone, Copy)]
pub struct AuthUser {
    pub owner_id: OwnerId,
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let credential = bearer_credential(parts)?;
        let owner_id = state.identity.resolve(credential).await?;
        Ok(AuthUser { owner_id })
    }
}

fn bearer_credential(parts: &Parts) -> Result<&str, AppError> {
    let header = parts
        .headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| {
            AppError::Core(CoreError::Unauthorized(
                "Missing or invalid Authorization header".into(),
            ))
        })?;

    header
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .ok_or_else(|| {
            AppError::Core(CoreError::Unauthorized(
                "Missing or invalid Authorization header".into(),
            ))
        })
}
