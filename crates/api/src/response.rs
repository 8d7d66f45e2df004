//! Shared response bodies for API handlers.

use harmonia_core::realtime::STATUS_SUCCESS;
use harmonia_core::types::DbId;
use serde::Serialize;

/// `{ "status": ..., "message": ... }` acknowledgement, with the new
/// record's `id` on creation.
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub status: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<DbId>,
}

impl StatusResponse {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            status: STATUS_SUCCESS,
            message: message.into(),
            id: None,
        }
    }

    pub fn with_id(mut self, id: DbId) -> Self {
        self.id = Some(id);
        self
    }
}
