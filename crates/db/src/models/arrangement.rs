//! Arrangement entity model and DTOs.

use harmonia_core::types::{DbId, OwnerId, Timestamp};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::status::{ArrangementStatus, StatusId};

/// A row from the `arrangements` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Arrangement {
    pub id: DbId,
    pub owner_id: OwnerId,
    pub name: String,
    pub bpm: f64,
    pub tags: String,
    pub status_id: StatusId,
    /// Blob name of the mixed output; set only when COMPLETED.
    pub asset_ref: Option<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Arrangement {
    /// Typed status. Rows are constrained to seeded ids, so an unknown id
    /// is reported as `Failed`.
    pub fn status(&self) -> ArrangementStatus {
        ArrangementStatus::from_id(self.status_id).unwrap_or(ArrangementStatus::Failed)
    }
}

/// DTO for inserting a new arrangement. Status always starts at PENDING.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateArrangement {
    pub owner_id: OwnerId,
    pub name: String,
    pub bpm: f64,
    pub tags: String,
}

/// Filters for listing one owner's arrangements.
#[derive(Debug, Clone, Default)]
pub struct ArrangementListQuery {
    /// Every term must match name or tags (case-insensitive substring).
    pub search_terms: Vec<String>,
    /// Restrict to these statuses; empty means all.
    pub statuses: Vec<ArrangementStatus>,
    pub limit: i64,
    pub offset: i64,
}

/// One page of arrangements plus the total match count.
#[derive(Debug, Clone)]
pub struct ArrangementPage {
    pub items: Vec<Arrangement>,
    pub total: i64,
}
