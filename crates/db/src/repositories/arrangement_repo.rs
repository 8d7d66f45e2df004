//! Repository for the `arrangements` table.
//!
//! Status changes go through [`ArrangementRepo::transition`], which only
//! updates rows whose current status is a legal predecessor of the target.
//! A terminal row can therefore never be overwritten, and `asset_ref` is
//! written in the same statement as `COMPLETED`.

use harmonia_core::types::{DbId, OwnerId};
use sqlx::PgPool;

use crate::models::arrangement::{
    Arrangement, ArrangementListQuery, ArrangementPage, CreateArrangement,
};
use crate::models::status::{ArrangementStatus, StatusId};

/// Column list for `arrangements` queries.
const COLUMNS: &str = "\
    id, owner_id, name, bpm, tags, status_id, asset_ref, created_at, updated_at";

/// Provides CRUD operations and guarded status transitions for arrangements.
pub struct ArrangementRepo;

impl ArrangementRepo {
    /// Insert a new PENDING arrangement and return the row.
    pub async fn create(pool: &PgPool, input: &CreateArrangement) -> Result<Arrangement, sqlx::Error> {
        let query = format!(
            "INSERT INTO arrangements (owner_id, name, bpm, tags, status_id) \
             VALUES ($1, $2, $3, $4, $5) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Arrangement>(&query)
            .bind(input.owner_id)
            .bind(&input.name)
            .bind(input.bpm)
            .bind(&input.tags)
            .bind(ArrangementStatus::Pending.id())
            .fetch_one(pool)
            .await
    }

    /// Find an arrangement by its ID.
    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<Arrangement>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM arrangements WHERE id = $1");
        sqlx::query_as::<_, Arrangement>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Move an arrangement to `to`, recording `asset_ref` alongside.
    ///
    /// Returns the updated row, or `None` if the arrangement does not exist
    /// or its current status is not a legal predecessor of `to`. The caller
    /// supplies `asset_ref` only for `COMPLETED`; the table constraint
    /// rejects any other combination.
    pub async fn transition(
        pool: &PgPool,
        id: DbId,
        to: ArrangementStatus,
        asset_ref: Option<&str>,
    ) -> Result<Option<Arrangement>, sqlx::Error> {
        let allowed: Vec<StatusId> = to.predecessors().iter().map(|s| s.id()).collect();
        let query = format!(
            "UPDATE arrangements \
             SET status_id = $2, asset_ref = $3 \
             WHERE id = $1 AND status_id = ANY($4) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Arrangement>(&query)
            .bind(id)
            .bind(to.id())
            .bind(asset_ref)
            .bind(&allowed)
            .fetch_optional(pool)
            .await
    }

    /// Rename an arrangement. Returns the updated row, if it exists.
    pub async fn rename(pool: &PgPool, id: DbId, name: &str) -> Result<Option<Arrangement>, sqlx::Error> {
        let query = format!(
            "UPDATE arrangements SET name = $2 WHERE id = $1 RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Arrangement>(&query)
            .bind(id)
            .bind(name)
            .fetch_optional(pool)
            .await
    }

    /// Delete an arrangement. Returns `true` if a row was removed.
    pub async fn delete(pool: &PgPool, id: DbId) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM arrangements WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// List one owner's arrangements, newest first, with search and
    /// status filters applied.
    pub async fn list_by_owner(
        pool: &PgPool,
        owner_id: OwnerId,
        params: &ArrangementListQuery,
    ) -> Result<ArrangementPage, sqlx::Error> {
        // Build the WHERE clause and track the next bind parameter index.
        let mut conditions: Vec<String> = vec!["owner_id = $1".to_string()];
        let mut bind_idx: u32 = 2;

        let patterns: Vec<String> = params.search_terms.iter().map(|t| like_pattern(t)).collect();
        for _ in &patterns {
            conditions.push(format!(
                "(name ILIKE ${bind_idx} ESCAPE '\\' OR tags ILIKE ${bind_idx} ESCAPE '\\')"
            ));
            bind_idx += 1;
        }

        let status_ids: Vec<StatusId> = params.statuses.iter().map(|s| s.id()).collect();
        if !status_ids.is_empty() {
            conditions.push(format!("status_id = ANY(${bind_idx})"));
            bind_idx += 1;
        }

        let where_clause = format!("WHERE {}", conditions.join(" AND "));

        let count_query = format!("SELECT COUNT(*) FROM arrangements {where_clause}");
        let mut count_q = sqlx::query_scalar::<_, i64>(&count_query).bind(owner_id);
        for pattern in &patterns {
            count_q = count_q.bind(pattern);
        }
        if !status_ids.is_empty() {
            count_q = count_q.bind(&status_ids);
        }
        let total = count_q.fetch_one(pool).await?;

        let query = format!(
            "SELECT {COLUMNS} FROM arrangements \
             {where_clause} \
             ORDER BY created_at DESC, id DESC \
             LIMIT ${bind_idx} OFFSET ${}",
            bind_idx + 1,
        );
        let mut q = sqlx::query_as::<_, Arrangement>(&query).bind(owner_id);
        for pattern in &patterns {
            q = q.bind(pattern);
        }
        if !status_ids.is_empty() {
            q = q.bind(&status_ids);
        }
        let items = q
            .bind(params.limit)
            .bind(params.offset)
            .fetch_all(pool)
            .await?;

        Ok(ArrangementPage { items, total })
    }
}

/// Wrap a search term in `%...%`, escaping LIKE metacharacters.
fn like_pattern(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len() + 2);
    escaped.push('%');
    for c in term.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push('%');
    escaped
}
