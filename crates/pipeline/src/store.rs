//! Job-record seam used by the worker.

use async_trait::async_trait;
use harmonia_core::types::DbId;
use harmonia_db::models::arrangement::Arrangement;
use harmonia_db::models::status::ArrangementStatus;
use harmonia_db::repositories::ArrangementRepo;
use harmonia_db::DbPool;

/// Keyed read and guarded status writes for arrangements.
#[async_trait]
pub trait ArrangementStore: Send + Sync {
    async fn find(&self, id: DbId) -> Result<Option<Arrangement>, sqlx::Error>;

    /// Move `id` to `to` if its current status allows it.
    ///
    /// Returns the updated record, or `None` when the arrangement is gone
    /// or the transition is not legal from its current status.
    async fn transition(
        &self,
        id: DbId,
        to: ArrangementStatus,
        asset_ref: Option<&str>,
    ) -> Result<Option<Arrangement>, sqlx::Error>;
}

/// [`ArrangementStore`] over the Postgres `arrangements` table.
#[derive(Clone)]
pub struct PgArrangementStore {
    pool: DbPool,
}

impl PgArrangementStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ArrangementStore for PgArrangementStore {
    async fn find(&self, id: DbId) -> Result<Option<Arrangement>, sqlx::Error> {
        ArrangementRepo::find_by_id(&self.pool, id).await
    }

    async fn transition(
        &self,
        id: DbId,
        to: ArrangementStatus,
        asset_ref: Option<&str>,
    ) -> Result<Option<Arrangement>, sqlx::Error> {
        ArrangementRepo::transition(&self.pool, id, to, asset_ref).await
    }
}
