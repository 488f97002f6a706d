//! Durable walker records (`walkers` table).
//!
//! At most one row per actor has status `walking`; a partial unique index
//! enforces it. Progress writes are conditional on the row still walking,
//! so a tick that loaded a superseded walker cannot move it.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use sqlx::types::Json;
use uuid::Uuid;
use wayfarer_types::{ActorId, CollectionTarget, Point, SpawnId, Walker, WalkerId, WalkerStatus};

use crate::error::DbError;

const WALKER_COLUMNS: &str = "id, actor_id, positions, current_index, status, collection_spawn_id, \
     collection_x, collection_y, started_at, updated_at, finished_at";

/// A row from the `walkers` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct WalkerRow {
    /// Walker id.
    pub id: Uuid,
    /// Owning actor.
    pub actor_id: Uuid,
    /// Route positions.
    pub positions: Json<Vec<Point>>,
    /// Progress index.
    pub current_index: i32,
    /// Lifecycle status as stored.
    pub status: String,
    /// Collectible to claim on arrival.
    pub collection_spawn_id: Option<Uuid>,
    /// Collectible x coordinate.
    pub collection_x: Option<f64>,
    /// Collectible y coordinate.
    pub collection_y: Option<f64>,
    /// Creation time.
    pub started_at: DateTime<Utc>,
    /// Last write time.
    pub updated_at: DateTime<Utc>,
    /// Terminal transition time.
    pub finished_at: Option<DateTime<Utc>>,
}

impl TryFrom<WalkerRow> for Walker {
    type Error = DbError;

    fn try_from(row: WalkerRow) -> Result<Self, Self::Error> {
        let status = WalkerStatus::parse(&row.status)
            .ok_or_else(|| DbError::corrupt(format!("walker {}", row.id), format!("unknown status {}", row.status)))?;
        let current_index = usize::try_from(row.current_index)
            .map_err(|e| DbError::corrupt(format!("walker {}", row.id), e.to_string()))?;
        let collection = match (row.collection_spawn_id, row.collection_x, row.collection_y) {
            (Some(spawn), Some(x), Some(y)) => Some(CollectionTarget {
                spawn_id: SpawnId::from(spawn),
                position: Point::new(x, y),
            }),
            _ => None,
        };
        Ok(Self {
            walker_id: WalkerId::from(row.id),
            actor_id: ActorId::from(row.actor_id),
            positions: row.positions.0,
            current_index,
            status,
            collection,
            started_at: row.started_at,
            updated_at: row.updated_at,
            finished_at: row.finished_at,
        })
    }
}

fn db_index(index: usize) -> Result<i32, DbError> {
    i32::try_from(index).map_err(|e| DbError::corrupt("walker index", e.to_string()))
}

fn into_walkers(rows: Vec<WalkerRow>) -> Result<Vec<Walker>, DbError> {
    rows.into_iter().map(Walker::try_from).collect()
}

/// Operations on the `walkers` table.
pub struct WalkerRepo<'a> {
    pool: &'a PgPool,
}

impl<'a> WalkerRepo<'a> {
    /// Create a repo bound to a connection pool.
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Interrupt the actor's walking row and insert `walker` in one
    /// transaction. Returns the interrupted ids.
    ///
    /// The actor row is locked first so concurrent requests for the same
    /// actor serialize instead of tripping the unique index.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Postgres`] if any statement fails; nothing is
    /// written in that case.
    pub async fn begin_walk(&self, walker: &Walker) -> Result<Vec<WalkerId>, DbError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("SELECT id FROM actors WHERE id = $1 FOR UPDATE")
            .bind(walker.actor_id.into_inner())
            .fetch_optional(&mut *tx)
            .await?;

        let interrupted: Vec<Uuid> = sqlx::query_scalar(
            r"UPDATE walkers
              SET status = 'interrupted_by_new_walk', updated_at = $2, finished_at = $2
              WHERE actor_id = $1 AND status = 'walking'
              RETURNING id",
        )
        .bind(walker.actor_id.into_inner())
        .bind(walker.started_at)
        .fetch_all(&mut *tx)
        .await?;

        let collection = walker.collection;
        sqlx::query(
            r"INSERT INTO walkers (id, actor_id, positions, current_index, status, collection_spawn_id,
                                   collection_x, collection_y, started_at, updated_at, finished_at)
              VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)",
        )
        .bind(walker.walker_id.into_inner())
        .bind(walker.actor_id.into_inner())
        .bind(Json(&walker.positions))
        .bind(db_index(walker.current_index)?)
        .bind(walker.status.as_str())
        .bind(collection.map(|c| c.spawn_id.into_inner()))
        .bind(collection.map(|c| c.position.x))
        .bind(collection.map(|c| c.position.y))
        .bind(walker.started_at)
        .bind(walker.updated_at)
        .bind(walker.finished_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        tracing::debug!(
            walker = %walker.walker_id,
            actor = %walker.actor_id,
            interrupted = interrupted.len(),
            "Inserted walker"
        );
        Ok(interrupted.into_iter().map(WalkerId::from).collect())
    }

    /// Interrupt the actor's walking row without replacing it.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Postgres`] if the update fails.
    pub async fn interrupt(&self, actor: ActorId, at: DateTime<Utc>) -> Result<Vec<WalkerId>, DbError> {
        let ids: Vec<Uuid> = sqlx::query_scalar(
            r"UPDATE walkers
              SET status = 'interrupted_by_new_walk', updated_at = $2, finished_at = $2
              WHERE actor_id = $1 AND status = 'walking'
              RETURNING id",
        )
        .bind(actor.into_inner())
        .bind(at)
        .fetch_all(self.pool)
        .await?;
        Ok(ids.into_iter().map(WalkerId::from).collect())
    }

    /// Every walking row.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the query fails or a row is corrupt.
    pub async fn active(&self) -> Result<Vec<Walker>, DbError> {
        let rows = sqlx::query_as::<_, WalkerRow>(&format!(
            "SELECT {WALKER_COLUMNS} FROM walkers WHERE status = 'walking' ORDER BY started_at"
        ))
        .fetch_all(self.pool)
        .await?;
        into_walkers(rows)
    }

    /// The actor's walking row, if any.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the query fails or the row is corrupt.
    pub async fn active_for(&self, actor: ActorId) -> Result<Option<Walker>, DbError> {
        let row = sqlx::query_as::<_, WalkerRow>(&format!(
            "SELECT {WALKER_COLUMNS} FROM walkers WHERE actor_id = $1 AND status = 'walking'"
        ))
        .bind(actor.into_inner())
        .fetch_optional(self.pool)
        .await?;
        row.map(Walker::try_from).transpose()
    }

    /// Load one walker regardless of status.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the query fails or the row is corrupt.
    pub async fn get(&self, walker: WalkerId) -> Result<Option<Walker>, DbError> {
        let row = sqlx::query_as::<_, WalkerRow>(&format!("SELECT {WALKER_COLUMNS} FROM walkers WHERE id = $1"))
            .bind(walker.into_inner())
            .fetch_optional(self.pool)
            .await?;
        row.map(Walker::try_from).transpose()
    }

    /// Raise a walking row's index to `index`. Returns `false` when the row
    /// is no longer walking.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Postgres`] if the update fails.
    pub async fn advance(&self, walker: WalkerId, index: usize, at: DateTime<Utc>) -> Result<bool, DbError> {
        let result = sqlx::query(
            r"UPDATE walkers
              SET current_index = GREATEST(current_index, $2), updated_at = $3
              WHERE id = $1 AND status = 'walking'",
        )
        .bind(walker.into_inner())
        .bind(db_index(index)?)
        .bind(at)
        .execute(self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    /// Mark a walking row `done` and move its actor to `position` in one
    /// transaction. Returns `false`, changing nothing, when the row is no
    /// longer walking.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Postgres`] if either update fails; neither is
    /// applied then.
    pub async fn finish(
        &self,
        walker: WalkerId,
        index: usize,
        position: Point,
        at: DateTime<Utc>,
    ) -> Result<bool, DbError> {
        let mut tx = self.pool.begin().await?;

        let actor: Option<Uuid> = sqlx::query_scalar(
            r"UPDATE walkers
              SET current_index = GREATEST(current_index, $2), status = 'done',
                  updated_at = $3, finished_at = $3
              WHERE id = $1 AND status = 'walking'
              RETURNING actor_id",
        )
        .bind(walker.into_inner())
        .bind(db_index(index)?)
        .bind(at)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(actor) = actor else {
            tx.rollback().await?;
            return Ok(false);
        };

        sqlx::query("UPDATE actors SET pos_x = $2, pos_y = $3, updated_at = $4 WHERE id = $1")
            .bind(actor)
            .bind(position.x)
            .bind(position.y)
            .bind(at)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(true)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn row(status: &str) -> WalkerRow {
        let now = Utc::now();
        WalkerRow {
            id: Uuid::now_v7(),
            actor_id: Uuid::now_v7(),
            positions: Json(vec![Point::new(0.0, 0.0), Point::new(25.0, 0.0)]),
            current_index: 1,
            status: status.to_owned(),
            collection_spawn_id: Some(Uuid::now_v7()),
            collection_x: Some(25.0),
            collection_y: Some(0.0),
            started_at: now,
            updated_at: now,
            finished_at: None,
        }
    }

    #[test]
    fn row_converts_to_walker() {
        let walker = Walker::try_from(row("walking")).unwrap();
        assert_eq!(walker.status, WalkerStatus::Walking);
        assert_eq!(walker.current_index, 1);
        assert_eq!(walker.collection.unwrap().position, Point::new(25.0, 0.0));
    }

    #[test]
    fn partial_collection_columns_mean_no_target() {
        let mut r = row("done");
        r.collection_y = None;
        assert!(Walker::try_from(r).unwrap().collection.is_none());
    }

    #[test]
    fn unknown_status_is_corrupt() {
        assert!(matches!(Walker::try_from(row("teleporting")), Err(DbError::Corrupt { .. })));
    }

    #[test]
    fn negative_index_is_corrupt() {
        let mut r = row("walking");
        r.current_index = -1;
        assert!(matches!(Walker::try_from(r), Err(DbError::Corrupt { .. })));
    }
}
