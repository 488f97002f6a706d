//! Collectible spawns and their one-time claims.
//!
//! A claim is a single conditional `UPDATE`: of any number of concurrent
//! claimers exactly one sees a row affected.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use sqlx::types::Json;
use uuid::Uuid;
use wayfarer_types::{ActorId, Collectible, Faction, Point, RewardItem, SpawnId};

use crate::error::DbError;

/// A row from the `collectibles` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct CollectibleRow {
    /// Spawn id.
    pub spawn_id: Uuid,
    /// Horizontal position.
    pub pos_x: f64,
    /// Vertical position.
    pub pos_y: f64,
    /// Restricting faction, `NULL` for neutral spawns.
    pub faction: Option<String>,
    /// Claim time.
    pub claimed_at: Option<DateTime<Utc>>,
    /// Claiming actor.
    pub claimed_by: Option<Uuid>,
}

impl From<CollectibleRow> for Collectible {
    fn from(row: CollectibleRow) -> Self {
        Self {
            spawn_id: SpawnId::from(row.spawn_id),
            position: Point::new(row.pos_x, row.pos_y),
            faction: row.faction.map(Faction),
            claimed_at: row.claimed_at,
            claimed_by: row.claimed_by.map(ActorId::from),
        }
    }
}

/// Operations on the `collectibles` table.
pub struct CollectibleRepo<'a> {
    pool: &'a PgPool,
}

impl<'a> CollectibleRepo<'a> {
    /// Create a repo bound to a connection pool.
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Insert an unclaimed spawn with its rewards.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Postgres`] if the insert fails.
    pub async fn insert(&self, collectible: &Collectible, rewards: &[RewardItem]) -> Result<(), DbError> {
        sqlx::query(
            r"INSERT INTO collectibles (spawn_id, pos_x, pos_y, faction, rewards)
              VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(collectible.spawn_id.into_inner())
        .bind(collectible.position.x)
        .bind(collectible.position.y)
        .bind(collectible.faction.as_ref().map(Faction::as_str))
        .bind(Json(rewards))
        .execute(self.pool)
        .await?;
        Ok(())
    }

    /// Load a spawn.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Postgres`] if the query fails.
    pub async fn get(&self, spawn: SpawnId) -> Result<Option<Collectible>, DbError> {
        let row = sqlx::query_as::<_, CollectibleRow>(
            r"SELECT spawn_id, pos_x, pos_y, faction, claimed_at, claimed_by
              FROM collectibles WHERE spawn_id = $1",
        )
        .bind(spawn.into_inner())
        .fetch_optional(self.pool)
        .await?;
        Ok(row.map(Collectible::from))
    }

    /// Record a claim if nobody holds one yet. Returns `true` for the
    /// single winner.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Postgres`] if the update fails.
    pub async fn try_claim(&self, spawn: SpawnId, actor: ActorId, at: DateTime<Utc>) -> Result<bool, DbError> {
        let result = sqlx::query(
            r"UPDATE collectibles
              SET claimed_at = $3, claimed_by = $2
              WHERE spawn_id = $1 AND claimed_at IS NULL AND claimed_by IS NULL",
        )
        .bind(spawn.into_inner())
        .bind(actor.into_inner())
        .bind(at)
        .execute(self.pool)
        .await?;
        let won = result.rows_affected() == 1;
        tracing::debug!(spawn = %spawn, actor = %actor, won, "Collectible claim");
        Ok(won)
    }

    /// Rewards configured for a spawn. An unknown spawn yields nothing.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Postgres`] if the query fails.
    pub async fn rewards(&self, spawn: SpawnId) -> Result<Vec<RewardItem>, DbError> {
        let rewards: Option<Json<Vec<RewardItem>>> =
            sqlx::query_scalar("SELECT rewards FROM collectibles WHERE spawn_id = $1")
                .bind(spawn.into_inner())
                .fetch_optional(self.pool)
                .await?;
        Ok(rewards.map(|r| r.0).unwrap_or_default())
    }
}
