//! Actor positions, factions, and speed effects.

use sqlx::PgPool;
use uuid::Uuid;
use wayfarer_types::{ActorId, Faction, Point};

use crate::error::DbError;

/// A row from the `actors` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ActorRow {
    /// Actor id.
    pub id: Uuid,
    /// Faction name.
    pub faction: String,
    /// Horizontal position.
    pub pos_x: f64,
    /// Vertical position.
    pub pos_y: f64,
}

impl ActorRow {
    /// The persisted position.
    pub const fn position(&self) -> Point {
        Point::new(self.pos_x, self.pos_y)
    }
}

/// Operations on `actors` and `actor_speed_effects`.
pub struct ActorRepo<'a> {
    pool: &'a PgPool,
}

impl<'a> ActorRepo<'a> {
    /// Create a repo bound to a connection pool.
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Insert or replace an actor.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Postgres`] if the write fails.
    pub async fn upsert(&self, actor: ActorId, position: Point, faction: &Faction) -> Result<(), DbError> {
        sqlx::query(
            r"INSERT INTO actors (id, faction, pos_x, pos_y)
              VALUES ($1, $2, $3, $4)
              ON CONFLICT (id) DO UPDATE
              SET faction = EXCLUDED.faction, pos_x = EXCLUDED.pos_x, pos_y = EXCLUDED.pos_y, updated_at = now()",
        )
        .bind(actor.into_inner())
        .bind(faction.as_str())
        .bind(position.x)
        .bind(position.y)
        .execute(self.pool)
        .await?;
        Ok(())
    }

    /// Load an actor.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Postgres`] if the query fails.
    pub async fn get(&self, actor: ActorId) -> Result<Option<ActorRow>, DbError> {
        let row = sqlx::query_as::<_, ActorRow>("SELECT id, faction, pos_x, pos_y FROM actors WHERE id = $1")
            .bind(actor.into_inner())
            .fetch_optional(self.pool)
            .await?;
        Ok(row)
    }

    /// Persist a position.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Postgres`] if the update fails.
    pub async fn set_position(&self, actor: ActorId, position: Point) -> Result<(), DbError> {
        sqlx::query("UPDATE actors SET pos_x = $2, pos_y = $3, updated_at = now() WHERE id = $1")
            .bind(actor.into_inner())
            .bind(position.x)
            .bind(position.y)
            .execute(self.pool)
            .await?;
        Ok(())
    }

    /// Sum of the actor's unexpired speed effects (equipment and timed
    /// effects alike). No effects is `0.0`.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Postgres`] if the query fails.
    pub async fn speed_modifier(&self, actor: ActorId) -> Result<f64, DbError> {
        let total: f64 = sqlx::query_scalar(
            r"SELECT COALESCE(SUM(modifier), 0)::DOUBLE PRECISION
              FROM actor_speed_effects
              WHERE actor_id = $1 AND (expires_at IS NULL OR expires_at > now())",
        )
        .bind(actor.into_inner())
        .fetch_one(self.pool)
        .await?;
        Ok(total)
    }

    /// Add a speed effect. `expires_in_secs` of `None` lasts until removed.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Postgres`] if the insert fails.
    pub async fn add_speed_effect(
        &self,
        actor: ActorId,
        source: &str,
        modifier: f64,
        expires_in_secs: Option<i64>,
    ) -> Result<(), DbError> {
        sqlx::query(
            r"INSERT INTO actor_speed_effects (actor_id, source, modifier, expires_at)
              VALUES ($1, $2, $3, CASE WHEN $4::BIGINT IS NULL THEN NULL
                                       ELSE now() + make_interval(secs => $4::BIGINT) END)",
        )
        .bind(actor.into_inner())
        .bind(source)
        .bind(modifier)
        .bind(expires_in_secs)
        .execute(self.pool)
        .await?;
        Ok(())
    }
}
