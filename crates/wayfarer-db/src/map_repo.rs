//! Authored map features (`map_regions`, `map_walls`, `map_paths`).
//!
//! Rows are returned in the editor's raw shape so the world crate applies
//! the same normalization whether the map comes from a file or from here.

use sqlx::PgPool;
use wayfarer_world::RawMap;
use wayfarer_world::snapshot::{RawPath, RawPoint, RawRegion, RawWall};

use crate::error::DbError;

#[derive(Debug, sqlx::FromRow)]
struct RegionRow {
    id: String,
    name: String,
    owner: Option<String>,
    walkable: bool,
    kind: Option<String>,
    polygon: serde_json::Value,
}

#[derive(Debug, sqlx::FromRow)]
struct PolylineRow {
    id: String,
    name: String,
    points: serde_json::Value,
    is_loop: bool,
}

/// Decode a JSONB point list. Unreadable lists become empty so the feature
/// is skipped by normalization with a reason instead of failing the load.
fn points(kind: &str, id: &str, value: serde_json::Value) -> Vec<RawPoint> {
    serde_json::from_value(value).unwrap_or_else(|e| {
        tracing::warn!(kind, id, error = %e, "unreadable map feature geometry");
        Vec::new()
    })
}

/// Operations on the map feature tables.
pub struct MapRepo<'a> {
    pool: &'a PgPool,
}

impl<'a> MapRepo<'a> {
    /// Create a repo bound to a connection pool.
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Load every feature in authoring order.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Postgres`] if a query fails.
    pub async fn load(&self) -> Result<RawMap, DbError> {
        let regions = sqlx::query_as::<_, RegionRow>(
            "SELECT id, name, owner, walkable, kind, polygon FROM map_regions ORDER BY sort_order, id",
        )
        .fetch_all(self.pool)
        .await?;
        let walls = sqlx::query_as::<_, PolylineRow>(
            "SELECT id, name, points, FALSE AS is_loop FROM map_walls ORDER BY sort_order, id",
        )
        .fetch_all(self.pool)
        .await?;
        let paths = sqlx::query_as::<_, PolylineRow>(
            "SELECT id, name, points, is_loop FROM map_paths ORDER BY sort_order, id",
        )
        .fetch_all(self.pool)
        .await?;

        tracing::debug!(
            regions = regions.len(),
            walls = walls.len(),
            paths = paths.len(),
            "Loaded map features"
        );

        Ok(RawMap {
            regions: regions
                .into_iter()
                .map(|r| RawRegion {
                    polygon: points("region", &r.id, r.polygon),
                    id: r.id,
                    name: r.name,
                    owner: r.owner,
                    walkable: r.walkable,
                    kind: r.kind,
                })
                .collect(),
            walls: walls
                .into_iter()
                .map(|w| RawWall {
                    points: points("wall", &w.id, w.points),
                    id: w.id,
                    name: w.name,
                })
                .collect(),
            paths: paths
                .into_iter()
                .map(|p| RawPath {
                    points: points("path", &p.id, p.points),
                    id: p.id,
                    name: p.name,
                    is_loop: p.is_loop,
                })
                .collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn both_point_encodings_decode() {
        let value = serde_json::json!([[1.0, 2.0], {"x": 3.0, "y": 4.0}]);
        assert_eq!(points("path", "p1", value).len(), 2);
    }

    #[test]
    fn unreadable_geometry_becomes_empty() {
        let value = serde_json::json!({"not": "a list"});
        assert!(points("region", "r1", value).is_empty());
    }
}
