//! Where the static map comes from.
//!
//! The map is loaded once at startup and again on every reload trigger.
//! A configured `movement.map_file` wins; otherwise the map tables in
//! `PostgreSQL` are used; with neither, the map is empty.

use std::path::PathBuf;

use tracing::info;
use wayfarer_db::{MapRepo, PostgresPool};
use wayfarer_world::{LoadReport, MapSnapshot};

use crate::error::EngineError;

/// Source of map snapshots.
pub enum MapSource {
    /// A JSON editor export on disk.
    File(PathBuf),
    /// The `map_*` tables.
    Database(PostgresPool),
    /// No map data; every target is valid and every line is clear.
    Empty,
}

impl MapSource {
    /// Pick a source from configuration and available infrastructure.
    pub fn select(map_file: Option<&str>, pg: Option<&PostgresPool>) -> Self {
        match (map_file, pg) {
            (Some(path), _) => Self::File(PathBuf::from(path)),
            (None, Some(pg)) => Self::Database(pg.clone()),
            (None, None) => Self::Empty,
        }
    }

    /// Short label for logs and replies.
    pub const fn label(&self) -> &'static str {
        match self {
            Self::File(_) => "file",
            Self::Database(_) => "database",
            Self::Empty => "empty",
        }
    }

    /// Load and normalize a fresh snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::MapFile`] or [`EngineError::World`] for an
    /// unreadable file and [`EngineError::Db`] when the tables cannot be
    /// queried. Malformed individual features are skipped, not errors.
    pub async fn load(&self) -> Result<(MapSnapshot, LoadReport), EngineError> {
        let (snapshot, report) = match self {
            Self::File(path) => {
                let json = tokio::fs::read_to_string(path).await.map_err(|source| EngineError::MapFile {
                    path: path.display().to_string(),
                    source,
                })?;
                MapSnapshot::from_json(&json)?
            }
            Self::Database(pg) => MapSnapshot::from_raw(MapRepo::new(pg.pool()).load().await?),
            Self::Empty => (MapSnapshot::empty(), LoadReport::default()),
        };

        info!(
            source = self.label(),
            version = snapshot.version(),
            regions = report.regions,
            walls = report.walls,
            paths = report.paths,
            skipped = report.skipped.len(),
            "Map loaded"
        );
        Ok((snapshot, report))
    }
}
