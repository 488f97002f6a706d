//! Error types for the engine binary.
//!
//! [`EngineError`] wraps every failure mode of engine startup so `main`
//! can propagate with `?`.

/// Top-level error for the engine binary.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Configuration loading failed.
    #[error("config error: {source}")]
    Config {
        /// The underlying config error.
        #[from]
        source: wayfarer_core::config::ConfigError,
    },

    /// Connecting to or migrating a data store failed.
    #[error("database error: {source}")]
    Db {
        /// The underlying data layer error.
        #[from]
        source: wayfarer_db::DbError,
    },

    /// The map could not be parsed.
    #[error("map error: {source}")]
    World {
        /// The underlying world error.
        #[from]
        source: wayfarer_world::WorldError,
    },

    /// The map file could not be read.
    #[error("failed to read map file {path}: {source}")]
    MapFile {
        /// The configured path.
        path: String,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// NATS connection or messaging failed.
    #[error("NATS error: {message}")]
    Nats {
        /// Description of the NATS failure.
        message: String,
    },

    /// Invalid command-line arguments.
    #[error("usage error: {message}")]
    Usage {
        /// What was wrong.
        message: String,
    },
}
