//! Error types for the `wayfarer-world` crate.
//!
//! All fallible operations in this crate return [`WorldError`] through the
//! standard [`Result`] type alias.

/// Errors that can occur while loading map data or planning a route.
#[derive(Debug, thiserror::Error)]
pub enum WorldError {
    /// The requested target cannot be entered by the requesting faction.
    #[error("invalid target: {reason}")]
    InvalidTarget {
        /// Human-readable reason from the region validator.
        reason: String,
    },

    /// A start or target coordinate is not a finite number.
    #[error("invalid coordinates ({x}, {y})")]
    InvalidCoordinates {
        /// Horizontal coordinate as received.
        x: f64,
        /// Vertical coordinate as received.
        y: f64,
    },

    /// No path node is reachable from the start or the target.
    #[error("no path network near the start or the target")]
    NoPathNetwork,

    /// The path graph has no connection between start and target.
    #[error("no route between start and target")]
    NoRoute,

    /// The raw map document could not be parsed.
    #[error("map data is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}
