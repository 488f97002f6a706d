//! Enumeration types for the Wayfarer movement engine.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

// ---------------------------------------------------------------------------
// Walker lifecycle
// ---------------------------------------------------------------------------

/// Lifecycle status of a walker record.
///
/// A walker is created as [`WalkerStatus::Walking`] (the [`WalkerStatus::New`]
/// state exists for records staged before activation). It ends either
/// [`WalkerStatus::Done`] on arrival or
/// [`WalkerStatus::InterruptedByNewWalk`] when superseded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export, export_to = "bindings/")]
pub enum WalkerStatus {
    /// Staged but not yet advanced by the scheduler.
    New,
    /// In flight; advanced every tick.
    Walking,
    /// Reached the final position.
    Done,
    /// Superseded by a newer movement request for the same actor.
    InterruptedByNewWalk,
}

impl WalkerStatus {
    /// The storage representation used in the `walkers.status` column.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Walking => "walking",
            Self::Done => "done",
            Self::InterruptedByNewWalk => "interrupted_by_new_walk",
        }
    }

    /// Parse the storage representation. Returns `None` for unknown values.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "new" => Some(Self::New),
            "walking" => Some(Self::Walking),
            "done" => Some(Self::Done),
            "interrupted_by_new_walk" => Some(Self::InterruptedByNewWalk),
            _ => None,
        }
    }

    /// Whether the walker has reached a terminal state.
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::InterruptedByNewWalk)
    }
}

impl core::fmt::Display for WalkerStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Regions
// ---------------------------------------------------------------------------

/// Region type as authored in the map editor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export, export_to = "bindings/")]
pub enum RegionKind {
    /// Ownership and walkability rules apply.
    #[default]
    Standard,
    /// Always enterable, regardless of owner or walkable flag.
    FreeTravel,
}

// ---------------------------------------------------------------------------
// Collection
// ---------------------------------------------------------------------------

/// Why a collection attempt at the end of a walk did not yield rewards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export, export_to = "bindings/")]
pub enum CollectionFailure {
    /// Another actor claimed the collectible first.
    AlreadyCollected,
    /// The walk ended outside the pickup radius.
    OutOfRange,
    /// The collectible no longer exists.
    Missing,
}

impl CollectionFailure {
    /// Human-readable reason shown to the player.
    pub const fn message(self) -> &'static str {
        match self {
            Self::AlreadyCollected => "someone else collected it first",
            Self::OutOfRange => "too far away to pick it up",
            Self::Missing => "there is nothing here to collect",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn walker_status_storage_roundtrip() {
        for status in [
            WalkerStatus::New,
            WalkerStatus::Walking,
            WalkerStatus::Done,
            WalkerStatus::InterruptedByNewWalk,
        ] {
            assert_eq!(WalkerStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(WalkerStatus::parse("flying"), None);
    }

    #[test]
    fn walker_status_serializes_snake_case() {
        let json = serde_json::to_string(&WalkerStatus::InterruptedByNewWalk).ok();
        assert_eq!(json.as_deref(), Some("\"interrupted_by_new_walk\""));
    }

    #[test]
    fn terminal_states() {
        assert!(!WalkerStatus::Walking.is_terminal());
        assert!(WalkerStatus::Done.is_terminal());
        assert!(WalkerStatus::InterruptedByNewWalk.is_terminal());
    }

    #[test]
    fn region_kind_defaults_to_standard() {
        assert_eq!(RegionKind::default(), RegionKind::Standard);
    }
}
