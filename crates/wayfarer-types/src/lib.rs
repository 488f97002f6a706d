//! Shared type definitions for the Wayfarer movement engine.
//!
//! This crate is the single source of truth for all types used across the
//! Wayfarer workspace. Types defined here flow downstream to `TypeScript`
//! via `ts-rs` for the game client.
//!
//! # Modules
//!
//! - [`ids`] -- Type-safe identifiers (UUID-backed runtime ids, editor keys)
//! - [`enums`] -- Walker status, region kind, collection failure reasons
//! - [`structs`] -- Map features, walkers, collectibles, rewards
//! - [`events`] -- Outbound movement notifications

pub mod enums;
pub mod events;
pub mod ids;
pub mod structs;

// Re-export all public types at crate root for convenience.
pub use enums::{CollectionFailure, RegionKind, WalkerStatus};
pub use events::{MovementEvent, PositionBroadcast, StepNotification};
pub use ids::{ActorId, PathId, RegionId, SpawnId, WalkerId, WallId};
pub use structs::{
    Collectible, CollectionTarget, Faction, Path, Point, Region, RewardItem, Walker, Wall,
};

#[cfg(test)]
mod tests {
    //! `TypeScript` binding generation for client-facing types.

    #[test]
    fn export_bindings() {
        // ts-rs generates TypeScript bindings when types with
        // #[ts(export)] are exported. The files are written to the
        // `bindings/` directory relative to the crate root.
        use ts_rs::TS;

        let _ = crate::ids::ActorId::export_all();
        let _ = crate::ids::WalkerId::export_all();
        let _ = crate::ids::SpawnId::export_all();
        let _ = crate::ids::RegionId::export_all();

        let _ = crate::enums::WalkerStatus::export_all();
        let _ = crate::enums::CollectionFailure::export_all();

        let _ = crate::structs::Point::export_all();
        let _ = crate::structs::Walker::export_all();
        let _ = crate::structs::RewardItem::export_all();

        let _ = crate::events::StepNotification::export_all();
        let _ = crate::events::MovementEvent::export_all();
    }
}
