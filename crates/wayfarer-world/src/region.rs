//! Region rules: may an actor of a given faction stand at a point?

use serde::{Deserialize, Serialize};
use wayfarer_types::{Faction, Point, Region, RegionId, RegionKind};

use crate::geometry::{point_in_polygon, polygon_area};

/// Reason returned when a point lies outside every region.
pub const NO_LAND: &str = "no land here";

/// How to choose among overlapping regions that all contain a point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegionTieBreak {
    /// The first region in snapshot order wins.
    #[default]
    FirstMatch,
    /// The region with the smallest polygon area wins; ties fall back to
    /// snapshot order.
    SmallestArea,
}

/// Outcome of validating a target point.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Validation {
    /// Whether the point may be entered.
    pub allowed: bool,
    /// Why not, when `allowed` is false.
    pub reason: Option<String>,
    /// The region that decided the outcome.
    pub region: Option<RegionId>,
}

impl Validation {
    fn allow(region: Option<&Region>) -> Self {
        Self {
            allowed: true,
            reason: None,
            region: region.map(|r| r.id.clone()),
        }
    }

    fn deny(reason: impl Into<String>, region: Option<&Region>) -> Self {
        Self {
            allowed: false,
            reason: Some(reason.into()),
            region: region.map(|r| r.id.clone()),
        }
    }
}

/// Decides whether a point is enterable.
#[derive(Debug, Clone, Copy, Default)]
pub struct RegionValidator {
    tie_break: RegionTieBreak,
}

impl RegionValidator {
    /// Create a validator with the given overlap rule.
    pub const fn new(tie_break: RegionTieBreak) -> Self {
        Self { tie_break }
    }

    /// The region containing `point`, if any.
    pub fn containing<'a>(&self, regions: &'a [Region], point: Point) -> Option<&'a Region> {
        let mut matches = regions.iter().filter(|r| point_in_polygon(point, &r.polygon));
        match self.tie_break {
            RegionTieBreak::FirstMatch => matches.next(),
            RegionTieBreak::SmallestArea => matches.fold(None, |best: Option<&Region>, r| {
                match best {
                    Some(b) if polygon_area(&b.polygon) <= polygon_area(&r.polygon) => Some(b),
                    _ => Some(r),
                }
            }),
        }
    }

    /// Validate `point` for an actor of `faction`.
    ///
    /// With no regions loaded every point is allowed. Otherwise the
    /// containing region must be free-travel, or walkable and either
    /// unowned or owned by `faction`.
    pub fn validate(&self, regions: &[Region], point: Point, faction: &Faction) -> Validation {
        if regions.is_empty() {
            return Validation::allow(None);
        }

        let Some(region) = self.containing(regions, point) else {
            return Validation::deny(NO_LAND, None);
        };

        if region.kind == RegionKind::FreeTravel {
            return Validation::allow(Some(region));
        }
        if !region.walkable {
            return Validation::deny(
                format!("{} cannot be walked on", display_name(region)),
                Some(region),
            );
        }
        match &region.owner {
            Some(owner) if owner != faction => Validation::deny(
                format!("{} belongs to {owner}", display_name(region)),
                Some(region),
            ),
            _ => Validation::allow(Some(region)),
        }
    }
}

fn display_name(region: &Region) -> &str {
    if region.name.is_empty() {
        region.id.as_str()
    } else {
        &region.name
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn region(id: &str, owner: Option<&str>, walkable: bool, kind: RegionKind, size: f64) -> Region {
        Region {
            id: RegionId::from(id),
            name: String::new(),
            owner: owner.map(Faction::from),
            walkable,
            kind,
            polygon: vec![
                Point::new(0.0, 0.0),
                Point::new(size, 0.0),
                Point::new(size, size),
                Point::new(0.0, size),
            ],
        }
    }

    #[test]
    fn empty_map_allows_everything() {
        let v = RegionValidator::default().validate(&[], Point::new(1.0e6, -3.0), &Faction::from("alpha"));
        assert!(v.allowed);
        assert!(v.reason.is_none());
    }

    #[test]
    fn owner_must_match_faction() {
        let regions = vec![region("r1", Some("alpha"), true, RegionKind::Standard, 100.0)];
        let validator = RegionValidator::default();

        let own = validator.validate(&regions, Point::new(50.0, 50.0), &Faction::from("alpha"));
        assert!(own.allowed);
        assert_eq!(own.region, Some(RegionId::from("r1")));

        let foreign = validator.validate(&regions, Point::new(50.0, 50.0), &Faction::from("beta"));
        assert!(!foreign.allowed);
        assert!(foreign.reason.unwrap().contains("alpha"));
    }

    #[test]
    fn outside_every_region_is_no_land() {
        let regions = vec![region("r1", None, true, RegionKind::Standard, 100.0)];
        let v = RegionValidator::default().validate(&regions, Point::new(500.0, 500.0), &Faction::from("alpha"));
        assert!(!v.allowed);
        assert_eq!(v.reason.as_deref(), Some(NO_LAND));
    }

    #[test]
    fn unwalkable_region_is_denied() {
        let regions = vec![region("lake", None, false, RegionKind::Standard, 100.0)];
        let v = RegionValidator::default().validate(&regions, Point::new(10.0, 10.0), &Faction::from("alpha"));
        assert!(!v.allowed);
    }

    #[test]
    fn free_travel_overrides_owner_and_walkable() {
        let regions = vec![region("market", Some("beta"), false, RegionKind::FreeTravel, 100.0)];
        let v = RegionValidator::default().validate(&regions, Point::new(10.0, 10.0), &Faction::from("alpha"));
        assert!(v.allowed);
    }

    #[test]
    fn tie_break_selects_region() {
        let regions = vec![
            region("outer", Some("beta"), true, RegionKind::Standard, 1000.0),
            region("inner", Some("alpha"), true, RegionKind::Standard, 100.0),
        ];
        let point = Point::new(50.0, 50.0);
        let alpha = Faction::from("alpha");

        let first = RegionValidator::new(RegionTieBreak::FirstMatch).validate(&regions, point, &alpha);
        assert!(!first.allowed);
        assert_eq!(first.region, Some(RegionId::from("outer")));

        let smallest = RegionValidator::new(RegionTieBreak::SmallestArea).validate(&regions, point, &alpha);
        assert!(smallest.allowed);
        assert_eq!(smallest.region, Some(RegionId::from("inner")));
    }
}
