//! Region gazetteer and coordinate-to-region resolution.
//!
//! A [`RegionTable`] is an ordered, immutable list of reference regions loaded
//! once at startup. [`LocationResolver`] answers "which region is this point
//! in" by nearest center within a distance bound, degrading to
//! [`OTHER_REGION`] instead of failing.

use std::collections::HashSet;
use std::path::Path;

use thiserror::Error;

use crate::core::distance::distance_km;
use crate::models::{Coordinate, GeoRegion};

/// Sentinel region id for coordinates that resolve to no known region
pub const OTHER_REGION: &str = "other";

/// Search radius used when auto-detecting a customer's region
pub const DEFAULT_USER_REGION_DISTANCE_KM: f64 = 50.0;

/// Search radius used when deriving a provider's region from its coordinate
pub const DEFAULT_PROVIDER_REGION_DISTANCE_KM: f64 = 25.0;

/// Equidistance tolerance for the nearest-region tie-break
const TIE_EPSILON_KM: f64 = 1e-9;

const EMBEDDED_REGIONS: &str = include_str!("../../data/regions.json");

/// Errors raised while loading a region table
#[derive(Debug, Error)]
pub enum RegionError {
    #[error("Failed to read region file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse region data: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Duplicate region id: {0}")]
    DuplicateRegion(String),

    #[error("Region {0} has an invalid center coordinate")]
    InvalidCenter(String),

    #[error("Region id must not be empty")]
    EmptyRegionId,
}

/// Ordered, validated collection of reference regions
#[derive(Debug, Clone, Default)]
pub struct RegionTable {
    regions: Vec<GeoRegion>,
}

impl RegionTable {
    /// Build a table, normalizing ids and rejecting duplicates
    pub fn new(regions: Vec<GeoRegion>) -> Result<Self, RegionError> {
        let mut seen = HashSet::with_capacity(regions.len());
        let mut normalized = Vec::with_capacity(regions.len());

        for mut region in regions {
            region.region_id = region.region_id.trim().to_lowercase();
            if region.region_id.is_empty() {
                return Err(RegionError::EmptyRegionId);
            }
            if !region.center.is_valid() {
                return Err(RegionError::InvalidCenter(region.region_id));
            }
            if !seen.insert(region.region_id.clone()) {
                return Err(RegionError::DuplicateRegion(region.region_id));
            }
            normalized.push(region);
        }

        Ok(Self { regions: normalized })
    }

    pub fn from_json(json: &str) -> Result<Self, RegionError> {
        let regions: Vec<GeoRegion> = serde_json::from_str(json)?;
        Self::new(regions)
    }

    /// Reference set compiled into the binary
    pub fn embedded() -> Result<Self, RegionError> {
        Self::from_json(EMBEDDED_REGIONS)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, RegionError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    pub fn regions(&self) -> &[GeoRegion] {
        &self.regions
    }

    pub fn len(&self) -> usize {
        self.regions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }
}

/// Maps coordinates and names onto canonical region ids
#[derive(Debug, Clone)]
pub struct LocationResolver {
    table: RegionTable,
}

impl LocationResolver {
    pub fn new(table: RegionTable) -> Self {
        Self { table }
    }

    pub fn table(&self) -> &RegionTable {
        &self.table
    }

    /// Id of the nearest region within `max_distance_km`, else [`OTHER_REGION`]
    ///
    /// Equidistant regions resolve to the one listed first in the table.
    pub fn resolve_region(&self, coordinate: Coordinate, max_distance_km: f64) -> String {
        if !coordinate.is_valid() {
            return OTHER_REGION.to_string();
        }

        let mut best: Option<(&GeoRegion, f64)> = None;
        for region in self.table.regions() {
            let distance = distance_km(coordinate, region.center);
            if distance > max_distance_km {
                continue;
            }
            match best {
                Some((_, best_distance)) if distance >= best_distance - TIE_EPSILON_KM => {}
                _ => best = Some((region, distance)),
            }
        }

        best.map_or_else(|| OTHER_REGION.to_string(), |(region, _)| region.region_id.clone())
    }

    /// Regions within `max_distance_km`, nearest first, at most `limit`
    pub fn find_nearest_regions(
        &self,
        coordinate: Coordinate,
        max_distance_km: f64,
        limit: usize,
    ) -> Vec<(&GeoRegion, f64)> {
        if !coordinate.is_valid() {
            return Vec::new();
        }

        let mut nearby: Vec<(&GeoRegion, f64)> = self
            .table
            .regions()
            .iter()
            .map(|region| (region, distance_km(coordinate, region.center)))
            .filter(|(_, distance)| *distance <= max_distance_km)
            .collect();

        // Stable sort keeps reference order between equal distances
        nearby.sort_by(|a, b| a.1.total_cmp(&b.1));
        nearby.truncate(limit);
        nearby
    }

    /// Case-insensitive lookup by display name or alias
    pub fn find_region_by_name(&self, name: &str) -> Option<&GeoRegion> {
        let needle = name.trim().to_lowercase();
        if needle.is_empty() {
            return None;
        }
        self.table.regions().iter().find(|region| {
            region.name.to_lowercase() == needle
                || region.aliases.iter().any(|alias| alias.to_lowercase() == needle)
        })
    }

    pub fn region(&self, region_id: &str) -> Option<&GeoRegion> {
        let id = region_id.trim().to_lowercase();
        self.table.regions().iter().find(|region| region.region_id == id)
    }

    /// Display name for a region id, the id itself when unknown
    pub fn display_name(&self, region_id: &str) -> String {
        self.region(region_id)
            .map_or_else(|| region_id.to_string(), |region| region.name.clone())
    }
}

/// `true` for a present coordinate with finite, in-range components
pub fn validate_coordinate(coordinate: Option<&Coordinate>) -> bool {
    coordinate.is_some_and(Coordinate::is_valid)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn region(id: &str, lat: f64, lng: f64) -> GeoRegion {
        GeoRegion {
            region_id: id.to_string(),
            name: id.to_string(),
            province: None,
            center: Coordinate::new(lat, lng),
            aliases: vec![],
        }
    }

    #[test]
    fn test_embedded_table_loads() {
        let table = RegionTable::embedded().unwrap();
        assert!(table.len() > 50);
        assert!(table.regions().iter().any(|r| r.region_id == "jakarta"));
    }

    #[test]
    fn test_ids_are_normalized_and_unique() {
        let table = RegionTable::new(vec![region("  Bali ", 0.0, 0.0)]).unwrap();
        assert_eq!(table.regions()[0].region_id, "bali");

        let duplicate = RegionTable::new(vec![region("bali", 0.0, 0.0), region("BALI", 1.0, 1.0)]);
        assert!(matches!(duplicate, Err(RegionError::DuplicateRegion(id)) if id == "bali"));
    }

    #[test]
    fn test_invalid_center_rejected() {
        let result = RegionTable::new(vec![region("nowhere", 91.0, 0.0)]);
        assert!(matches!(result, Err(RegionError::InvalidCenter(_))));
    }

    #[test]
    fn test_resolve_nearest_within_bound() {
        let resolver = LocationResolver::new(RegionTable::embedded().unwrap());
        let region = resolver.resolve_region(Coordinate::new(-6.2088, 106.8456), 50.0);
        assert_eq!(region, "jakarta");

        let ubud = resolver.resolve_region(Coordinate::new(-8.51, 115.26), 25.0);
        assert_eq!(ubud, "ubud");
    }

    #[test]
    fn test_resolve_falls_back_to_other() {
        let resolver = LocationResolver::new(RegionTable::embedded().unwrap());
        // Middle of the Indian Ocean
        assert_eq!(resolver.resolve_region(Coordinate::new(-30.0, 80.0), 50.0), OTHER_REGION);
        assert_eq!(resolver.resolve_region(Coordinate::new(f64::NAN, 80.0), 50.0), OTHER_REGION);
    }

    #[test]
    fn test_equidistant_tie_prefers_reference_order() {
        let table = RegionTable::new(vec![region("east", 0.0, 0.1), region("west", 0.0, -0.1)]).unwrap();
        let resolver = LocationResolver::new(table);
        assert_eq!(resolver.resolve_region(Coordinate::new(0.0, 0.0), 50.0), "east");

        let table = RegionTable::new(vec![region("west", 0.0, -0.1), region("east", 0.0, 0.1)]).unwrap();
        let resolver = LocationResolver::new(table);
        assert_eq!(resolver.resolve_region(Coordinate::new(0.0, 0.0), 50.0), "west");
    }

    #[test]
    fn test_find_region_by_alias() {
        let resolver = LocationResolver::new(RegionTable::embedded().unwrap());
        let region = resolver.find_region_by_name("kuta beach").unwrap();
        assert_eq!(region.region_id, "kuta");
        assert!(resolver.find_region_by_name("atlantis").is_none());
    }

    #[test]
    fn test_find_nearest_regions_sorted() {
        let resolver = LocationResolver::new(RegionTable::embedded().unwrap());
        let nearby = resolver.find_nearest_regions(Coordinate::new(-8.6705, 115.2126), 30.0, 3);
        assert_eq!(nearby.len(), 3);
        assert_eq!(nearby[0].0.region_id, "denpasar");
        assert!(nearby[0].1 <= nearby[1].1 && nearby[1].1 <= nearby[2].1);
    }

    #[test]
    fn test_validate_coordinate() {
        assert!(validate_coordinate(Some(&Coordinate::new(-6.2, 106.8))));
        assert!(!validate_coordinate(None));
        assert!(!validate_coordinate(Some(&Coordinate::new(f64::NAN, 0.0))));
        assert!(!validate_coordinate(Some(&Coordinate::new(-91.0, 0.0))));
    }

    #[test]
    fn test_display_name_fallback() {
        let resolver = LocationResolver::new(RegionTable::embedded().unwrap());
        assert_eq!(resolver.display_name("jakarta"), "Jakarta");
        assert_eq!(resolver.display_name("mars"), "mars");
    }
}
