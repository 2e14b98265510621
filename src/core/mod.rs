// Core algorithm exports
pub mod distance;
pub mod filters;
pub mod matcher;
pub mod ranking;
pub mod regions;

pub use distance::{calculate_bounding_box, distance_km, distance_meters, is_within_bounding_box, is_within_radius};
pub use filters::{evaluate_eligibility, has_location, Eligibility};
pub use matcher::{ProviderMatcher, PLACEHOLDER_COUNT};
pub use ranking::{compare_distance_tier, compare_region_tier};
pub use regions::{validate_coordinate, LocationResolver, RegionError, RegionTable, OTHER_REGION};
