//! Proximity Dispatch - provider matching and booking dispatch engine
//!
//! This library ranks service providers for a customer by physical distance
//! and administrative region, and drives the timed search that finds a
//! provider for a booking.

pub mod config;
pub mod core;
pub mod dispatch;
pub mod models;
pub mod routes;
pub mod services;

// Re-export commonly used types
pub use crate::core::{
    distance::{calculate_bounding_box, distance_km},
    LocationResolver, ProviderMatcher, RegionTable,
};
pub use crate::dispatch::{DispatchError, DispatchSearchController, SearchConfig, SearchRegistry, SearchState};
pub use crate::models::{Coordinate, MatchOptions, MatchOutcome, ProviderRecord, UserLocationContext};
