use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::dispatch::SearchConfig;
use crate::models::domain::{BookingRequest, Coordinate, MatchOptions, ProviderRecord, UserLocationContext};

/// Query for the region resolution endpoint
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ResolveRegionQuery {
    #[validate(range(min = -90.0, max = 90.0))]
    pub lat: f64,
    #[validate(range(min = -180.0, max = 180.0))]
    pub lng: f64,
    #[validate(range(min = 0.0))]
    #[serde(alias = "max_distance_km", rename = "maxDistanceKm")]
    pub max_distance_km: Option<f64>,
}

/// Request to rank providers for a customer
///
/// When `providers` is omitted the providers are fetched from the directory.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct MatchProvidersRequest {
    #[serde(flatten)]
    pub user: UserLocationContext,
    #[serde(default)]
    pub providers: Option<Vec<ProviderRecord>>,
    #[validate(range(min = 0.0))]
    #[serde(alias = "radius_km", rename = "radiusKm")]
    pub radius_km: Option<f64>,
    #[serde(alias = "min_results", rename = "minResults")]
    pub min_results: Option<usize>,
    #[validate(range(min = 1, max = 100))]
    #[serde(alias = "max_results", rename = "maxResults")]
    pub max_results: Option<usize>,
}

impl MatchProvidersRequest {
    /// Request bounds layered over the configured defaults
    pub fn options(&self, defaults: &MatchOptions) -> MatchOptions {
        MatchOptions {
            radius_km: self.radius_km.unwrap_or(defaults.radius_km),
            min_results: self.min_results.unwrap_or(defaults.min_results),
            max_results: self.max_results.unwrap_or(defaults.max_results),
        }
    }
}

/// Request to create a booking
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CreateBookingRequest {
    #[serde(alias = "customer_id", rename = "customerId", default)]
    pub customer_id: Option<String>,
    #[validate(range(min = -90.0, max = 90.0))]
    pub latitude: f64,
    #[validate(range(min = -180.0, max = 180.0))]
    pub longitude: f64,
    #[validate(range(min = 1, max = 600))]
    #[serde(alias = "duration_minutes", rename = "durationMinutes")]
    pub duration_minutes: u32,
    #[serde(alias = "region_id", rename = "regionId", default)]
    pub region_id: Option<String>,
}

impl From<&CreateBookingRequest> for BookingRequest {
    fn from(req: &CreateBookingRequest) -> Self {
        Self {
            customer_id: req.customer_id.clone(),
            location: Coordinate::new(req.latitude, req.longitude),
            duration_minutes: req.duration_minutes,
            region_id: req.region_id.clone(),
        }
    }
}

/// Request to start a provider search for a booking
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct StartSearchRequest {
    #[validate(length(min = 1))]
    #[serde(alias = "booking_id", rename = "bookingId")]
    pub booking_id: String,
    #[validate(range(min = 1, max = 3600))]
    #[serde(alias = "max_search_time_seconds", rename = "maxSearchTimeSeconds")]
    pub max_search_time_seconds: Option<u32>,
    #[validate(range(min = 1, max = 10))]
    #[serde(alias = "retry_attempts", rename = "retryAttempts")]
    pub retry_attempts: Option<u32>,
}

impl StartSearchRequest {
    pub fn config(&self, defaults: SearchConfig) -> SearchConfig {
        SearchConfig {
            max_search_time_seconds: self.max_search_time_seconds.unwrap_or(defaults.max_search_time_seconds),
            retry_attempts: self.retry_attempts.unwrap_or(defaults.retry_attempts),
        }
    }
}

/// Accept or decline the provider a search found
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ProviderDecisionRequest {
    #[validate(length(min = 1))]
    #[serde(alias = "provider_id", rename = "providerId")]
    pub provider_id: String,
}
