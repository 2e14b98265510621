use serde::{Deserialize, Serialize};

use crate::models::domain::{GeoRegion, MatchCandidate, MatchStats};

/// Response for the provider matching endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchProvidersResponse {
    pub region_id: Option<String>,
    pub region_name: String,
    pub matches: Vec<MatchCandidate>,
    pub distance_matches: usize,
    pub region_matches: usize,
    pub placeholders: usize,
    pub stats: MatchStats,
}

/// Response for region resolution
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolveRegionResponse {
    pub region_id: String,
    pub region: Option<GeoRegion>,
    pub distance_km: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingCreatedResponse {
    pub booking_id: String,
}

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub regions: usize,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

/// Error response
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    pub status_code: u16,
}
