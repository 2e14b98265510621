use serde::{Deserialize, Serialize};

/// Geographic coordinate in decimal degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub lat: f64,
    pub lng: f64,
}

impl Coordinate {
    pub const fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    /// Both components are finite and within the WGS84 ranges
    pub fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lng.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lng)
    }
}

/// Geospatial bounding box
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lon: f64,
    pub max_lon: f64,
}

/// Named reference area from the region gazetteer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeoRegion {
    #[serde(rename = "regionId")]
    pub region_id: String,
    pub name: String,
    #[serde(default)]
    pub province: Option<String>,
    pub center: Coordinate,
    #[serde(default)]
    pub aliases: Vec<String>,
}

/// Location context of the customer making a request
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserLocationContext {
    #[serde(rename = "regionId", default)]
    pub region_id: Option<String>,
    #[serde(rename = "regionName", default)]
    pub region_name: Option<String>,
    #[serde(default)]
    pub coordinate: Option<Coordinate>,
    #[serde(rename = "rawLocationText", default)]
    pub raw_location_text: Option<String>,
}

impl UserLocationContext {
    /// Region id trimmed and lowercased, `None` when absent or blank
    pub fn normalized_region_id(&self) -> Option<String> {
        self.region_id
            .as_deref()
            .map(|id| id.trim().to_lowercase())
            .filter(|id| !id.is_empty())
    }

    /// Human readable region name, falling back to the region id
    pub fn display_region_name(&self) -> String {
        self.region_name
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(str::to_string)
            .or_else(|| self.normalized_region_id())
            .unwrap_or_else(|| "your area".to_string())
    }
}

/// Live availability of a provider
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", from = "String")]
pub enum ProviderStatus {
    Available,
    Busy,
    Offline,
    #[default]
    Unknown,
}

impl ProviderStatus {
    /// Lenient parse of the free-form status strings stored by the backend
    pub fn from_raw(raw: &str) -> Self {
        match raw.trim().to_lowercase().as_str() {
            "available" | "online" => Self::Available,
            "busy" => Self::Busy,
            "offline" => Self::Offline,
            _ => Self::Unknown,
        }
    }
}

impl From<String> for ProviderStatus {
    fn from(value: String) -> Self {
        Self::from_raw(&value)
    }
}

/// Read-only snapshot of a provider as seen by one matching call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderRecord {
    #[serde(rename = "providerId")]
    pub provider_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(rename = "regionId", default)]
    pub region_id: Option<String>,
    #[serde(default)]
    pub coordinate: Option<Coordinate>,
    #[serde(rename = "accountActive", default = "default_true")]
    pub account_active: bool,
    #[serde(default)]
    pub status: ProviderStatus,
}

impl ProviderRecord {
    /// Active account and currently available for dispatch
    pub fn is_bookable(&self) -> bool {
        self.account_active && self.status == ProviderStatus::Available
    }

    /// Coordinate, if present and within range
    pub fn valid_coordinate(&self) -> Option<Coordinate> {
        self.coordinate.filter(Coordinate::is_valid)
    }
}

fn default_true() -> bool { true }

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchType {
    Distance,
    Region,
    Placeholder,
}

/// A provider proposed for a request, derived fresh on every matching call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchCandidate {
    pub provider: ProviderRecord,
    #[serde(rename = "matchType")]
    pub match_type: MatchType,
    #[serde(rename = "distanceKm")]
    pub distance_km: Option<f64>,
    pub bookable: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl MatchCandidate {
    pub fn new(provider: ProviderRecord, match_type: MatchType, distance_km: Option<f64>) -> Self {
        let bookable = provider.is_bookable();
        Self {
            provider,
            match_type,
            distance_km,
            bookable,
            note: None,
        }
    }

    pub fn is_placeholder(&self) -> bool {
        self.match_type == MatchType::Placeholder
    }
}

/// Counters describing how a matching call partitioned its input
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchStats {
    pub total_input: usize,
    pub unique_providers: usize,
    pub duplicates_skipped: usize,
    pub deactivated: usize,
    pub offline: usize,
    pub soft_status: usize,
    pub no_location: usize,
    pub unmatched: usize,
    pub distance_matches: usize,
    pub region_matches: usize,
    pub placeholders: usize,
}

/// Result of a matching call
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchOutcome {
    pub matches: Vec<MatchCandidate>,
    pub distance_matches: Vec<MatchCandidate>,
    pub region_matches: Vec<MatchCandidate>,
    pub placeholders: Vec<MatchCandidate>,
    pub stats: MatchStats,
}

/// Tuning knobs for a matching call
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchOptions {
    pub radius_km: f64,
    pub min_results: usize,
    pub max_results: usize,
}

impl Default for MatchOptions {
    fn default() -> Self {
        Self {
            radius_km: 8.0,
            min_results: 5,
            max_results: 12,
        }
    }
}

/// Provider reported by the search-status source once a search succeeds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FoundProvider {
    #[serde(rename = "providerId")]
    pub provider_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(rename = "distanceKm", default)]
    pub distance_km: Option<f64>,
}

/// One answer from the search-status poll
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchStatus {
    pub success: bool,
    #[serde(default)]
    pub provider: Option<FoundProvider>,
    #[serde(default)]
    pub error: Option<String>,
}

impl SearchStatus {
    pub fn pending() -> Self {
        Self::default()
    }

    pub fn found(provider: FoundProvider) -> Self {
        Self {
            success: true,
            provider: Some(provider),
            error: None,
        }
    }
}

/// Booking to be created by the booking collaborator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookingRequest {
    #[serde(rename = "customerId", default)]
    pub customer_id: Option<String>,
    pub location: Coordinate,
    #[serde(rename = "durationMinutes")]
    pub duration_minutes: u32,
    #[serde(rename = "regionId", default)]
    pub region_id: Option<String>,
}
