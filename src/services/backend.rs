use async_trait::async_trait;
use thiserror::Error;

use crate::dispatch::SearchConfig;
use crate::models::{BookingRequest, Coordinate, ProviderRecord, SearchStatus};

/// Errors raised by the hosted backend collaborators
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("HTTP request failed: {0}")]
    RequestError(#[from] reqwest::Error),

    #[error("API returned error: {0}")]
    ApiError(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Unauthorized: invalid API key or token")]
    Unauthorized,

    #[error("Invalid response format: {0}")]
    InvalidResponse(String),
}

/// Source of provider snapshots
///
/// Implementations decide pagination and freshness; the matcher accepts
/// whatever batch comes back.
#[async_trait]
pub trait ProviderDirectory: Send + Sync {
    /// Providers registered in a region, or all providers when `region_id` is `None`
    async fn fetch_providers(&self, region_id: Option<&str>) -> Result<Vec<ProviderRecord>, BackendError>;

    /// Providers whose stored coordinate lies roughly within `radius_km` of `center`
    async fn fetch_providers_near(
        &self,
        center: Coordinate,
        radius_km: f64,
    ) -> Result<Vec<ProviderRecord>, BackendError>;
}

/// Booking lifecycle operations owned by the backend
#[async_trait]
pub trait BookingService: Send + Sync {
    /// Create a pending booking and return its id
    async fn create_booking(&self, request: &BookingRequest) -> Result<String, BackendError>;

    /// Start a server-side provider search for a booking and return the search id
    async fn start_search(&self, booking_id: &str, config: &SearchConfig) -> Result<String, BackendError>;

    async fn check_search_status(&self, search_id: &str, booking_id: &str) -> Result<SearchStatus, BackendError>;

    /// Abandon one search started for `booking_id`
    ///
    /// Scoped to a single booking so one customer's cancel never touches
    /// another booking's search.
    async fn cancel_active_search(&self, booking_id: &str, search_id: &str) -> Result<(), BackendError>;

    /// Commit the booking to a provider; only now is the provider dispatched
    async fn accept_booking(&self, booking_id: &str, provider_id: &str) -> Result<(), BackendError>;

    async fn decline_booking(&self, booking_id: &str, provider_id: &str) -> Result<(), BackendError>;
}
