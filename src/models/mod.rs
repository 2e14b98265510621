// Model exports
pub mod domain;
pub mod requests;
pub mod responses;

pub use domain::{
    BookingRequest, BoundingBox, Coordinate, FoundProvider, GeoRegion, MatchCandidate, MatchOptions, MatchOutcome,
    MatchStats, MatchType, ProviderRecord, ProviderStatus, SearchStatus, UserLocationContext,
};
pub use requests::{
    CreateBookingRequest, MatchProvidersRequest, ProviderDecisionRequest, ResolveRegionQuery,
    StartSearchRequest,
};
pub use responses::{
    BookingCreatedResponse, ErrorResponse, HealthResponse, MatchProvidersResponse, ResolveRegionResponse,
};

