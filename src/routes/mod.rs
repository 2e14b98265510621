// Route exports
pub mod matches;
pub mod searches;

use std::sync::Arc;

use actix_web::{http::StatusCode, web, HttpResponse};

use crate::core::{LocationResolver, ProviderMatcher};
use crate::dispatch::{DispatchError, SearchConfig, SearchRegistry};
use crate::models::{ErrorResponse, MatchOptions};
use crate::services::{BackendError, BookingService, ProviderDirectory};

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    pub resolver: Arc<LocationResolver>,
    pub matcher: Arc<ProviderMatcher>,
    pub directory: Arc<dyn ProviderDirectory>,
    pub bookings: Arc<dyn BookingService>,
    pub searches: Arc<SearchRegistry>,
    pub match_defaults: MatchOptions,
    pub search_defaults: SearchConfig,
    /// Radius for detecting a customer's region from their coordinate
    pub user_region_distance_km: f64,
}

pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/v1")
            .configure(matches::configure)
            .configure(searches::configure),
    );
}

pub(crate) fn error_response(status: StatusCode, error: &str, message: impl ToString) -> HttpResponse {
    HttpResponse::build(status).json(ErrorResponse {
        error: error.to_string(),
        message: message.to_string(),
        status_code: status.as_u16(),
    })
}

pub(crate) fn backend_error_response(err: &BackendError) -> HttpResponse {
    match err {
        BackendError::NotFound(_) => error_response(StatusCode::NOT_FOUND, "not_found", err),
        _ => error_response(StatusCode::BAD_GATEWAY, "backend_error", err),
    }
}

pub(crate) fn dispatch_error_response(err: &DispatchError) -> HttpResponse {
    match err {
        DispatchError::InvalidInput(_) => error_response(StatusCode::BAD_REQUEST, "invalid_input", err),
        DispatchError::InvalidState { .. } => error_response(StatusCode::CONFLICT, "invalid_state", err),
        DispatchError::ProviderMismatch(_) => error_response(StatusCode::CONFLICT, "provider_mismatch", err),
        DispatchError::Aborted => error_response(StatusCode::CONFLICT, "search_aborted", err),
        DispatchError::Backend(backend) => backend_error_response(backend),
    }
}
