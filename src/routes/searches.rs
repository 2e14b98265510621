use actix_web::{http::StatusCode, web, HttpResponse, Responder};
use serde::Serialize;
use validator::Validate;

use crate::dispatch::{SearchSnapshot, SearchState};
use crate::models::{BookingCreatedResponse, BookingRequest, CreateBookingRequest, ProviderDecisionRequest, StartSearchRequest};
use crate::routes::{backend_error_response, dispatch_error_response, error_response, AppState};

/// Configure booking and search lifecycle routes
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg
        .route("/bookings", web::post().to(create_booking))
        .route("/searches", web::post().to(start_search))
        .route("/searches/{booking_id}", web::get().to(get_search))
        .route("/searches/{booking_id}", web::delete().to(reset_search))
        .route("/searches/{booking_id}/cancel", web::post().to(cancel_search))
        .route("/searches/{booking_id}/accept", web::post().to(accept_provider))
        .route("/searches/{booking_id}/decline", web::post().to(decline_provider));
}

/// Snapshot plus the states the session has passed through
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SearchView {
    #[serde(flatten)]
    snapshot: SearchSnapshot,
    history: Vec<SearchState>,
}

fn search_not_found(booking_id: &str) -> HttpResponse {
    error_response(
        StatusCode::NOT_FOUND,
        "search_not_found",
        format!("No search for booking {}", booking_id),
    )
}

/// Create a booking
///
/// POST /api/v1/bookings
///
/// Request body:
/// ```json
/// {
///   "customerId": "string",
///   "latitude": -6.2088,
///   "longitude": 106.8456,
///   "durationMinutes": 90,
///   "regionId": "jakarta"
/// }
/// ```
async fn create_booking(state: web::Data<AppState>, req: web::Json<CreateBookingRequest>) -> impl Responder {
    if let Err(errors) = req.validate() {
        return error_response(StatusCode::BAD_REQUEST, "Validation failed", errors);
    }

    match state.bookings.create_booking(&BookingRequest::from(&*req)).await {
        Ok(booking_id) => HttpResponse::Created().json(BookingCreatedResponse { booking_id }),
        Err(e) => {
            tracing::error!("Failed to create booking: {}", e);
            backend_error_response(&e)
        }
    }
}

/// Start searching for a provider
///
/// POST /api/v1/searches
///
/// Request body:
/// ```json
/// {
///   "bookingId": "string",
///   "maxSearchTimeSeconds": 60,
///   "retryAttempts": 3
/// }
/// ```
async fn start_search(state: web::Data<AppState>, req: web::Json<StartSearchRequest>) -> impl Responder {
    if let Err(errors) = req.validate() {
        return error_response(StatusCode::BAD_REQUEST, "Validation failed", errors);
    }

    let booking_id = req.booking_id.trim();
    if booking_id.is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "invalid_input", "bookingId is required");
    }
    let config = req.config(state.search_defaults);

    match state.searches.start(booking_id, config).await {
        Ok(snapshot) => HttpResponse::Accepted().json(snapshot),
        Err(e) => {
            tracing::warn!("Failed to start search for booking {}: {}", booking_id, e);
            dispatch_error_response(&e)
        }
    }
}

/// Current search snapshot for a booking
///
/// GET /api/v1/searches/{bookingId}
async fn get_search(state: web::Data<AppState>, path: web::Path<String>) -> impl Responder {
    let booking_id = path.into_inner();
    let Some(controller) = state.searches.get(&booking_id).await else {
        return search_not_found(&booking_id);
    };

    HttpResponse::Ok().json(SearchView {
        snapshot: controller.snapshot().await,
        history: controller.history().await,
    })
}

/// Cancel an active search and notify the booking service
///
/// POST /api/v1/searches/{bookingId}/cancel
async fn cancel_search(state: web::Data<AppState>, path: web::Path<String>) -> impl Responder {
    let booking_id = path.into_inner();
    let Some(controller) = state.searches.get(&booking_id).await else {
        return search_not_found(&booking_id);
    };

    HttpResponse::Ok().json(controller.cancel_search().await)
}

/// Discard a booking's search locally
///
/// DELETE /api/v1/searches/{bookingId}
async fn reset_search(state: web::Data<AppState>, path: web::Path<String>) -> impl Responder {
    let booking_id = path.into_inner();
    if state.searches.remove(&booking_id).await {
        HttpResponse::NoContent().finish()
    } else {
        search_not_found(&booking_id)
    }
}

/// Accept the found provider, dispatching the booking
///
/// POST /api/v1/searches/{bookingId}/accept
async fn accept_provider(
    state: web::Data<AppState>,
    path: web::Path<String>,
    req: web::Json<ProviderDecisionRequest>,
) -> impl Responder {
    if let Err(errors) = req.validate() {
        return error_response(StatusCode::BAD_REQUEST, "Validation failed", errors);
    }

    let booking_id = path.into_inner();
    let Some(controller) = state.searches.get(&booking_id).await else {
        return search_not_found(&booking_id);
    };

    match controller.accept_provider(&req.provider_id).await {
        Ok(snapshot) => HttpResponse::Ok().json(snapshot),
        Err(e) => {
            tracing::warn!("Failed to accept provider {} for booking {}: {}", req.provider_id, booking_id, e);
            dispatch_error_response(&e)
        }
    }
}

/// Decline the found provider; the search returns to idle
///
/// POST /api/v1/searches/{bookingId}/decline
async fn decline_provider(
    state: web::Data<AppState>,
    path: web::Path<String>,
    req: web::Json<ProviderDecisionRequest>,
) -> impl Responder {
    if let Err(errors) = req.validate() {
        return error_response(StatusCode::BAD_REQUEST, "Validation failed", errors);
    }

    let booking_id = path.into_inner();
    let Some(controller) = state.searches.get(&booking_id).await else {
        return search_not_found(&booking_id);
    };

    match controller.decline_provider(&req.provider_id).await {
        Ok(snapshot) => HttpResponse::Ok().json(snapshot),
        Err(e) => {
            tracing::warn!("Failed to decline provider {} for booking {}: {}", req.provider_id, booking_id, e);
            dispatch_error_response(&e)
        }
    }
}
