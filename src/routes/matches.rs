use actix_web::{http::StatusCode, web, HttpResponse, Responder};
use validator::Validate;

use crate::core::{distance_km, OTHER_REGION};
use crate::models::{
    Coordinate, HealthResponse, MatchProvidersRequest, MatchProvidersResponse, ProviderRecord, ResolveRegionQuery,
    ResolveRegionResponse, UserLocationContext,
};
use crate::routes::{backend_error_response, error_response, AppState};
use crate::services::BackendError;

/// Configure health, region and matching routes
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg
        .route("/health", web::get().to(health_check))
        .route("/regions/resolve", web::get().to(resolve_region))
        .route("/providers/match", web::post().to(match_providers));
}

/// Health check endpoint
async fn health_check(state: web::Data<AppState>) -> impl Responder {
    HttpResponse::Ok().json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        regions: state.resolver.table().len(),
        timestamp: chrono::Utc::now(),
    })
}

/// Resolve a coordinate to the nearest known region
///
/// GET /api/v1/regions/resolve?lat={lat}&lng={lng}&maxDistanceKm={km}
///
/// Returns `"other"` with no region when nothing lies within range.
async fn resolve_region(state: web::Data<AppState>, query: web::Query<ResolveRegionQuery>) -> impl Responder {
    if let Err(errors) = query.validate() {
        return error_response(StatusCode::BAD_REQUEST, "Validation failed", errors);
    }

    let coordinate = Coordinate::new(query.lat, query.lng);
    let max_distance = query.max_distance_km.unwrap_or(state.user_region_distance_km);
    let region_id = state.resolver.resolve_region(coordinate, max_distance);
    let region = state.resolver.region(&region_id).cloned();
    let distance = region.as_ref().map(|r| distance_km(coordinate, r.center));

    tracing::debug!("Resolved ({}, {}) to region {}", query.lat, query.lng, region_id);

    HttpResponse::Ok().json(ResolveRegionResponse {
        region_id,
        region,
        distance_km: distance,
    })
}

/// Rank providers for a customer
///
/// POST /api/v1/providers/match
///
/// Request body:
/// ```json
/// {
///   "regionId": "jakarta",
///   "regionName": "Jakarta",
///   "coordinate": { "lat": -6.2088, "lng": 106.8456 },
///   "radiusKm": 8,
///   "minResults": 5,
///   "maxResults": 12,
///   "providers": []
/// }
/// ```
///
/// Without `providers`, candidates are fetched from the provider directory.
async fn match_providers(state: web::Data<AppState>, req: web::Json<MatchProvidersRequest>) -> impl Responder {
    if let Err(errors) = req.validate() {
        tracing::info!("Validation failed for match request: field_errors={:?}", errors);
        return error_response(StatusCode::BAD_REQUEST, "Validation failed", errors);
    }

    let req = req.into_inner();
    let options = req.options(&state.match_defaults);
    let user = detect_region(&state, req.user);

    let providers = match req.providers {
        Some(providers) => providers,
        None => match fetch_candidates(&state, &user, options.radius_km).await {
            Ok(providers) => providers,
            Err(e) => {
                tracing::error!("Failed to fetch providers: {}", e);
                return backend_error_response(&e);
            }
        },
    };

    let outcome = state.matcher.match_providers(&providers, &user, &options);

    let region_id = user.normalized_region_id();
    let region_name = user
        .region_name
        .as_deref()
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .or_else(|| region_id.as_deref().map(|id| state.resolver.display_name(id)))
        .unwrap_or_else(|| user.display_region_name());

    tracing::info!(
        "Returning {} matches for region {:?} (from {} providers)",
        outcome.matches.len(),
        region_id,
        outcome.stats.total_input
    );

    HttpResponse::Ok().json(MatchProvidersResponse {
        region_id,
        region_name,
        distance_matches: outcome.distance_matches.len(),
        region_matches: outcome.region_matches.len(),
        placeholders: outcome.placeholders.len(),
        matches: outcome.matches,
        stats: outcome.stats,
    })
}

/// Fill a missing region id from the customer's coordinate
fn detect_region(state: &AppState, mut user: UserLocationContext) -> UserLocationContext {
    if user.normalized_region_id().is_some() {
        return user;
    }
    if let Some(coordinate) = user.coordinate.filter(Coordinate::is_valid) {
        let region_id = state.resolver.resolve_region(coordinate, state.user_region_distance_km);
        tracing::debug!("Detected region {} for customer coordinate", region_id);
        user.region_id = Some(region_id);
    }
    user
}

/// Providers registered in the customer's region plus those physically nearby
///
/// The two batches may overlap; the matcher drops duplicates.
async fn fetch_candidates(
    state: &AppState,
    user: &UserLocationContext,
    radius_km: f64,
) -> Result<Vec<ProviderRecord>, BackendError> {
    let mut providers = Vec::new();

    if let Some(region) = user.normalized_region_id().filter(|r| r != OTHER_REGION) {
        providers.extend(state.directory.fetch_providers(Some(&region)).await?);
    }
    if let Some(coordinate) = user.coordinate.filter(Coordinate::is_valid) {
        providers.extend(state.directory.fetch_providers_near(coordinate, radius_km).await?);
    }

    tracing::debug!("Fetched {} candidate providers", providers.len());
    Ok(providers)
}
