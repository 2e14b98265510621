use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method, Response, StatusCode};
use serde_json::{json, Value};
use tokio::sync::Mutex;

use crate::core::distance::{calculate_bounding_box, is_within_bounding_box};
use crate::dispatch::SearchConfig;
use crate::models::{BookingRequest, Coordinate, FoundProvider, ProviderRecord, ProviderStatus, SearchStatus};
use crate::services::backend::{BackendError, BookingService, ProviderDirectory};

/// Upper bound on documents fetched per provider query
const PROVIDER_PAGE_LIMIT: usize = 500;

/// Appwrite API client
///
/// Handles all communication with the Appwrite backend including:
/// - Listing provider documents
/// - Creating bookings and provider searches
/// - Polling and cancelling searches
pub struct AppwriteClient {
    base_url: String,
    api_key: String,
    project_id: String,
    database_id: String,
    client: Client,
    collections: AppwriteCollections,
    /// Searches started by this client and not yet found or cancelled, keyed
    /// by search id with the owning booking id as value
    active_searches: Mutex<HashMap<String, String>>,
}

/// Collection IDs in Appwrite
#[derive(Debug, Clone)]
pub struct AppwriteCollections {
    pub providers: String,
    pub bookings: String,
    pub searches: String,
}

impl AppwriteClient {
    /// Create a new Appwrite client
    pub fn new(
        base_url: String,
        api_key: String,
        project_id: String,
        database_id: String,
        collections: AppwriteCollections,
    ) -> Result<Self, BackendError> {
        let client = Client::builder().timeout(Duration::from_secs(30)).build()?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            project_id,
            database_id,
            client,
            collections,
            active_searches: Mutex::new(HashMap::new()),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Searches still open for `booking_id`
    pub async fn active_search_count(&self, booking_id: &str) -> usize {
        self.active_searches
            .lock()
            .await
            .values()
            .filter(|owner| owner.as_str() == booking_id)
            .count()
    }

    fn documents_url(&self, collection: &str) -> String {
        format!(
            "{}/databases/{}/collections/{}/documents",
            self.base_url, self.database_id, collection
        )
    }

    fn document_url(&self, collection: &str, document_id: &str) -> String {
        format!(
            "{}/{}",
            self.documents_url(collection),
            urlencoding::encode(document_id)
        )
    }

    async fn send(&self, method: Method, url: &str, body: Option<Value>) -> Result<Response, BackendError> {
        let mut request = self
            .client
            .request(method, url)
            .header("X-Appwrite-Key", &self.api_key)
            .header("X-Appwrite-Project", &self.project_id);
        if let Some(body) = body {
            request = request.json(&body);
        }
        Ok(request.send().await?)
    }

    async fn list_providers(&self, queries: Vec<String>) -> Result<Vec<ProviderRecord>, BackendError> {
        let query_string = queries
            .iter()
            .map(|q| format!("queries[]={}", urlencoding::encode(q)))
            .collect::<Vec<_>>()
            .join("&");
        let url = format!("{}?{}", self.documents_url(&self.collections.providers), query_string);

        tracing::debug!("Fetching providers from: {}", url);

        let response = self.send(Method::GET, &url, None).await?;
        let response = ensure_success(response, "list providers").await?;
        let json: Value = response.json().await?;

        let documents = json
            .get("documents")
            .and_then(|d| d.as_array())
            .ok_or_else(|| BackendError::InvalidResponse("Missing documents array".into()))?;

        let providers: Vec<ProviderRecord> = documents.iter().filter_map(provider_from_document).collect();
        let skipped = documents.len() - providers.len();
        if skipped > 0 {
            tracing::warn!(skipped, "Skipped provider documents without an id");
        }

        tracing::debug!("Fetched {} providers", providers.len());
        Ok(providers)
    }

    async fn create_document(&self, collection: &str, data: Value) -> Result<String, BackendError> {
        let document_id = uuid::Uuid::new_v4().to_string();
        let payload = json!({ "documentId": document_id, "data": data });

        let response = self
            .send(Method::POST, &self.documents_url(collection), Some(payload))
            .await?;
        let response = ensure_success(response, "create document").await?;
        let json: Value = response.json().await?;

        Ok(json
            .get("$id")
            .and_then(Value::as_str)
            .map_or(document_id, str::to_string))
    }

    async fn update_document(&self, collection: &str, document_id: &str, data: Value) -> Result<(), BackendError> {
        let response = self
            .send(
                Method::PATCH,
                &self.document_url(collection, document_id),
                Some(json!({ "data": data })),
            )
            .await?;
        ensure_success(response, "update document").await?;
        Ok(())
    }
}

#[async_trait]
impl ProviderDirectory for AppwriteClient {
    async fn fetch_providers(&self, region_id: Option<&str>) -> Result<Vec<ProviderRecord>, BackendError> {
        let mut queries = vec![format!("limit({})", PROVIDER_PAGE_LIMIT)];
        if let Some(region) = region_id.map(str::trim).filter(|r| !r.is_empty()) {
            queries.push(format!("equal(\"locationId\", [{}])", json!(region.to_lowercase())));
        }
        self.list_providers(queries).await
    }

    async fn fetch_providers_near(
        &self,
        center: Coordinate,
        radius_km: f64,
    ) -> Result<Vec<ProviderRecord>, BackendError> {
        let bbox = calculate_bounding_box(center, radius_km);
        let queries = vec![
            format!("limit({})", PROVIDER_PAGE_LIMIT),
            format!("greaterThanEqual(\"latitude\", {})", bbox.min_lat),
            format!("lessThanEqual(\"latitude\", {})", bbox.max_lat),
            format!("greaterThanEqual(\"longitude\", {})", bbox.min_lon),
            format!("lessThanEqual(\"longitude\", {})", bbox.max_lon),
        ];

        let providers = self.list_providers(queries).await?;
        Ok(providers
            .into_iter()
            .filter(|p| p.valid_coordinate().is_some_and(|c| is_within_bounding_box(c, &bbox)))
            .collect())
    }
}

#[async_trait]
impl BookingService for AppwriteClient {
    async fn create_booking(&self, request: &BookingRequest) -> Result<String, BackendError> {
        let data = json!({
            "customerId": request.customer_id,
            "latitude": request.location.lat,
            "longitude": request.location.lng,
            "durationMinutes": request.duration_minutes,
            "regionId": request.region_id,
            "status": "pending",
            "createdAt": chrono::Utc::now().to_rfc3339(),
        });

        let booking_id = self.create_document(&self.collections.bookings, data).await?;
        tracing::info!(booking_id = %booking_id, "Booking created");
        Ok(booking_id)
    }

    async fn start_search(&self, booking_id: &str, config: &SearchConfig) -> Result<String, BackendError> {
        let data = json!({
            "bookingId": booking_id,
            "maxSearchTimeSeconds": config.max_search_time_seconds,
            "retryAttempts": config.retry_attempts,
            "status": "searching",
            "startedAt": chrono::Utc::now().to_rfc3339(),
        });

        let search_id = self.create_document(&self.collections.searches, data).await?;
        self.active_searches
            .lock()
            .await
            .insert(search_id.clone(), booking_id.to_string());
        Ok(search_id)
    }

    async fn check_search_status(&self, search_id: &str, booking_id: &str) -> Result<SearchStatus, BackendError> {
        let response = self
            .send(Method::GET, &self.document_url(&self.collections.searches, search_id), None)
            .await?;
        let response = ensure_success(response, "check search status").await?;
        let json: Value = response.json().await?;
        let doc = json.get("data").unwrap_or(&json);

        if let Some(owner) = doc.get("bookingId").and_then(Value::as_str) {
            if owner != booking_id {
                return Err(BackendError::InvalidResponse(format!(
                    "Search {} belongs to booking {}",
                    search_id, owner
                )));
            }
        }

        let status = search_status_from_document(doc);
        if status.success {
            self.active_searches.lock().await.remove(search_id);
        }
        Ok(status)
    }

    async fn cancel_active_search(&self, booking_id: &str, search_id: &str) -> Result<(), BackendError> {
        {
            let mut active = self.active_searches.lock().await;
            match active.get(search_id) {
                Some(owner) if owner != booking_id => {
                    return Err(BackendError::InvalidResponse(format!(
                        "Search {} belongs to booking {}",
                        search_id, owner
                    )));
                }
                _ => {
                    active.remove(search_id);
                }
            }
        }

        self.update_document(&self.collections.searches, search_id, json!({ "status": "cancelled" }))
            .await?;
        tracing::debug!(booking_id, search_id, "Search cancelled");
        Ok(())
    }

    async fn accept_booking(&self, booking_id: &str, provider_id: &str) -> Result<(), BackendError> {
        self.update_document(
            &self.collections.bookings,
            booking_id,
            json!({
                "status": "accepted",
                "providerId": provider_id,
                "acceptedAt": chrono::Utc::now().to_rfc3339(),
            }),
        )
        .await
    }

    async fn decline_booking(&self, booking_id: &str, provider_id: &str) -> Result<(), BackendError> {
        self.update_document(
            &self.collections.bookings,
            booking_id,
            json!({
                "status": "pending",
                "declinedProviderId": provider_id,
            }),
        )
        .await
    }
}

async fn ensure_success(response: Response, context: &str) -> Result<Response, BackendError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_else(|_| "Unable to read body".to_string());
    tracing::error!("Failed to {}: {} - {}", context, status, body);

    Err(match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => BackendError::Unauthorized,
        StatusCode::NOT_FOUND => BackendError::NotFound(format!("{}: {}", context, body)),
        _ => BackendError::ApiError(format!("Failed to {}: {}", context, status)),
    })
}

/// Build a provider record from a raw provider document
///
/// Documents come from several generations of the provider profile form, so
/// status, liveness, location and coordinates all have fallbacks.
pub(crate) fn provider_from_document(doc: &Value) -> Option<ProviderRecord> {
    let doc = doc.get("data").filter(|d| d.is_object()).unwrap_or(doc);

    let provider_id = non_empty_str(doc, "$id")
        .or_else(|| non_empty_str(doc, "id"))
        .or_else(|| non_empty_str(doc, "providerId"))?;

    // `availability` is the newer field and wins over `status`
    let status = non_empty_str(doc, "availability")
        .or_else(|| non_empty_str(doc, "status"))
        .map_or(ProviderStatus::Unknown, ProviderStatus::from_raw);

    let account_active = match doc.get("isLive") {
        Some(Value::Bool(live)) => *live,
        Some(Value::String(live)) => !live.eq_ignore_ascii_case("false"),
        _ => true,
    };

    let region_id = non_empty_str(doc, "locationId")
        .or_else(|| non_empty_str(doc, "city"))
        .map(|r| r.trim().to_lowercase());

    Some(ProviderRecord {
        provider_id: provider_id.to_string(),
        name: non_empty_str(doc, "name").unwrap_or_default().to_string(),
        region_id,
        coordinate: document_coordinate(doc),
        account_active,
        status,
    })
}

fn non_empty_str<'a>(doc: &'a Value, key: &str) -> Option<&'a str> {
    doc.get(key).and_then(Value::as_str).filter(|s| !s.trim().is_empty())
}

fn document_coordinate(doc: &Value) -> Option<Coordinate> {
    doc.get("coordinates")
        .and_then(parse_coordinate)
        .or_else(|| lat_lng_fields(doc, "latitude", "longitude"))
        .or_else(|| doc.get("geopoint").and_then(parse_coordinate))
}

/// Coordinate from `{lat, lng}`, `{latitude, longitude}`, `[lng, lat]` or a JSON string of either
fn parse_coordinate(value: &Value) -> Option<Coordinate> {
    match value {
        Value::String(raw) => serde_json::from_str::<Value>(raw).ok().as_ref().and_then(parse_coordinate),
        Value::Array(pair) if pair.len() == 2 => Some(Coordinate::new(number(&pair[1])?, number(&pair[0])?)),
        Value::Object(_) => {
            lat_lng_fields(value, "lat", "lng").or_else(|| lat_lng_fields(value, "latitude", "longitude"))
        }
        _ => None,
    }
}

fn lat_lng_fields(value: &Value, lat_key: &str, lng_key: &str) -> Option<Coordinate> {
    let coordinate = Coordinate::new(number(value.get(lat_key)?)?, number(value.get(lng_key)?)?);
    // 0,0 is what the profile form stores before a location is picked
    (coordinate.lat != 0.0 || coordinate.lng != 0.0).then_some(coordinate)
}

fn number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn search_status_from_document(doc: &Value) -> SearchStatus {
    let status = non_empty_str(doc, "status").unwrap_or("searching").to_lowercase();
    let error = non_empty_str(doc, "error").map(str::to_string);

    match (status.as_str(), non_empty_str(doc, "providerId")) {
        ("found" | "accepted", Some(provider_id)) => SearchStatus::found(FoundProvider {
            provider_id: provider_id.to_string(),
            name: non_empty_str(doc, "providerName").unwrap_or_default().to_string(),
            distance_km: doc.get("distanceKm").and_then(number),
        }),
        _ => SearchStatus {
            success: false,
            provider: None,
            error,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_appwrite_client_creation() {
        let collections = AppwriteCollections {
            providers: "providers".to_string(),
            bookings: "bookings".to_string(),
            searches: "searches".to_string(),
        };

        let client = AppwriteClient::new(
            "https://appwrite.test/v1/".to_string(),
            "test_key".to_string(),
            "test_project".to_string(),
            "test_db".to_string(),
            collections,
        )
        .unwrap();

        assert_eq!(client.base_url(), "https://appwrite.test/v1");
        assert_eq!(
            client.document_url("searches", "s 1"),
            "https://appwrite.test/v1/databases/test_db/collections/searches/documents/s%201"
        );
    }

    #[test]
    fn test_provider_document_coordinate_shapes() {
        let object = json!({ "$id": "a", "coordinates": { "lat": -6.2, "lng": 106.8 } });
        let string = json!({ "$id": "b", "coordinates": "{\"lat\":-6.2,\"lng\":106.8}" });
        let array = json!({ "$id": "c", "coordinates": [106.8, -6.2] });
        let fields = json!({ "$id": "d", "latitude": "-6.2", "longitude": 106.8 });

        for doc in [object, string, array, fields] {
            let provider = provider_from_document(&doc).unwrap();
            assert_eq!(provider.coordinate, Some(Coordinate::new(-6.2, 106.8)));
        }
    }

    #[test]
    fn test_provider_document_unset_location() {
        let doc = json!({ "$id": "a", "coordinates": { "lat": 0, "lng": 0 } });
        assert_eq!(provider_from_document(&doc).unwrap().coordinate, None);

        let doc = json!({ "$id": "b", "coordinates": "not json" });
        assert_eq!(provider_from_document(&doc).unwrap().coordinate, None);
    }

    #[test]
    fn test_provider_document_status_and_liveness() {
        let doc = json!({
            "$id": "p1",
            "name": "Ayu",
            "status": "offline",
            "availability": "Available",
            "isLive": false,
            "city": " Jakarta ",
        });

        let provider = provider_from_document(&doc).unwrap();
        assert_eq!(provider.status, ProviderStatus::Available);
        assert!(!provider.account_active);
        assert_eq!(provider.region_id.as_deref(), Some("jakarta"));

        let doc = json!({ "$id": "p2", "locationId": "bali", "city": "Denpasar" });
        let provider = provider_from_document(&doc).unwrap();
        assert_eq!(provider.status, ProviderStatus::Unknown);
        assert!(provider.account_active);
        assert_eq!(provider.region_id.as_deref(), Some("bali"));
    }

    #[test]
    fn test_provider_document_requires_id() {
        assert!(provider_from_document(&json!({ "name": "Nameless" })).is_none());
    }

    #[test]
    fn test_search_status_document() {
        let found = search_status_from_document(&json!({
            "status": "found",
            "providerId": "p1",
            "providerName": "Ayu",
            "distanceKm": 2.5,
        }));
        assert!(found.success);
        assert_eq!(found.provider.unwrap().distance_km, Some(2.5));

        let pending = search_status_from_document(&json!({ "status": "searching" }));
        assert_eq!(pending, SearchStatus::pending());

        // A found status without a provider is not a success
        let broken = search_status_from_document(&json!({ "status": "found", "error": "lost" }));
        assert!(!broken.success);
        assert_eq!(broken.error.as_deref(), Some("lost"));
    }
}
