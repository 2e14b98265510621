use actix_cors::Cors;
use actix_web::{error, http::StatusCode, middleware, web, App, HttpResponse, HttpServer};
use proximity_dispatch::config::Settings;
use proximity_dispatch::core::{LocationResolver, ProviderMatcher, RegionTable};
use proximity_dispatch::dispatch::SearchRegistry;
use proximity_dispatch::routes::{self, AppState};
use proximity_dispatch::services::{AppwriteClient, AppwriteCollections};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// JSON error response for JSON payload errors
#[derive(Debug, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JsonError {
    pub error: String,
    pub message: String,
    pub status_code: u16,
}

impl std::fmt::Display for JsonError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.error, self.message)
    }
}

impl std::error::Error for JsonError {}

impl error::ResponseError for JsonError {
    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(StatusCode::from_u16(self.status_code).unwrap_or(StatusCode::BAD_REQUEST)).json(self)
    }
}

/// Handle JSON payload errors
pub fn handle_json_payload_error(err: error::JsonPayloadError, req: &actix_web::HttpRequest) -> actix_web::Error {
    tracing::info!("JSON payload error on {}: {}", req.path(), err);
    JsonError {
        error: "invalid_json".to_string(),
        message: format!("Invalid JSON: {}", err),
        status_code: 400,
    }
    .into()
}

/// Handle query payload errors
pub fn handle_query_payload_error(err: error::QueryPayloadError, _req: &actix_web::HttpRequest) -> actix_web::Error {
    JsonError {
        error: "invalid_query".to_string(),
        message: format!("Invalid query: {}", err),
        status_code: 400,
    }
    .into()
}

fn init_tracing() {
    let log_level = std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
    let log_format = std::env::var("LOG_FORMAT").unwrap_or_else(|_| "json".to_string());
    let filter = EnvFilter::try_new(&log_level).unwrap_or_else(|_| EnvFilter::new("info"));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_level(true);

    if log_format == "pretty" {
        subscriber.pretty().init();
    } else {
        subscriber.json().init();
    }
}

fn startup_error(context: &str, err: impl std::fmt::Display) -> std::io::Error {
    error!("{}: {}", context, err);
    std::io::Error::other(format!("{}: {}", context, err))
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // Load .env file if present
    dotenv::dotenv().ok();

    init_tracing();

    info!("Starting proximity dispatch service...");

    let settings = Settings::load().map_err(|e| startup_error("Failed to load configuration", e))?;

    info!("Configuration loaded successfully");

    let table = match &settings.matching.regions_path {
        Some(path) => RegionTable::load(path),
        None => RegionTable::embedded(),
    }
    .map_err(|e| startup_error("Failed to load region table", e))?;

    info!("Loaded {} regions", table.len());

    let resolver = Arc::new(LocationResolver::new(table));
    let matcher = Arc::new(
        ProviderMatcher::new(Arc::clone(&resolver))
            .with_provider_region_distance(settings.matching.provider_region_distance_km),
    );

    let appwrite_collections = AppwriteCollections {
        providers: settings.collection.providers.clone(),
        bookings: settings.collection.bookings.clone(),
        searches: settings.collection.searches.clone(),
    };

    let appwrite = Arc::new(
        AppwriteClient::new(
            settings.appwrite.endpoint.clone(),
            settings.appwrite.api_key.clone(),
            settings.appwrite.project_id.clone(),
            settings.appwrite.database_id.clone(),
            appwrite_collections,
        )
        .map_err(|e| startup_error("Failed to create Appwrite client", e))?,
    );

    info!("Appwrite client initialized");

    let timings = settings.search.timings();
    let searches = Arc::new(SearchRegistry::new(appwrite.clone(), timings).with_retention(settings.search.retention()));
    let sweeper_shutdown = CancellationToken::new();
    let sweeper = searches.spawn_sweeper(settings.search.sweep_interval(), sweeper_shutdown.clone());

    info!("Search registry initialized with timings: {:?}", timings);

    // Build application state
    let app_state = AppState {
        resolver,
        matcher,
        directory: appwrite.clone(),
        bookings: appwrite,
        searches,
        match_defaults: settings.matching.options(),
        search_defaults: settings.search.defaults(),
        user_region_distance_km: settings.matching.user_region_distance_km,
    };

    // Configure HTTP server
    let host = settings.server.host.clone();
    let port = settings.server.port;
    let workers = settings.server.workers.unwrap_or(4);

    info!("Starting HTTP server on {}:{}", host, port);

    let server = HttpServer::new(move || {
        let cors = Cors::permissive();

        App::new()
            .app_data(web::Data::new(app_state.clone()))
            .app_data(web::JsonConfig::default().error_handler(handle_json_payload_error))
            .app_data(web::QueryConfig::default().error_handler(handle_query_payload_error))
            .wrap(cors)
            .wrap(middleware::Logger::default())
            .wrap(middleware::Compress::default())
            .configure(routes::configure_routes)
    })
    .workers(workers)
    .bind((host, port))?
    .run()
    .await;

    sweeper_shutdown.cancel();
    if let Err(e) = sweeper.await {
        error!("Search sweeper stopped abnormally: {}", e);
    }

    server
}
