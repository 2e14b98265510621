use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::core::regions::{DEFAULT_PROVIDER_REGION_DISTANCE_KM, DEFAULT_USER_REGION_DISTANCE_KM};
use crate::dispatch::{SearchConfig, SearchTimings};
use crate::models::MatchOptions;

/// Application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub server: ServerSettings,
    pub appwrite: AppwriteSettings,
    #[serde(default)]
    pub collection: CollectionSettings,
    #[serde(default)]
    pub matching: MatchingSettings,
    #[serde(default)]
    pub search: SearchSettings,
    #[serde(default)]
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    pub workers: Option<usize>,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            workers: None,
        }
    }
}

fn default_host() -> String { "0.0.0.0".to_string() }
fn default_port() -> u16 { 8080 }

#[derive(Debug, Clone, Deserialize)]
pub struct AppwriteSettings {
    pub endpoint: String,
    pub api_key: String,
    pub project_id: String,
    pub database_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CollectionSettings {
    #[serde(default = "default_providers_collection")]
    pub providers: String,
    #[serde(default = "default_bookings_collection")]
    pub bookings: String,
    #[serde(default = "default_searches_collection")]
    pub searches: String,
}

impl Default for CollectionSettings {
    fn default() -> Self {
        Self {
            providers: default_providers_collection(),
            bookings: default_bookings_collection(),
            searches: default_searches_collection(),
        }
    }
}

fn default_providers_collection() -> String { "providers".to_string() }
fn default_bookings_collection() -> String { "bookings".to_string() }
fn default_searches_collection() -> String { "provider_searches".to_string() }

#[derive(Debug, Clone, Deserialize)]
pub struct MatchingSettings {
    #[serde(default = "default_radius_km")]
    pub radius_km: f64,
    #[serde(default = "default_min_results")]
    pub min_results: usize,
    #[serde(default = "default_max_results")]
    pub max_results: usize,
    #[serde(default = "default_user_region_distance_km")]
    pub user_region_distance_km: f64,
    #[serde(default = "default_provider_region_distance_km")]
    pub provider_region_distance_km: f64,
    /// Region reference set to load instead of the embedded one
    pub regions_path: Option<String>,
}

impl Default for MatchingSettings {
    fn default() -> Self {
        Self {
            radius_km: default_radius_km(),
            min_results: default_min_results(),
            max_results: default_max_results(),
            user_region_distance_km: default_user_region_distance_km(),
            provider_region_distance_km: default_provider_region_distance_km(),
            regions_path: None,
        }
    }
}

impl MatchingSettings {
    pub fn options(&self) -> MatchOptions {
        MatchOptions {
            radius_km: self.radius_km,
            min_results: self.min_results,
            max_results: self.max_results,
        }
    }
}

fn default_radius_km() -> f64 { MatchOptions::default().radius_km }
fn default_min_results() -> usize { MatchOptions::default().min_results }
fn default_max_results() -> usize { MatchOptions::default().max_results }
fn default_user_region_distance_km() -> f64 { DEFAULT_USER_REGION_DISTANCE_KM }
fn default_provider_region_distance_km() -> f64 { DEFAULT_PROVIDER_REGION_DISTANCE_KM }

#[derive(Debug, Clone, Deserialize)]
pub struct SearchSettings {
    #[serde(default = "default_max_search_time_secs")]
    pub max_search_time_secs: u32,
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,
    #[serde(default = "default_tick_ms")]
    pub tick_ms: u64,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    /// How long a settled search stays queryable before it is evicted
    #[serde(default = "default_retention_secs")]
    pub retention_secs: u64,
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            max_search_time_secs: default_max_search_time_secs(),
            retry_attempts: default_retry_attempts(),
            tick_ms: default_tick_ms(),
            poll_interval_ms: default_poll_interval_ms(),
            retry_delay_ms: default_retry_delay_ms(),
            retention_secs: default_retention_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
        }
    }
}

impl SearchSettings {
    /// Search limits used when a start request leaves them out
    pub fn defaults(&self) -> SearchConfig {
        SearchConfig {
            max_search_time_seconds: self.max_search_time_secs,
            retry_attempts: self.retry_attempts,
        }
    }

    pub fn timings(&self) -> SearchTimings {
        SearchTimings {
            tick: Duration::from_millis(self.tick_ms.max(1)),
            poll_interval: Duration::from_millis(self.poll_interval_ms.max(1)),
            retry_delay: Duration::from_millis(self.retry_delay_ms),
        }
    }

    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.retention_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs.max(1))
    }
}

fn default_max_search_time_secs() -> u32 { 60 }
fn default_retry_attempts() -> u32 { 3 }
fn default_tick_ms() -> u64 { 1000 }
fn default_poll_interval_ms() -> u64 { 2000 }
fn default_retry_delay_ms() -> u64 { 2000 }
fn default_retention_secs() -> u64 { 600 }
fn default_sweep_interval_secs() -> u64 { 60 }

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingSettings {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

fn default_log_level() -> String { "info".to_string() }
fn default_log_format() -> String { "json".to_string() }

impl Settings {
    /// Load configuration from file and environment variables
    ///
    /// Configuration is loaded in the following order (later overrides earlier):
    /// 1. Default values in the struct
    /// 2. Configuration file (config/default.toml)
    /// 3. Local overrides (config/local.toml)
    /// 4. Environment variables (prefixed with DISPATCH__)
    /// 5. Plain APPWRITE_* variables for the backend credentials
    pub fn load() -> Result<Self, ConfigError> {
        let settings = Config::builder()
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))
            // e.g., DISPATCH__SERVER__PORT -> server.port
            .add_source(dispatch_environment())
            .build()?;

        apply_appwrite_env(settings)?.try_deserialize()
    }

    /// Load configuration from a custom path
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let settings = Config::builder()
            .add_source(File::from(path.as_ref()))
            .add_source(dispatch_environment())
            .build()?;

        settings.try_deserialize()
    }
}

fn dispatch_environment() -> Environment {
    Environment::with_prefix("DISPATCH")
        .prefix_separator("__")
        .separator("__")
        .try_parsing(true)
}

/// Fill backend credentials from the variables the hosted backend's tooling exports
fn apply_appwrite_env(settings: Config) -> Result<Config, ConfigError> {
    use std::env;

    let overrides = [
        ("APPWRITE_ENDPOINT", "appwrite.endpoint"),
        ("APPWRITE_API_KEY", "appwrite.api_key"),
        ("APPWRITE_PROJECT_ID", "appwrite.project_id"),
        ("APPWRITE_DATABASE_ID", "appwrite.database_id"),
    ];

    let mut builder = Config::builder().add_source(settings.clone());
    for (var, key) in overrides {
        // Explicit DISPATCH__ settings win over the plain variables
        if settings.get_string(key).is_ok_and(|value| !value.is_empty()) {
            continue;
        }
        if let Ok(value) = env::var(var) {
            builder = builder.set_override(key, value)?;
        }
    }

    builder.build()
}
