use std::{env, io};

use serde::Serialize;
use tracing::debug;

/// Number of venues requested per feed page.
pub const PAGE_SIZE: usize = 10;

const DEFAULT_API_BASE_URL: &str = "http://127.0.0.1:8000";
const DEFAULT_GEOCODER_BASE_URL: &str = "https://nominatim.openstreetmap.org";
const DEFAULT_CITY: &str = "Los Angeles";
// Ten miles.
const DEFAULT_SEARCH_RADIUS_METERS: u32 = 16_093;
const DEFAULT_HTTP_TIMEOUT_MS: u64 = 10_000;
const DEFAULT_POSITION_TIMEOUT_MS: u64 = 15_000;
const DEFAULT_DATABASE_FILE_NAME: &str = "nightfeed.db";

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct AppConfig {
    pub api_base_url: String,
    pub geocoder_base_url: String,
    pub default_city: String,
    pub search_radius_meters: u32,
    pub http_timeout_ms: u64,
    pub position_timeout_ms: u64,
    pub database_file_name: String,
    pub fallback_to_default_city: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            geocoder_base_url: DEFAULT_GEOCODER_BASE_URL.to_string(),
            default_city: DEFAULT_CITY.to_string(),
            search_radius_meters: DEFAULT_SEARCH_RADIUS_METERS,
            http_timeout_ms: DEFAULT_HTTP_TIMEOUT_MS,
            position_timeout_ms: DEFAULT_POSITION_TIMEOUT_MS,
            database_file_name: DEFAULT_DATABASE_FILE_NAME.to_string(),
            fallback_to_default_city: false,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        load_dotenv_if_applicable();
        Self {
            api_base_url: parse_url("VENUE_API_BASE_URL", DEFAULT_API_BASE_URL),
            geocoder_base_url: parse_url("GEOCODER_BASE_URL", DEFAULT_GEOCODER_BASE_URL),
            default_city: env::var("DEFAULT_CITY")
                .ok()
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| DEFAULT_CITY.to_string()),
            search_radius_meters: parse_u32("SEARCH_RADIUS_METERS", DEFAULT_SEARCH_RADIUS_METERS)
                .max(1),
            http_timeout_ms: parse_u64("HTTP_TIMEOUT_MS", DEFAULT_HTTP_TIMEOUT_MS),
            position_timeout_ms: parse_u64("POSITION_TIMEOUT_MS", DEFAULT_POSITION_TIMEOUT_MS),
            database_file_name: env::var("DATABASE_FILE_NAME")
                .unwrap_or_else(|_| DEFAULT_DATABASE_FILE_NAME.to_string()),
            fallback_to_default_city: parse_bool("FALLBACK_TO_DEFAULT_CITY", false),
        }
    }
}

fn load_dotenv_if_applicable() {
    if !should_load_dotenv() {
        debug!("skipping .env load outside dev mode");
        return;
    }

    if let Err(err) = dotenvy::dotenv() {
        match &err {
            dotenvy::Error::Io(io_err) if io_err.kind() == io::ErrorKind::NotFound => {}
            _ => debug!(?err, "unable to load .env file"),
        }
    }
}

fn should_load_dotenv() -> bool {
    cfg!(debug_assertions) || parse_bool("ALLOW_DOTENV", false)
}

fn parse_url(key: &str, default: &str) -> String {
    env::var(key)
        .ok()
        .map(|v| v.trim().trim_end_matches('/').to_string())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn parse_bool(key: &str, default: bool) -> bool {
    env::var(key)
        .map(|v| matches!(v.trim(), "1" | "true" | "TRUE" | "True"))
        .unwrap_or(default)
}

fn parse_u64(key: &str, default: u64) -> u64 {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse::<u64>().ok())
        .unwrap_or(default)
}

fn parse_u32(key: &str, default: u32) -> u32 {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse::<u32>().ok())
        .unwrap_or(default)
}
