//! Capabilities supplied by the host platform.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::errors::AppResult;
use crate::model::Coordinates;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionStatus {
    Granted,
    Denied,
}

/// One candidate returned by reverse geocoding, most relevant first.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GeocodedPlace {
    pub city: Option<String>,
    pub region: Option<String>,
    pub country: Option<String>,
}

#[async_trait]
pub trait LocationProvider: Send + Sync {
    /// Prompts for foreground location access if it has not been decided yet.
    async fn request_permission(&self) -> AppResult<PermissionStatus>;

    /// Current position using the platform's highest-accuracy hint.
    async fn current_position(&self) -> AppResult<Coordinates>;
}

#[async_trait]
pub trait ReverseGeocoder: Send + Sync {
    async fn reverse_geocode(&self, coordinates: Coordinates) -> AppResult<Vec<GeocodedPlace>>;
}
