use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::Deserialize;
use tracing::{debug, trace};

use crate::config::AppConfig;
use crate::device::{GeocodedPlace, ReverseGeocoder};
use crate::errors::{AppError, AppResult};
use crate::model::Coordinates;

const USER_AGENT: &str = concat!("nightfeed/", env!("CARGO_PKG_VERSION"));
// City-level detail.
const REVERSE_ZOOM: &str = "10";

/// Reverse geocoder backed by a Nominatim-compatible `/reverse` endpoint.
pub struct NominatimGeocoder {
    http: Client,
    base_url: String,
}

#[derive(Deserialize)]
struct ReverseResponse {
    error: Option<String>,
    address: Option<ReverseAddress>,
}

#[derive(Deserialize)]
struct ReverseAddress {
    city: Option<String>,
    town: Option<String>,
    village: Option<String>,
    state: Option<String>,
    country: Option<String>,
}

impl NominatimGeocoder {
    pub fn new(config: &AppConfig) -> AppResult<Self> {
        let http = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_millis(config.http_timeout_ms))
            .build()?;
        Ok(Self {
            http,
            base_url: config.geocoder_base_url.trim_end_matches('/').to_string(),
        })
    }

    fn reverse_url(&self, coordinates: Coordinates) -> AppResult<Url> {
        let mut url = Url::parse(&format!("{}/reverse", self.base_url))
            .map_err(|err| AppError::Config(format!("invalid geocoder base url: {err}")))?;
        url.query_pairs_mut()
            .append_pair("format", "jsonv2")
            .append_pair("lat", &coordinates.lat.to_string())
            .append_pair("lon", &coordinates.lng.to_string())
            .append_pair("zoom", REVERSE_ZOOM)
            .append_pair("addressdetails", "1");
        Ok(url)
    }
}

#[async_trait]
impl ReverseGeocoder for NominatimGeocoder {
    async fn reverse_geocode(&self, coordinates: Coordinates) -> AppResult<Vec<GeocodedPlace>> {
        let url = self.reverse_url(coordinates)?;
        trace!(target: "geocoder", %url, "reverse geocoding position");

        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|err| AppError::GeocodeFailed(err.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(AppError::GeocodeFailed(format!(
                "geocoder returned {status}"
            )));
        }
        let parsed: ReverseResponse = response
            .json()
            .await
            .map_err(|err| AppError::GeocodeFailed(err.to_string()))?;

        if let Some(reason) = parsed.error {
            debug!(target: "geocoder", %reason, "no place at position");
            return Ok(Vec::new());
        }

        Ok(parsed
            .address
            .map(|address| GeocodedPlace {
                city: address.city.or(address.town).or(address.village),
                region: address.state,
                country: address.country,
            })
            .into_iter()
            .collect())
    }
}
