use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Url};
use tracing::{debug, trace};

use crate::config::AppConfig;
use crate::errors::{AppError, AppResult};
use crate::model::{Coordinates, VenueSummary};

const USER_AGENT: &str = concat!("nightfeed/", env!("CARGO_PKG_VERSION"));
const DISCOVER_PATH: &str = "/api/venues/discover";

/// Parameters for one page of the discover endpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct PageQuery {
    pub city: String,
    pub coordinates: Coordinates,
    pub radius_meters: u32,
    pub skip: usize,
    pub limit: usize,
    pub category: Option<String>,
}

#[async_trait]
pub trait VenueSource: Send + Sync {
    async fn fetch_page(&self, query: &PageQuery) -> AppResult<Vec<VenueSummary>>;
}

pub struct HttpVenueClient {
    http: Client,
    base_url: String,
}

impl HttpVenueClient {
    pub fn new(config: &AppConfig) -> AppResult<Self> {
        let http = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_millis(config.http_timeout_ms))
            .build()?;
        Ok(Self {
            http,
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
        })
    }

    fn discover_url(&self, query: &PageQuery) -> AppResult<Url> {
        let mut url = Url::parse(&format!("{}{DISCOVER_PATH}", self.base_url))
            .map_err(|err| AppError::Config(format!("invalid venue api base url: {err}")))?;
        {
            let mut pairs = url.query_pairs_mut();
            pairs
                .append_pair("city", &query.city)
                .append_pair("lat", &query.coordinates.lat.to_string())
                .append_pair("lng", &query.coordinates.lng.to_string())
                .append_pair("radius", &query.radius_meters.to_string())
                .append_pair("skip", &query.skip.to_string())
                .append_pair("limit", &query.limit.to_string());
            if let Some(category) = &query.category {
                pairs.append_pair("category", category);
            }
        }
        Ok(url)
    }
}

#[async_trait]
impl VenueSource for HttpVenueClient {
    async fn fetch_page(&self, query: &PageQuery) -> AppResult<Vec<VenueSummary>> {
        let url = self.discover_url(query)?;
        trace!(target: "venue_api", %url, "requesting venue page");

        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|err| AppError::NetworkFailure(err.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(AppError::NetworkFailure(format!(
                "venue search returned {status}"
            )));
        }

        let body = response
            .bytes()
            .await
            .map_err(|err| AppError::NetworkFailure(err.to_string()))?;
        let venues: Vec<VenueSummary> = serde_json::from_slice(&body)
            .map_err(|err| AppError::MalformedResponse(err.to_string()))?;
        for venue in &venues {
            validate(venue)?;
        }

        debug!(
            target: "venue_api",
            city = %query.city,
            skip = query.skip,
            returned = venues.len(),
            "venue page received"
        );
        Ok(venues)
    }
}

fn validate(venue: &VenueSummary) -> AppResult<()> {
    if venue.id.trim().is_empty() {
        return Err(AppError::MalformedResponse("venue without id".into()));
    }
    if !venue.distance_meters.is_finite() || venue.distance_meters < 0.0 {
        return Err(AppError::MalformedResponse(format!(
            "venue {} has invalid distance {}",
            venue.id, venue.distance_meters
        )));
    }
    Ok(())
}
