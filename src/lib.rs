mod cities;
mod config;
mod device;
mod errors;
mod feed;
mod geocode;
mod model;
mod resolver;
mod store;
mod venues;

use std::path::Path;
use std::sync::Arc;

use once_cell::sync::OnceCell;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub use cities::{lookup_city, supported_city_names, SupportedCity, SUPPORTED_CITIES};
pub use config::{AppConfig, PAGE_SIZE};
pub use device::{GeocodedPlace, LocationProvider, PermissionStatus, ReverseGeocoder};
pub use errors::{AppError, AppResult, FailureKind};
pub use feed::{FeedSnapshot, FeedStatus, VenueFeedController};
pub use geocode::NominatimGeocoder;
pub use model::{Coordinates, LocationSource, ResolvedLocation, VenueSummary, VENUE_CATEGORIES};
pub use resolver::{LocationContext, LocationResolver, ResolverState};
pub use store::{KeyValueStore, MemoryStore, SqliteStore, SELECTED_CITY_KEY};
pub use venues::{HttpVenueClient, PageQuery, VenueSource};

/// Location resolver and venue feed for one screen session.
pub struct NightlifeSession {
    config: AppConfig,
    resolver: LocationResolver,
    feed: VenueFeedController,
}

impl NightlifeSession {
    /// Builds the production stack: sqlite preferences under `data_dir`,
    /// Nominatim reverse geocoding and the HTTP venue backend.
    pub fn initialize(data_dir: &Path, provider: Arc<dyn LocationProvider>) -> AppResult<Self> {
        init_tracing();
        let config = AppConfig::from_env();
        let store = SqliteStore::open(data_dir, &config.database_file_name)?;
        let geocoder = NominatimGeocoder::new(&config)?;
        let venues = HttpVenueClient::new(&config)?;
        info!(
            api = %config.api_base_url,
            default_city = %config.default_city,
            "nightlife session initialized"
        );
        Ok(Self::from_parts(
            config,
            provider,
            Arc::new(geocoder),
            Arc::new(store),
            Arc::new(venues),
        ))
    }

    pub fn from_parts(
        config: AppConfig,
        provider: Arc<dyn LocationProvider>,
        geocoder: Arc<dyn ReverseGeocoder>,
        store: Arc<dyn KeyValueStore>,
        venues: Arc<dyn VenueSource>,
    ) -> Self {
        let resolver = LocationResolver::new(provider, geocoder, store, &config);
        let feed = VenueFeedController::new(venues, &config);
        Self {
            config,
            resolver,
            feed,
        }
    }

    /// Resolves the session location and loads the first page for it.
    pub async fn start(&self) -> ResolverState {
        let state = self.resolver.begin().await;
        self.feed.apply_resolver_state(&state).await;
        state
    }

    pub async fn pick_city(&self, city_name: &str) -> AppResult<ResolvedLocation> {
        let location = self.resolver.pick_city(city_name).await?;
        self.feed.set_location(location.clone()).await;
        Ok(location)
    }

    /// Keeps the feed keyed to the resolver's published location. Runs for
    /// the life of the session, so hosts drive it alongside `begin` and
    /// `pick_city` on the resolver.
    pub async fn follow_location(&self) {
        self.feed.follow(self.resolver.context().subscribe()).await;
    }

    pub fn resolver(&self) -> &LocationResolver {
        &self.resolver
    }

    pub fn feed(&self) -> &VenueFeedController {
        &self.feed
    }

    pub fn location_context(&self) -> LocationContext {
        self.resolver.context()
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }
}

pub fn init_tracing() {
    static INIT: OnceCell<()> = OnceCell::new();
    let _ = INIT.get_or_init(|| {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("info,location_resolver=debug,venue_feed=debug"));
        let _ = tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .try_init();
    });
}
