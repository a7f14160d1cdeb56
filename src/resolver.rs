//! Session location resolution.
//!
//! Flow: permission → position fix → reverse geocode → stored preference →
//! manual pick. Every failure falls through to the next strategy; nothing is
//! returned to the caller as an error except an unsupported `pick_city` name.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::cities::lookup_city;
use crate::config::AppConfig;
use crate::device::{GeocodedPlace, LocationProvider, PermissionStatus, ReverseGeocoder};
use crate::errors::{AppError, AppResult, FailureKind};
use crate::model::{Coordinates, LocationSource, ResolvedLocation};
use crate::store::{KeyValueStore, SELECTED_CITY_KEY};

#[derive(Debug, Clone, PartialEq)]
pub enum ResolverState {
    Checking,
    Resolved(ResolvedLocation),
    AwaitingManualPick,
}

impl ResolverState {
    pub fn location(&self) -> Option<&ResolvedLocation> {
        match self {
            ResolverState::Resolved(location) => Some(location),
            _ => None,
        }
    }
}

/// Read-only view of the resolver's output shared with feed and screens.
#[derive(Clone)]
pub struct LocationContext {
    updates: watch::Receiver<ResolverState>,
}

impl LocationContext {
    pub fn current(&self) -> ResolverState {
        self.updates.borrow().clone()
    }

    pub fn location(&self) -> Option<ResolvedLocation> {
        self.updates.borrow().location().cloned()
    }

    pub fn subscribe(&self) -> watch::Receiver<ResolverState> {
        self.updates.clone()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Step {
    RequestPermission,
    AcquirePosition,
    ReverseGeocode(Coordinates),
    ReadStoredPreference,
    Finish(ResolverState),
}

pub struct LocationResolver {
    provider: Arc<dyn LocationProvider>,
    geocoder: Arc<dyn ReverseGeocoder>,
    store: Arc<dyn KeyValueStore>,
    default_city: String,
    fallback_to_default_city: bool,
    position_timeout: Duration,
    state: watch::Sender<ResolverState>,
    attempt: AtomicU64,
    absorbed: Mutex<Vec<FailureKind>>,
}

impl LocationResolver {
    pub fn new(
        provider: Arc<dyn LocationProvider>,
        geocoder: Arc<dyn ReverseGeocoder>,
        store: Arc<dyn KeyValueStore>,
        config: &AppConfig,
    ) -> Self {
        let (state, _) = watch::channel(ResolverState::Checking);
        Self {
            provider,
            geocoder,
            store,
            default_city: config.default_city.clone(),
            fallback_to_default_city: config.fallback_to_default_city,
            position_timeout: Duration::from_millis(config.position_timeout_ms),
            state,
            attempt: AtomicU64::new(0),
            absorbed: Mutex::new(Vec::new()),
        }
    }

    pub fn context(&self) -> LocationContext {
        LocationContext {
            updates: self.state.subscribe(),
        }
    }

    pub fn state(&self) -> ResolverState {
        self.state.borrow().clone()
    }

    /// Failures recovered during the most recent `begin`.
    pub fn absorbed_failures(&self) -> Vec<FailureKind> {
        self.absorbed.lock().clone()
    }

    /// Runs the fallback chain and returns the state it settled on.
    ///
    /// A `pick_city` issued while this is suspended wins; the chain's own
    /// result is then dropped and the manual pick is returned.
    pub async fn begin(&self) -> ResolverState {
        let attempt = self.attempt.fetch_add(1, Ordering::SeqCst) + 1;
        self.absorbed.lock().clear();
        self.state.send_replace(ResolverState::Checking);
        debug!(target: "location_resolver", attempt, "resolution started");

        let mut step = Step::RequestPermission;
        loop {
            step = match step {
                Step::Finish(state) => return self.publish(attempt, state),
                pending => self.advance(pending).await,
            };
            if self.is_superseded(attempt) {
                debug!(
                    target: "location_resolver",
                    attempt,
                    "resolution superseded; discarding result"
                );
                return self.state();
            }
        }
    }

    /// Resolves to one of the supported cities and remembers the choice.
    pub async fn pick_city(&self, city_name: &str) -> AppResult<ResolvedLocation> {
        let city = lookup_city(city_name)
            .ok_or_else(|| AppError::UnknownCity(city_name.trim().to_string()))?;
        self.attempt.fetch_add(1, Ordering::SeqCst);

        let location = city.resolved(LocationSource::ManualPick);
        self.state
            .send_replace(ResolverState::Resolved(location.clone()));
        info!(target: "location_resolver", city = city.name, "city picked manually");

        if let Err(err) = self.store.set(SELECTED_CITY_KEY, city.name).await {
            warn!(
                target: "location_resolver",
                error = %err,
                "failed to persist selected city"
            );
            self.absorbed.lock().push(err.kind());
        }
        Ok(location)
    }

    pub(crate) async fn advance(&self, step: Step) -> Step {
        match step {
            Step::RequestPermission => match self.provider.request_permission().await {
                Ok(PermissionStatus::Granted) => Step::AcquirePosition,
                Ok(PermissionStatus::Denied) => {
                    self.absorb(&AppError::PermissionDenied);
                    Step::ReadStoredPreference
                }
                Err(err) => {
                    self.absorb(&err);
                    Step::ReadStoredPreference
                }
            },
            Step::AcquirePosition => {
                match timeout(self.position_timeout, self.provider.current_position()).await {
                    Ok(Ok(coordinates)) if coordinates.is_finite() => {
                        Step::ReverseGeocode(coordinates)
                    }
                    Ok(Ok(coordinates)) => {
                        self.absorb(&AppError::PositionUnavailable(format!(
                            "non-finite fix {}, {}",
                            coordinates.lat, coordinates.lng
                        )));
                        Step::ReadStoredPreference
                    }
                    Ok(Err(err)) => {
                        self.absorb(&err);
                        Step::ReadStoredPreference
                    }
                    Err(_) => {
                        self.absorb(&AppError::PositionUnavailable(format!(
                            "no fix within {:?}",
                            self.position_timeout
                        )));
                        Step::ReadStoredPreference
                    }
                }
            }
            Step::ReverseGeocode(coordinates) => {
                match self.geocoder.reverse_geocode(coordinates).await {
                    Ok(places) => Step::Finish(ResolverState::Resolved(ResolvedLocation {
                        city: city_from_places(&places, &self.default_city),
                        coordinates,
                        source: LocationSource::Gps,
                    })),
                    Err(err) => {
                        self.absorb(&err);
                        Step::ReadStoredPreference
                    }
                }
            }
            Step::ReadStoredPreference => Step::Finish(self.stored_preference().await),
            finished @ Step::Finish(_) => finished,
        }
    }

    async fn stored_preference(&self) -> ResolverState {
        match self.store.get(SELECTED_CITY_KEY).await {
            Ok(Some(stored)) => match lookup_city(&stored) {
                Some(city) => {
                    return ResolverState::Resolved(city.resolved(LocationSource::StoredPreference))
                }
                None => warn!(
                    target: "location_resolver",
                    stored = %stored,
                    "stored city is not supported; ignoring"
                ),
            },
            Ok(None) => {}
            Err(err) => self.absorb(&err),
        }
        self.without_preference()
    }

    fn without_preference(&self) -> ResolverState {
        if self.fallback_to_default_city {
            if let Some(city) = lookup_city(&self.default_city) {
                return ResolverState::Resolved(city.resolved(LocationSource::Fallback));
            }
            warn!(
                target: "location_resolver",
                default_city = %self.default_city,
                "default city is not in the supported list"
            );
        }
        ResolverState::AwaitingManualPick
    }

    fn publish(&self, attempt: u64, state: ResolverState) -> ResolverState {
        if self.is_superseded(attempt) {
            return self.state();
        }
        match &state {
            ResolverState::Resolved(location) => info!(
                target: "location_resolver",
                city = %location.city,
                source = location.source.as_str(),
                "location resolved"
            ),
            _ => info!(target: "location_resolver", "awaiting manual city pick"),
        }
        self.state.send_replace(state.clone());
        state
    }

    fn is_superseded(&self, attempt: u64) -> bool {
        self.attempt.load(Ordering::SeqCst) != attempt
    }

    fn absorb(&self, err: &AppError) {
        warn!(
            target: "location_resolver",
            error = %err,
            kind = err.kind().as_str(),
            "falling back"
        );
        self.absorbed.lock().push(err.kind());
    }
}

/// City of the first candidate, or `default_city` when it has none.
fn city_from_places(places: &[GeocodedPlace], default_city: &str) -> String {
    places
        .first()
        .and_then(|place| place.city.as_deref())
        .map(str::trim)
        .filter(|city| !city.is_empty())
        .unwrap_or(default_city)
        .to_string()
}
