use std::sync::Arc;

use async_trait::async_trait;
use httptest::matchers::{all_of, contains, request, url_decoded};
use httptest::responders::{cycle, json_encoded};
use httptest::{Expectation, Server};
use serde_json::{json, Value};
use tempfile::tempdir;

use nightfeed_lib::{
    AppConfig, AppResult, Coordinates, FeedStatus, GeocodedPlace, KeyValueStore, LocationProvider,
    LocationSource, MemoryStore, NightlifeSession, PermissionStatus, ResolverState,
    ReverseGeocoder, SqliteStore, SELECTED_CITY_KEY,
};

struct Device {
    granted: bool,
    fix: Coordinates,
}

#[async_trait]
impl LocationProvider for Device {
    async fn request_permission(&self) -> AppResult<PermissionStatus> {
        Ok(if self.granted {
            PermissionStatus::Granted
        } else {
            PermissionStatus::Denied
        })
    }

    async fn current_position(&self) -> AppResult<Coordinates> {
        Ok(self.fix)
    }
}

struct StaticGeocoder(Option<&'static str>);

#[async_trait]
impl ReverseGeocoder for StaticGeocoder {
    async fn reverse_geocode(&self, _: Coordinates) -> AppResult<Vec<GeocodedPlace>> {
        Ok(vec![GeocodedPlace {
            city: self.0.map(str::to_string),
            ..GeocodedPlace::default()
        }])
    }
}

fn venue_page(prefix: &str, count: usize) -> Value {
    Value::Array(
        (0..count)
            .map(|i| {
                json!({
                    "id": format!("{prefix}-{i}"),
                    "name": format!("{prefix} venue {i}"),
                    "distance": 150.0 * (i as f64 + 1.0),
                    "categories": ["Night Club"]
                })
            })
            .collect(),
    )
}

fn session(
    server: &Server,
    device: Device,
    geocoder: StaticGeocoder,
    store: Arc<dyn KeyValueStore>,
) -> NightlifeSession {
    let config = AppConfig {
        api_base_url: server.url("/").to_string(),
        ..AppConfig::default()
    };
    let venues = nightfeed_lib::HttpVenueClient::new(&config).expect("venue client");
    NightlifeSession::from_parts(
        config,
        Arc::new(device),
        Arc::new(geocoder),
        store,
        Arc::new(venues),
    )
}

#[tokio::test]
async fn denied_permission_waits_for_pick_then_loads_feed() {
    let server = Server::run();
    server.expect(
        Expectation::matching(all_of![
            request::method_path("GET", "/api/venues/discover"),
            request::query(url_decoded(contains(("city", "Los Angeles")))),
            request::query(url_decoded(contains(("lat", "34.0522")))),
            request::query(url_decoded(contains(("lng", "-118.2437")))),
            request::query(url_decoded(contains(("skip", "0")))),
            request::query(url_decoded(contains(("limit", "10")))),
        ])
        .respond_with(json_encoded(venue_page("la", 10))),
    );
    server.expect(
        Expectation::matching(all_of![
            request::method_path("GET", "/api/venues/discover"),
            request::query(url_decoded(contains(("skip", "10")))),
        ])
        .respond_with(json_encoded(venue_page("la-more", 4))),
    );

    let dir = tempdir().unwrap();
    let store = Arc::new(SqliteStore::open(dir.path(), "session.db").expect("store"));
    let session = session(
        &server,
        Device {
            granted: false,
            fix: Coordinates::new(0.0, 0.0),
        },
        StaticGeocoder(None),
        store.clone(),
    );

    assert_eq!(session.start().await, ResolverState::AwaitingManualPick);
    assert_eq!(session.feed().snapshot().status, FeedStatus::Idle);
    assert!(session.location_context().location().is_none());

    let picked = session.pick_city("Los Angeles").await.expect("pick");
    assert_eq!(picked.source, LocationSource::ManualPick);
    let snapshot = session.feed().snapshot();
    assert_eq!(snapshot.status, FeedStatus::Idle);
    assert_eq!(snapshot.next_offset, 10);

    session.feed().load_more().await;
    let snapshot = session.feed().snapshot();
    assert_eq!(snapshot.items.len(), 14);
    assert_eq!(snapshot.status, FeedStatus::Exhausted);

    assert_eq!(
        store.get(SELECTED_CITY_KEY).await.unwrap().as_deref(),
        Some("Los Angeles")
    );
}

#[tokio::test]
async fn gps_session_queries_live_coordinates() {
    let server = Server::run();
    server.expect(
        Expectation::matching(all_of![
            request::method_path("GET", "/api/venues/discover"),
            request::query(url_decoded(contains(("city", "Los Angeles")))),
            request::query(url_decoded(contains(("lat", "34.0928")))),
            request::query(url_decoded(contains(("lng", "-118.3287")))),
        ])
        .respond_with(json_encoded(venue_page("gps", 2))),
    );

    let session = session(
        &server,
        Device {
            granted: true,
            fix: Coordinates::new(34.0928, -118.3287),
        },
        StaticGeocoder(None),
        Arc::new(MemoryStore::new()),
    );

    let state = session.start().await;
    let location = state.location().expect("resolved");
    assert_eq!(location.source, LocationSource::Gps);
    assert_eq!(location.city, "Los Angeles");

    let snapshot = session.feed().snapshot();
    assert_eq!(snapshot.items.len(), 2);
    assert_eq!(snapshot.status, FeedStatus::Exhausted);
    assert_eq!(snapshot.location.as_ref(), Some(location));
}

#[tokio::test]
async fn stored_city_is_used_when_permission_denied() {
    let server = Server::run();
    server.expect(
        Expectation::matching(all_of![
            request::method_path("GET", "/api/venues/discover"),
            request::query(url_decoded(contains(("city", "Scottsdale")))),
            request::query(url_decoded(contains(("skip", "0")))),
        ])
        .times(2)
        .respond_with(cycle![
            json_encoded(venue_page("az-all", 10)),
            json_encoded(venue_page("az", 1)),
        ]),
    );

    let session = session(
        &server,
        Device {
            granted: false,
            fix: Coordinates::new(0.0, 0.0),
        },
        StaticGeocoder(Some("Ignored")),
        Arc::new(MemoryStore::with_entry(SELECTED_CITY_KEY, "Scottsdale")),
    );

    let state = session.start().await;
    assert_eq!(
        state.location().map(|l| l.source),
        Some(LocationSource::StoredPreference)
    );
    assert_eq!(session.feed().snapshot().items.len(), 10);

    session.feed().set_filter(Some("Karaoke".into())).await;
    let snapshot = session.feed().snapshot();
    assert_eq!(snapshot.items.len(), 1);
    assert_eq!(snapshot.items[0].id, "az-0");
    assert_eq!(snapshot.active_filter.as_deref(), Some("Karaoke"));
}

#[tokio::test]
async fn feed_tracks_location_context_through_manual_pick() {
    let server = Server::run();
    server.expect(
        Expectation::matching(all_of![
            request::method_path("GET", "/api/venues/discover"),
            request::query(url_decoded(contains(("city", "San Francisco")))),
            request::query(url_decoded(contains(("skip", "0")))),
        ])
        .respond_with(json_encoded(venue_page("sf", 3))),
    );

    let session = session(
        &server,
        Device {
            granted: false,
            fix: Coordinates::new(0.0, 0.0),
        },
        StaticGeocoder(None),
        Arc::new(MemoryStore::new()),
    );
    let context = session.location_context();
    assert_eq!(context.current(), ResolverState::Checking);

    tokio::select! {
        _ = session.follow_location() => panic!("feed stopped following the resolver"),
        _ = async {
            assert_eq!(
                session.resolver().begin().await,
                ResolverState::AwaitingManualPick
            );
            tokio::task::yield_now().await;
            assert_eq!(context.current(), ResolverState::AwaitingManualPick);
            assert_eq!(session.feed().snapshot().status, FeedStatus::Idle);

            session.resolver().pick_city("san francisco").await.expect("pick");
            let mut snapshots = session.feed().subscribe();
            snapshots
                .wait_for(|snapshot| snapshot.status == FeedStatus::Exhausted)
                .await
                .expect("feed snapshot");
        } => {}
    }

    let snapshot = session.feed().snapshot();
    assert_eq!(snapshot.items.len(), 3);
    assert_eq!(snapshot.location, context.location());
    assert_eq!(
        context.location().map(|l| l.source),
        Some(LocationSource::ManualPick)
    );
}
