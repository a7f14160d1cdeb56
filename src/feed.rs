use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::config::{AppConfig, PAGE_SIZE};
use crate::errors::FailureKind;
use crate::model::{ResolvedLocation, VenueSummary};
use crate::resolver::ResolverState;
use crate::venues::{PageQuery, VenueSource};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedStatus {
    Idle,
    Loading,
    Refreshing,
    LoadingMore,
    Error,
    Exhausted,
}

/// Render-ready copy of the feed published after every change.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeedSnapshot {
    pub location: Option<ResolvedLocation>,
    pub items: Vec<VenueSummary>,
    pub active_filter: Option<String>,
    pub status: FeedStatus,
    pub next_offset: usize,
    pub last_error: Option<FailureKind>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FetchKind {
    Initial,
    Refresh,
    More,
}

/// Identifies one issued request. `session` changes with the location/filter
/// key, `request` with every fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FetchTicket {
    session: u64,
    request: u64,
    kind: FetchKind,
    offset: usize,
}

struct FeedPage {
    items: Vec<VenueSummary>,
    requested_offset: usize,
    returned_count: usize,
}

struct FeedState {
    location: Option<ResolvedLocation>,
    filter: Option<String>,
    items: Vec<VenueSummary>,
    seen: HashSet<String>,
    status: FeedStatus,
    next_offset: usize,
    last_page_full: bool,
    last_error: Option<FailureKind>,
    session: u64,
    issued: u64,
    in_flight: Option<FetchTicket>,
}

impl FeedState {
    fn new() -> Self {
        Self {
            location: None,
            filter: None,
            items: Vec::new(),
            seen: HashSet::new(),
            status: FeedStatus::Idle,
            next_offset: 0,
            last_page_full: false,
            last_error: None,
            session: 0,
            issued: 0,
            in_flight: None,
        }
    }

    fn snapshot(&self) -> FeedSnapshot {
        FeedSnapshot {
            location: self.location.clone(),
            items: self.items.clone(),
            active_filter: self.filter.clone(),
            status: self.status,
            next_offset: self.next_offset,
            last_error: self.last_error,
        }
    }

    /// Starts a new location/filter session and issues its first page if a
    /// location is known.
    fn rekey(&mut self) -> Option<FetchTicket> {
        self.session += 1;
        self.items.clear();
        self.seen.clear();
        self.next_offset = 0;
        self.last_page_full = false;
        self.last_error = None;
        self.in_flight = None;
        if self.location.is_none() {
            self.status = FeedStatus::Idle;
            return None;
        }
        self.status = FeedStatus::Loading;
        Some(self.issue(FetchKind::Initial, 0))
    }

    fn issue(&mut self, kind: FetchKind, offset: usize) -> FetchTicket {
        self.issued += 1;
        let ticket = FetchTicket {
            session: self.session,
            request: self.issued,
            kind,
            offset,
        };
        self.in_flight = Some(ticket);
        ticket
    }

    fn apply_page(&mut self, kind: FetchKind, page: FeedPage, page_size: usize) {
        if kind != FetchKind::More {
            self.items.clear();
            self.seen.clear();
        }
        let before = self.items.len();
        for venue in page.items {
            if self.seen.insert(venue.id.clone()) {
                self.items.push(venue);
            }
        }
        let duplicates = page.returned_count - (self.items.len() - before);
        if duplicates > 0 {
            debug!(
                target: "venue_feed",
                duplicates,
                offset = page.requested_offset,
                "dropped repeated venues"
            );
        }

        self.next_offset = match kind {
            FetchKind::More => self.next_offset + page.returned_count,
            FetchKind::Initial | FetchKind::Refresh => page.returned_count,
        };
        self.last_page_full = page.returned_count >= page_size;
        self.last_error = None;
        self.status = if self.last_page_full {
            FeedStatus::Idle
        } else {
            FeedStatus::Exhausted
        };
    }
}

/// Paginated venue list keyed by `(location, filter)`.
///
/// Methods take `&self` and may be driven concurrently from one task; state is
/// only touched between suspension points. A response is applied only while
/// its request is still the one in flight, so results for a superseded key or
/// a superseded request are dropped on arrival.
pub struct VenueFeedController {
    source: Arc<dyn VenueSource>,
    radius_meters: u32,
    page_size: usize,
    state: Mutex<FeedState>,
    snapshots: watch::Sender<FeedSnapshot>,
}

impl VenueFeedController {
    pub fn new(source: Arc<dyn VenueSource>, config: &AppConfig) -> Self {
        let state = FeedState::new();
        let (snapshots, _) = watch::channel(state.snapshot());
        Self {
            source,
            radius_meters: config.search_radius_meters,
            page_size: PAGE_SIZE,
            state: Mutex::new(state),
            snapshots,
        }
    }

    pub fn snapshot(&self) -> FeedSnapshot {
        self.snapshots.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<FeedSnapshot> {
        self.snapshots.subscribe()
    }

    pub async fn set_location(&self, location: ResolvedLocation) {
        let ticket = {
            let mut state = self.state.lock();
            if state
                .location
                .as_ref()
                .is_some_and(|current| current.same_place(&location))
            {
                return;
            }
            info!(
                target: "venue_feed",
                city = %location.city,
                source = location.source.as_str(),
                "feed location changed"
            );
            state.location = Some(location);
            let ticket = state.rekey();
            self.publish(&state);
            ticket
        };
        if let Some(ticket) = ticket {
            self.run(ticket).await;
        }
    }

    /// Sets the category filter; blank strings clear it.
    pub async fn set_filter(&self, filter: Option<String>) {
        let filter = filter
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty());
        let ticket = {
            let mut state = self.state.lock();
            if state.filter == filter {
                return;
            }
            debug!(target: "venue_feed", filter = ?filter, "feed filter changed");
            state.filter = filter;
            let ticket = state.rekey();
            self.publish(&state);
            ticket
        };
        if let Some(ticket) = ticket {
            self.run(ticket).await;
        }
    }

    /// Selects `category`, or clears the filter when it is already the
    /// selected one.
    pub async fn toggle_filter(&self, category: &str) {
        let selected = self.state.lock().filter.as_deref() == Some(category.trim());
        let next = (!selected).then(|| category.to_string());
        self.set_filter(next).await;
    }

    /// Reloads the first page and replaces the list with it.
    pub async fn refresh(&self) {
        let ticket = {
            let mut state = self.state.lock();
            if state.location.is_none()
                || matches!(state.status, FeedStatus::Loading | FeedStatus::Refreshing)
            {
                debug!(target: "venue_feed", status = ?state.status, "refresh ignored");
                return;
            }
            state.status = FeedStatus::Refreshing;
            let ticket = state.issue(FetchKind::Refresh, 0);
            self.publish(&state);
            ticket
        };
        self.run(ticket).await;
    }

    /// Appends the next page when the previous one was full.
    pub async fn load_more(&self) {
        let ticket = {
            let mut state = self.state.lock();
            if state.status != FeedStatus::Idle || !state.last_page_full {
                debug!(target: "venue_feed", status = ?state.status, "load more ignored");
                return;
            }
            state.status = FeedStatus::LoadingMore;
            let offset = state.next_offset;
            let ticket = state.issue(FetchKind::More, offset);
            self.publish(&state);
            ticket
        };
        self.run(ticket).await;
    }

    /// Re-keys the feed when the resolver settles on a location. Other states
    /// leave the feed untouched, so nothing is fetched without a location.
    pub async fn apply_resolver_state(&self, resolver_state: &ResolverState) {
        if let ResolverState::Resolved(location) = resolver_state {
            self.set_location(location.clone()).await;
        }
    }

    /// Tracks a resolver until its sender goes away.
    ///
    /// A newly published location is applied immediately, even while the
    /// page for the previous one is still pending; that page is dropped.
    pub async fn follow(&self, mut updates: watch::Receiver<ResolverState>) {
        let mut latest = updates.borrow_and_update().clone();
        let mut closed = false;
        loop {
            let next = {
                let apply = self.apply_resolver_state(&latest);
                tokio::pin!(apply);
                loop {
                    tokio::select! {
                        _ = &mut apply => break None,
                        changed = updates.changed(), if !closed => {
                            if changed.is_err() {
                                closed = true;
                                continue;
                            }
                            let next = updates.borrow_and_update().clone();
                            if self.is_new_location(&next) {
                                break Some(next);
                            }
                        }
                    }
                }
            };
            latest = match next {
                Some(next) => {
                    debug!(target: "venue_feed", "location changed while a page was pending");
                    next
                }
                None if closed => break,
                None => {
                    if updates.changed().await.is_err() {
                        break;
                    }
                    updates.borrow_and_update().clone()
                }
            };
        }
    }

    fn is_new_location(&self, resolver_state: &ResolverState) -> bool {
        let Some(location) = resolver_state.location() else {
            return false;
        };
        !self
            .state
            .lock()
            .location
            .as_ref()
            .is_some_and(|current| current.same_place(location))
    }

    async fn run(&self, ticket: FetchTicket) {
        let Some(query) = self.query_for(&ticket) else {
            return;
        };
        let result = self.source.fetch_page(&query).await;

        let mut state = self.state.lock();
        if state.in_flight != Some(ticket) {
            debug!(
                target: "venue_feed",
                session = ticket.session,
                request = ticket.request,
                current_session = state.session,
                "discarding stale venue page"
            );
            return;
        }
        state.in_flight = None;

        match result {
            Ok(items) => {
                let returned_count = items.len();
                let page = FeedPage {
                    items,
                    requested_offset: ticket.offset,
                    returned_count,
                };
                state.apply_page(ticket.kind, page, self.page_size);
                debug!(
                    target: "venue_feed",
                    returned = returned_count,
                    total = state.items.len(),
                    next_offset = state.next_offset,
                    status = ?state.status,
                    "venue page applied"
                );
            }
            Err(err) => {
                warn!(
                    target: "venue_feed",
                    error = %err,
                    kind = err.kind().as_str(),
                    "venue fetch failed; keeping current list"
                );
                state.status = FeedStatus::Error;
                state.last_error = Some(err.kind());
            }
        }
        self.publish(&state);
    }

    fn query_for(&self, ticket: &FetchTicket) -> Option<PageQuery> {
        let state = self.state.lock();
        let location = state.location.as_ref()?;
        Some(PageQuery {
            city: location.city.clone(),
            coordinates: location.coordinates,
            radius_meters: self.radius_meters,
            skip: ticket.offset,
            limit: self.page_size,
            category: state.filter.clone(),
        })
    }

    fn publish(&self, state: &FeedState) {
        self.snapshots.send_replace(state.snapshot());
    }
}
