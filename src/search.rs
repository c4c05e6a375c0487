//! Search orchestration: criteria in, ranked events out.
//!
//! State is published through a `watch` channel. Each call to
//! [`SearchOrchestrator::search`] takes a new request token inside the
//! channel's lock; a completion is applied only while its token is still
//! the latest, so an older call finishing late never overwrites a newer one.

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::adapter::{AdaptError, EventAdapter};
use crate::backend::{iso_timestamp, BackendError, HealthStatus, SearchBackend, SearchRequest};
use crate::criteria::{SearchCriteria, SearchParams};
use crate::models::{rank, Event};

#[derive(Debug, Error)]
pub enum SearchError {
    #[error("Invalid search criteria")]
    InvalidCriteria,
    #[error(transparent)]
    Backend(#[from] BackendError),
    #[error(transparent)]
    Adapt(#[from] AdaptError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchStatus {
    Idle,
    Loading,
    Success,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchSnapshot {
    pub status: SearchStatus,
    pub events: Vec<Event>,
    pub error: Option<String>,
    /// Token of the most recent request; zero before the first search.
    pub request: u64,
}

impl Default for SearchSnapshot {
    fn default() -> Self {
        Self {
            status: SearchStatus::Idle,
            events: Vec::new(),
            error: None,
            request: 0,
        }
    }
}

impl SearchSnapshot {
    pub fn is_loading(&self) -> bool {
        self.status == SearchStatus::Loading
    }
}

pub struct SearchOrchestrator<B> {
    backend: B,
    timezone: Tz,
    state: watch::Sender<SearchSnapshot>,
}

impl<B: SearchBackend> SearchOrchestrator<B> {
    pub fn new(backend: B, timezone: Tz) -> Self {
        let (state, _) = watch::channel(SearchSnapshot::default());
        Self {
            backend,
            timezone,
            state,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<SearchSnapshot> {
        self.state.subscribe()
    }

    pub fn snapshot(&self) -> SearchSnapshot {
        self.state.borrow().clone()
    }

    pub fn clear_error(&self) {
        self.state.send_if_modified(|state| state.error.take().is_some());
    }

    pub async fn health(&self) -> Result<HealthStatus, BackendError> {
        self.backend.check_health().await
    }

    /// Runs one search and returns the request token it ran under.
    pub async fn search(&self, criteria: &SearchCriteria) -> u64 {
        let token = self.begin();
        info!(request = token, query = %criteria.query, "search started");

        let outcome = self.run(criteria).await;
        self.finish(token, outcome);
        token
    }

    /// URL-driven entry point. Missing parameters never reach the backend.
    pub async fn search_from_params(&self, params: SearchParams, now: DateTime<Utc>) -> u64 {
        match params.into_criteria(now) {
            Ok(criteria) => self.search(&criteria).await,
            Err(err) => {
                let token = self.begin();
                warn!(request = token, %err, "search parameters rejected");
                self.finish(token, Err(err.to_string()));
                token
            }
        }
    }

    fn begin(&self) -> u64 {
        let mut token = 0;
        self.state.send_modify(|state| {
            state.request += 1;
            token = state.request;
            state.status = SearchStatus::Loading;
            state.error = None;
        });
        token
    }

    async fn run(&self, criteria: &SearchCriteria) -> Result<Vec<Event>, String> {
        self.execute(criteria).await.map_err(|err| err.to_string())
    }

    async fn execute(&self, criteria: &SearchCriteria) -> Result<Vec<Event>, SearchError> {
        if !criteria.is_valid() {
            return Err(SearchError::InvalidCriteria);
        }

        let reference = criteria.location.reference();
        let request = SearchRequest {
            artist: criteria.query.clone(),
            location: reference.text,
            latitude: reference.coords.lat,
            longitude: reference.coords.lng,
            start_date: Some(iso_timestamp(&criteria.start_date)),
            end_date: Some(iso_timestamp(&criteria.end_date)),
            max_price: Some(criteria.max_price),
        };

        let response = self.backend.search_events(&request).await?;
        debug!(records = response.events.len(), total = response.total, "backend answered");

        let adapter = EventAdapter::new(reference.coords, self.timezone);
        let events = adapter.adapt_all(&response.events).map_err(|err| {
            warn!(%err, "backend record rejected");
            err
        })?;
        Ok(rank(&events))
    }

    fn finish(&self, token: u64, outcome: Result<Vec<Event>, String>) {
        let applied = self.state.send_if_modified(|state| {
            if state.request != token {
                return false;
            }
            match outcome {
                Ok(events) => {
                    info!(request = token, results = events.len(), "search finished");
                    state.status = SearchStatus::Success;
                    state.events = events;
                    state.error = None;
                }
                Err(message) => {
                    warn!(request = token, error = %message, "search failed");
                    state.status = SearchStatus::Error;
                    state.events = Vec::new();
                    state.error = Some(message);
                }
            }
            true
        });

        if !applied {
            debug!(request = token, "superseded search result discarded");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{BackendEventRecord, SearchResponse};
    use crate::criteria::Location;
    use async_trait::async_trait;
    use chrono::TimeZone;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use tokio::sync::oneshot;

    type Reply = Result<SearchResponse, BackendError>;

    /// Backend whose replies are released by the test, keyed by artist.
    #[derive(Default)]
    struct FakeBackend {
        pending: Mutex<HashMap<String, oneshot::Receiver<Reply>>>,
        ready: Mutex<HashMap<String, Reply>>,
        requests: Mutex<Vec<SearchRequest>>,
    }

    impl FakeBackend {
        fn reply(self, artist: &str, reply: Reply) -> Self {
            self.ready.lock().unwrap().insert(artist.into(), reply);
            self
        }

        fn deferred(&self, artist: &str) -> oneshot::Sender<Reply> {
            let (tx, rx) = oneshot::channel();
            self.pending.lock().unwrap().insert(artist.into(), rx);
            tx
        }

        fn requests(&self) -> Vec<SearchRequest> {
            self.requests.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl SearchBackend for FakeBackend {
        async fn search_events(&self, request: &SearchRequest) -> Reply {
            self.requests.lock().unwrap().push(request.clone());
            if let Some(reply) = self.ready.lock().unwrap().remove(&request.artist) {
                return reply;
            }
            let rx = self.pending.lock().unwrap().remove(&request.artist);
            match rx {
                Some(rx) => rx.await.unwrap_or_else(|_| Err(BackendError::Http("dropped".into()))),
                None => Err(BackendError::Http("no scripted reply".into())),
            }
        }

        async fn check_health(&self) -> Result<HealthStatus, BackendError> {
            Ok(HealthStatus {
                status: "healthy".into(),
                version: "1.0.0".into(),
                timestamp: None,
            })
        }
    }

    fn record(id: &str, price: f64, lat: f64, lng: f64) -> BackendEventRecord {
        BackendEventRecord {
            id: id.into(),
            name: format!("Show {id}"),
            artist: "Taylor Swift".into(),
            venue_name: format!("Venue {id}"),
            date: "2025-06-15T19:00:00Z".into(),
            location: "New York, NY".into(),
            latitude: lat,
            longitude: lng,
            min_price: price,
            max_price: price * 3.0,
            vendor: "ticketmaster".into(),
            vendor_url: String::new(),
            price_tiers: Vec::new(),
        }
    }

    fn response(records: Vec<BackendEventRecord>) -> Reply {
        let total = records.len() as i64;
        Ok(SearchResponse {
            events: records,
            total,
        })
    }

    fn criteria(query: &str, location: Location) -> SearchCriteria {
        SearchCriteria {
            query: query.into(),
            start_date: Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap(),
            end_date: Utc.with_ymd_and_hms(2025, 6, 30, 0, 0, 0).unwrap(),
            location,
            max_price: 500.0,
        }
    }

    fn ids(snapshot: &SearchSnapshot) -> Vec<&str> {
        snapshot.events.iter().map(|e| e.id.as_str()).collect()
    }

    #[tokio::test]
    async fn starts_idle() {
        let orchestrator = SearchOrchestrator::new(FakeBackend::default(), Tz::UTC);
        let snapshot = orchestrator.snapshot();
        assert_eq!(snapshot.status, SearchStatus::Idle);
        assert!(snapshot.events.is_empty());
        assert_eq!(snapshot.request, 0);
    }

    #[tokio::test]
    async fn ranks_by_price_then_distance() {
        // Reference is the text fallback (lower Manhattan); latitude steps of
        // ~0.145 degrees are ~10 miles.
        let backend = FakeBackend::default().reply(
            "Taylor Swift",
            response(vec![
                record("p300-d10", 300.0, 40.7128 + 0.1447, -74.0060),
                record("p200-d20", 200.0, 40.7128 + 0.2894, -74.0060),
                record("p200-d5", 200.0, 40.7128 + 0.0723, -74.0060),
            ]),
        );
        let orchestrator = SearchOrchestrator::new(backend, Tz::UTC);

        orchestrator
            .search(&criteria("Taylor Swift", Location::text("New York, NY")))
            .await;

        let snapshot = orchestrator.snapshot();
        assert_eq!(snapshot.status, SearchStatus::Success);
        assert_eq!(ids(&snapshot), ["p200-d5", "p200-d20", "p300-d10"]);
        assert_eq!(snapshot.error, None);
    }

    #[tokio::test]
    async fn text_location_sends_fallback_coordinates() {
        let backend = FakeBackend::default().reply("Phish", response(vec![]));
        let orchestrator = SearchOrchestrator::new(backend, Tz::UTC);

        orchestrator
            .search(&criteria("Phish", Location::text("Denver, CO")))
            .await;

        let sent = &orchestrator.backend.requests()[0];
        assert_eq!(sent.location, "Denver, CO");
        assert_eq!((sent.latitude, sent.longitude), (40.7128, -74.0060));
        assert_eq!(sent.start_date.as_deref(), Some("2025-06-01T00:00:00.000Z"));
        assert_eq!(sent.end_date.as_deref(), Some("2025-06-30T00:00:00.000Z"));
        assert_eq!(sent.max_price, Some(500.0));
        assert_eq!(orchestrator.snapshot().status, SearchStatus::Success);
    }

    #[tokio::test]
    async fn coords_location_sends_coordinate_text() {
        let backend = FakeBackend::default().reply(
            "Phish",
            response(vec![record("home", 50.0, 39.7392, -104.9903)]),
        );
        let orchestrator = SearchOrchestrator::new(backend, Tz::UTC);

        orchestrator
            .search(&criteria("Phish", Location::coords(39.7392, -104.9903)))
            .await;

        let sent = &orchestrator.backend.requests()[0];
        assert_eq!(sent.location, "39.7392, -104.9903");
        assert_eq!((sent.latitude, sent.longitude), (39.7392, -104.9903));
        assert_eq!(orchestrator.snapshot().events[0].distance, 0.0);
    }

    #[tokio::test]
    async fn backend_failure_clears_results() {
        let backend = FakeBackend::default()
            .reply("Phish", response(vec![record("a", 10.0, 40.0, -74.0)]))
            .reply("Fail", Err(BackendError::Api("Vendor lookup failed".into())));
        let orchestrator = SearchOrchestrator::new(backend, Tz::UTC);

        orchestrator
            .search(&criteria("Phish", Location::text("NYC")))
            .await;
        assert_eq!(orchestrator.snapshot().events.len(), 1);

        orchestrator
            .search(&criteria("Fail", Location::text("NYC")))
            .await;
        let snapshot = orchestrator.snapshot();
        assert_eq!(snapshot.status, SearchStatus::Error);
        assert!(snapshot.events.is_empty());
        assert_eq!(snapshot.error.as_deref(), Some("Vendor lookup failed"));
    }

    #[tokio::test]
    async fn malformed_record_fails_whole_search() {
        let mut broken = record("bad", 10.0, 40.0, -74.0);
        broken.date = "TBD".into();
        let backend = FakeBackend::default().reply(
            "Phish",
            response(vec![record("good", 5.0, 40.0, -74.0), broken]),
        );
        let orchestrator = SearchOrchestrator::new(backend, Tz::UTC);

        orchestrator
            .search(&criteria("Phish", Location::text("NYC")))
            .await;

        let snapshot = orchestrator.snapshot();
        assert_eq!(snapshot.status, SearchStatus::Error);
        assert!(snapshot.events.is_empty());
        assert!(snapshot.error.unwrap().contains("TBD"));
    }

    #[tokio::test]
    async fn invalid_criteria_never_reach_backend() {
        let orchestrator = SearchOrchestrator::new(FakeBackend::default(), Tz::UTC);

        orchestrator
            .search(&criteria("   ", Location::text("NYC")))
            .await;

        assert!(orchestrator.backend.requests().is_empty());
        let snapshot = orchestrator.snapshot();
        assert_eq!(snapshot.status, SearchStatus::Error);
        assert_eq!(snapshot.error.as_deref(), Some("Invalid search criteria"));
    }

    #[tokio::test]
    async fn missing_params_short_circuit() {
        let orchestrator = SearchOrchestrator::new(FakeBackend::default(), Tz::UTC);
        let params = SearchParams::from_pairs([("query", "Phish")]);

        orchestrator.search_from_params(params, Utc::now()).await;

        assert!(orchestrator.backend.requests().is_empty());
        let snapshot = orchestrator.snapshot();
        assert_eq!(snapshot.status, SearchStatus::Error);
        assert_eq!(snapshot.error.as_deref(), Some("No search criteria provided"));
    }

    #[tokio::test]
    async fn params_search_uses_defaults() {
        let backend = FakeBackend::default().reply("Phish", response(vec![]));
        let orchestrator = SearchOrchestrator::new(backend, Tz::UTC);
        let now = Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap();
        let params = SearchParams::from_pairs([("query", "Phish"), ("location", "Denver")]);

        orchestrator.search_from_params(params, now).await;

        let sent = &orchestrator.backend.requests()[0];
        assert_eq!(sent.start_date.as_deref(), Some("2025-06-01T12:00:00.000Z"));
        assert_eq!(sent.end_date.as_deref(), Some("2025-07-01T12:00:00.000Z"));
        assert_eq!(sent.max_price, Some(500.0));
    }

    #[tokio::test]
    async fn later_search_wins_when_earlier_finishes_last() {
        let backend = FakeBackend::default();
        let first_tx = backend.deferred("First");
        let second_tx = backend.deferred("Second");
        let orchestrator = SearchOrchestrator::new(backend, Tz::UTC);

        let first_criteria = criteria("First", Location::text("NYC"));
        let second_criteria = criteria("Second", Location::text("NYC"));

        let (first, second, _) = tokio::join!(
            orchestrator.search(&first_criteria),
            orchestrator.search(&second_criteria),
            async {
                second_tx
                    .send(response(vec![record("second", 20.0, 40.7, -74.0)]))
                    .unwrap();
                tokio::task::yield_now().await;
                first_tx
                    .send(response(vec![record("first", 10.0, 40.7, -74.0)]))
                    .unwrap();
            }
        );

        assert!(second > first);
        let snapshot = orchestrator.snapshot();
        assert_eq!(snapshot.status, SearchStatus::Success);
        assert_eq!(snapshot.request, second);
        assert_eq!(ids(&snapshot), ["second"]);
    }

    #[tokio::test]
    async fn later_search_wins_when_earlier_finishes_first() {
        let backend = FakeBackend::default();
        let first_tx = backend.deferred("First");
        let second_tx = backend.deferred("Second");
        let orchestrator = SearchOrchestrator::new(backend, Tz::UTC);

        let first_criteria = criteria("First", Location::text("NYC"));
        let second_criteria = criteria("Second", Location::text("NYC"));

        tokio::join!(
            orchestrator.search(&first_criteria),
            orchestrator.search(&second_criteria),
            async {
                first_tx
                    .send(Err(BackendError::Api("stale failure".into())))
                    .unwrap();
                tokio::task::yield_now().await;
                tokio::task::yield_now().await;
                second_tx
                    .send(response(vec![record("second", 20.0, 40.7, -74.0)]))
                    .unwrap();
            }
        );

        let snapshot = orchestrator.snapshot();
        assert_eq!(snapshot.status, SearchStatus::Success);
        assert_eq!(snapshot.error, None);
        assert_eq!(ids(&snapshot), ["second"]);
    }

    #[tokio::test]
    async fn subscribers_see_loading_before_result() {
        let backend = FakeBackend::default();
        let tx = backend.deferred("Phish");
        let orchestrator = SearchOrchestrator::new(backend, Tz::UTC);
        let mut rx = orchestrator.subscribe();
        let phish = criteria("Phish", Location::text("NYC"));

        tokio::join!(orchestrator.search(&phish), async {
            rx.changed().await.unwrap();
            assert!(rx.borrow_and_update().is_loading());
            tx.send(response(vec![])).unwrap();
        });

        assert_eq!(orchestrator.snapshot().status, SearchStatus::Success);
    }

    #[tokio::test]
    async fn clear_error_keeps_status() {
        let backend =
            FakeBackend::default().reply("Fail", Err(BackendError::Http("connection refused".into())));
        let orchestrator = SearchOrchestrator::new(backend, Tz::UTC);

        orchestrator
            .search(&criteria("Fail", Location::text("NYC")))
            .await;
        assert_eq!(
            orchestrator.snapshot().error.as_deref(),
            Some("network error: connection refused")
        );

        orchestrator.clear_error();
        let snapshot = orchestrator.snapshot();
        assert_eq!(snapshot.error, None);
        assert_eq!(snapshot.status, SearchStatus::Error);
    }

    #[tokio::test]
    async fn health_passes_through() {
        let orchestrator = SearchOrchestrator::new(FakeBackend::default(), Tz::UTC);
        let health = orchestrator.health().await.unwrap();
        assert_eq!(health.status, "healthy");
    }
}
