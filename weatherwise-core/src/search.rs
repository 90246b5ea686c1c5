//! Incremental city search.
//!
//! [`SearchController`] turns a stream of overlapping `submit` calls into at
//! most one live upstream request. Every call walks
//! `Debouncing → RateLimitWaiting → InFlight` and ends in one terminal
//! [`SearchOutcome`]; only the newest dispatched query can end `Resolved`.
//!
//! Two independent guards keep older responses away from the caller:
//! - each new submission cancels the previous query's token, which ends
//!   its wait or aborts its request;
//! - each dispatch gets a sequence id, and a response whose id is no longer
//!   the latest is dropped as [`SearchOutcome::Stale`] even if the HTTP
//!   client ignored the cancellation.

use std::{
    future::Future,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};

use parking_lot::Mutex;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

use crate::{
    config::SearchConfig,
    error::{HttpError, SearchError},
    model::{CitySuggestion, Query},
    provider::geodb::GeoDbProvider,
    rate_limit::RateLimiter,
};

/// Lifecycle of the live query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QueryPhase {
    #[default]
    Idle,
    Debouncing,
    RateLimitWaiting,
    InFlight,
    Resolved,
    Cancelled,
    Stale,
    Failed,
}

impl QueryPhase {
    pub fn is_pending(&self) -> bool {
        matches!(
            self,
            QueryPhase::Debouncing | QueryPhase::RateLimitWaiting | QueryPhase::InFlight
        )
    }
}

/// Terminal state of one `submit` call.
#[derive(Debug, Clone, PartialEq)]
pub enum SearchOutcome {
    /// The newest query's results.
    Resolved(Vec<CitySuggestion>),
    /// Input shorter than the configured minimum; nothing was sent.
    TooShort,
    /// Superseded by a newer submission, or the controller was disposed.
    Cancelled,
    /// A newer query was dispatched before this response arrived.
    Stale,
    /// The upstream answered 429.
    RateLimited,
}

impl SearchOutcome {
    pub fn into_suggestions(self) -> Vec<CitySuggestion> {
        match self {
            SearchOutcome::Resolved(cities) => cities,
            _ => Vec::new(),
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self, SearchOutcome::Resolved(_))
    }
}

#[derive(Debug, Default)]
struct SearchSession {
    current_sequence_id: u64,
    pending_cancel: Option<CancellationToken>,
    phase: QueryPhase,
}

#[derive(Debug)]
pub struct SearchController {
    provider: GeoDbProvider,
    config: SearchConfig,
    limiter: Arc<RateLimiter>,
    session: Mutex<SearchSession>,
    rate_limited: AtomicU64,
    soft_timeouts: AtomicU64,
}

impl SearchController {
    pub fn new(provider: GeoDbProvider, config: SearchConfig) -> Self {
        let limiter = Arc::new(RateLimiter::new(config.min_request_interval()));
        Self::with_rate_limiter(provider, config, limiter)
    }

    /// Build a controller whose dispatches are spaced by a limiter shared
    /// with other controllers.
    pub fn with_rate_limiter(
        provider: GeoDbProvider,
        config: SearchConfig,
        limiter: Arc<RateLimiter>,
    ) -> Self {
        Self {
            provider,
            config,
            limiter,
            session: Mutex::new(SearchSession::default()),
            rate_limited: AtomicU64::new(0),
            soft_timeouts: AtomicU64::new(0),
        }
    }

    pub fn phase(&self) -> QueryPhase {
        self.session.lock().phase
    }

    /// Highest sequence id dispatched so far (0 before the first dispatch).
    pub fn current_sequence_id(&self) -> u64 {
        self.session.lock().current_sequence_id
    }

    /// Number of searches the upstream rejected with 429.
    pub fn rate_limited_count(&self) -> u64 {
        self.rate_limited.load(Ordering::Relaxed)
    }

    /// Number of live searches that outlived the soft timeout.
    pub fn soft_timeout_count(&self) -> u64 {
        self.soft_timeouts.load(Ordering::Relaxed)
    }

    /// Suggestions for `text`; every outcome other than `Resolved` maps to
    /// an empty list.
    pub async fn submit(&self, text: &str) -> Result<Vec<CitySuggestion>, SearchError> {
        self.submit_outcome(text).await.map(SearchOutcome::into_suggestions)
    }

    #[instrument(skip(self, text), fields(query = %text.trim()))]
    pub async fn submit_outcome(&self, text: &str) -> Result<SearchOutcome, SearchError> {
        let text = text.trim();
        if text.chars().count() < self.config.min_query_chars {
            // Still supersedes whatever was pending.
            self.cancel_pending();
            debug!(min = self.config.min_query_chars, "Query too short, not searching");
            return Ok(SearchOutcome::TooShort);
        }

        let cancel = self.begin();

        if !unless_cancelled(&cancel, sleep(self.config.debounce())).await {
            debug!("Superseded while debouncing");
            return Ok(SearchOutcome::Cancelled);
        }

        self.set_phase_if_live(&cancel, QueryPhase::RateLimitWaiting);
        if !unless_cancelled(&cancel, self.limiter.acquire()).await {
            debug!("Superseded while waiting for the rate limiter");
            return Ok(SearchOutcome::Cancelled);
        }

        let Some(query) = self.dispatch(text, &cancel) else {
            return Ok(SearchOutcome::Cancelled);
        };

        let result = self
            .with_soft_timeout(&query, &cancel, self.provider.search(&query, cancel.clone()))
            .await;

        self.settle(&query, &cancel, result)
    }

    /// Cancel whatever query is pending. The controller stays usable.
    pub fn dispose(&self) {
        self.cancel_pending();
    }

    fn cancel_pending(&self) {
        let mut session = self.session.lock();
        if let Some(token) = session.pending_cancel.take() {
            token.cancel();
        }
        if session.phase.is_pending() {
            session.phase = QueryPhase::Cancelled;
        }
    }

    /// Cancel the previous query and install a fresh token for this one.
    fn begin(&self) -> CancellationToken {
        let token = CancellationToken::new();
        let mut session = self.session.lock();
        if let Some(previous) = session.pending_cancel.replace(token.clone()) {
            previous.cancel();
        }
        session.phase = QueryPhase::Debouncing;
        token
    }

    fn set_phase_if_live(&self, cancel: &CancellationToken, phase: QueryPhase) {
        let mut session = self.session.lock();
        if !cancel.is_cancelled() {
            session.phase = phase;
        }
    }

    fn dispatch(&self, text: &str, cancel: &CancellationToken) -> Option<Query> {
        let mut session = self.session.lock();
        if cancel.is_cancelled() {
            return None;
        }

        session.current_sequence_id += 1;
        session.phase = QueryPhase::InFlight;

        let query = Query { text: text.to_string(), sequence_id: session.current_sequence_id };
        debug!(sequence_id = query.sequence_id, "Dispatching city search");
        Some(query)
    }

    /// Await `request`, logging once if it outlives the soft timeout.
    async fn with_soft_timeout<T>(
        &self,
        query: &Query,
        cancel: &CancellationToken,
        request: impl Future<Output = T>,
    ) -> T {
        tokio::pin!(request);

        tokio::select! {
            out = &mut request => return out,
            () = sleep(self.config.soft_timeout()) => {
                if !cancel.is_cancelled() {
                    self.soft_timeouts.fetch_add(1, Ordering::Relaxed);
                    warn!(
                        sequence_id = query.sequence_id,
                        timeout_ms = self.config.soft_timeout_ms,
                        "City search still pending after soft timeout"
                    );
                }
            }
        }

        request.await
    }

    fn settle(
        &self,
        query: &Query,
        cancel: &CancellationToken,
        result: Result<Vec<CitySuggestion>, HttpError>,
    ) -> Result<SearchOutcome, SearchError> {
        let mut session = self.session.lock();

        if query.sequence_id != session.current_sequence_id {
            debug!(
                sequence_id = query.sequence_id,
                latest = session.current_sequence_id,
                "Discarding stale search response"
            );
            return Ok(SearchOutcome::Stale);
        }

        if cancel.is_cancelled() || matches!(result, Err(HttpError::Cancelled)) {
            if !cancel.is_cancelled() {
                session.phase = QueryPhase::Cancelled;
            }
            debug!(sequence_id = query.sequence_id, "Search cancelled");
            return Ok(SearchOutcome::Cancelled);
        }

        match result {
            Ok(cities) => {
                session.phase = QueryPhase::Resolved;
                debug!(sequence_id = query.sequence_id, count = cities.len(), "Search resolved");
                Ok(SearchOutcome::Resolved(cities))
            }
            Err(cause) if cause.is_rate_limited() => {
                session.phase = QueryPhase::Resolved;
                let total = self.rate_limited.fetch_add(1, Ordering::Relaxed) + 1;
                warn!(sequence_id = query.sequence_id, total, "City search rate limited by upstream");
                Ok(SearchOutcome::RateLimited)
            }
            Err(cause) => {
                session.phase = QueryPhase::Failed;
                Err(SearchError { cause })
            }
        }
    }
}

impl Drop for SearchController {
    fn drop(&mut self) {
        self.dispose();
    }
}

/// Run `wait` to completion unless `cancel` fires first.
async fn unless_cancelled(cancel: &CancellationToken, wait: impl Future<Output = ()>) -> bool {
    tokio::select! {
        biased;
        () = cancel.cancelled() => false,
        () = wait => true,
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::time::Instant;

    use super::*;
    use crate::testing::{FakeHttp, Reply, london_payload};

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    fn controller(http: Arc<FakeHttp>) -> SearchController {
        let config = SearchConfig::default();
        let provider = GeoDbProvider::new(http, "https://geo.test/v1/geo", "KEY", &config);
        SearchController::new(provider, config)
    }

    fn prefixes(http: &FakeHttp) -> Vec<String> {
        http.requests()
            .iter()
            .filter_map(|r| r.query_value("namePrefix").map(str::to_string))
            .collect()
    }

    #[tokio::test(start_paused = true)]
    async fn short_input_never_hits_the_network() {
        let http = FakeHttp::new(|_| Reply::ok(london_payload()));
        let search = controller(http.clone());

        for text in ["", "   ", "L", "  a  ", "é"] {
            assert_eq!(search.submit_outcome(text).await.unwrap(), SearchOutcome::TooShort);
            assert!(search.submit(text).await.unwrap().is_empty());
        }

        assert!(http.requests().is_empty());
        assert_eq!(search.phase(), QueryPhase::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn resolves_london_for_lon() {
        let http = FakeHttp::new(|_| Reply::ok(london_payload()));
        let search = controller(http.clone());

        let cities = search.submit("  Lon ").await.unwrap();

        assert_eq!(
            cities[0],
            CitySuggestion { label: "London, GB".into(), latitude: 51.5072, longitude: -0.1276 }
        );
        assert_eq!(prefixes(&http), ["Lon"]);
        assert_eq!(search.phase(), QueryPhase::Resolved);
        assert_eq!(search.current_sequence_id(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn rapid_submits_dispatch_only_the_last() {
        let http = FakeHttp::new(|_| Reply::ok(london_payload()));
        let search = controller(http.clone());
        let start = Instant::now();

        let (a, b, c) = tokio::join!(
            search.submit_outcome("Lo"),
            async {
                tokio::time::sleep(ms(100)).await;
                search.submit_outcome("Lon").await
            },
            async {
                tokio::time::sleep(ms(200)).await;
                search.submit_outcome("Lond").await
            },
        );

        assert_eq!(a.unwrap(), SearchOutcome::Cancelled);
        assert_eq!(b.unwrap(), SearchOutcome::Cancelled);
        assert!(c.unwrap().is_active());
        assert_eq!(prefixes(&http), ["Lond"]);

        // Trailing edge: the window restarts at the last call (t = 200ms).
        let dispatched = http.dispatch_times()[0] - start;
        assert!(dispatched >= ms(450) && dispatched < ms(460), "{dispatched:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn superseded_response_is_dropped_as_stale() {
        // The slow request ignores cancellation and answers after the newer one.
        let http = FakeHttp::new(|req| match req.query_value("namePrefix") {
            Some("Lon") => Reply::ok(london_payload()).after(Duration::from_secs(2)).ignoring_cancel(),
            _ => Reply::ok(serde_json::json!({ "data": [] })),
        });
        let search = controller(http.clone());

        let (a, b) = tokio::join!(search.submit_outcome("Lon"), async {
            tokio::time::sleep(ms(400)).await;
            search.submit_outcome("Lond").await
        });

        assert_eq!(a.unwrap(), SearchOutcome::Stale);
        assert_eq!(b.unwrap(), SearchOutcome::Resolved(Vec::new()));
        assert_eq!(prefixes(&http), ["Lon", "Lond"]);
        assert_eq!(search.current_sequence_id(), 2);
        assert_eq!(search.phase(), QueryPhase::Resolved);
    }

    #[tokio::test(start_paused = true)]
    async fn superseded_failure_is_dropped_as_stale() {
        let http = FakeHttp::new(|req| match req.query_value("namePrefix") {
            Some("Lon") => Reply::status(500).after(Duration::from_secs(2)).ignoring_cancel(),
            _ => Reply::ok(london_payload()),
        });
        let search = controller(http.clone());

        let (a, b) = tokio::join!(search.submit_outcome("Lon"), async {
            tokio::time::sleep(ms(400)).await;
            search.submit_outcome("Lond").await
        });

        assert_eq!(a.unwrap(), SearchOutcome::Stale);
        assert!(b.unwrap().is_active());
    }

    #[tokio::test(start_paused = true)]
    async fn in_flight_request_is_cancelled_silently() {
        let http = FakeHttp::new(|req| match req.query_value("namePrefix") {
            Some("Lon") => Reply::ok(london_payload()).after(Duration::from_secs(2)),
            _ => Reply::ok(london_payload()),
        });
        let search = controller(http.clone());

        let (a, b) = tokio::join!(search.submit_outcome("Lon"), async {
            tokio::time::sleep(ms(400)).await;
            search.submit_outcome("Lond").await
        });

        assert_eq!(a.unwrap(), SearchOutcome::Cancelled);
        assert_eq!(b.unwrap().into_suggestions().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn upstream_429_resolves_empty_and_is_counted() {
        let http = FakeHttp::new(|_| Reply::status(429));
        let search = controller(http.clone());

        assert_eq!(search.submit_outcome("Lon").await.unwrap(), SearchOutcome::RateLimited);
        assert!(search.submit("Lond").await.unwrap().is_empty());

        assert_eq!(search.rate_limited_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn other_upstream_failures_are_errors() {
        let http = FakeHttp::new(|_| Reply::status(500));
        let search = controller(http.clone());

        let err = search.submit("Lon").await.unwrap_err();

        assert!(matches!(err.cause, HttpError::Status { status: 500, .. }));
        assert_eq!(search.phase(), QueryPhase::Failed);
        assert_eq!(search.rate_limited_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn consecutive_dispatches_respect_min_interval() {
        let http = FakeHttp::new(|_| Reply::ok(london_payload()));
        let search = controller(http.clone());

        search.submit("Lon").await.unwrap();
        search.submit("Lond").await.unwrap();

        let times = http.dispatch_times();
        assert_eq!(times.len(), 2);
        assert!(times[1] - times[0] >= ms(300), "{:?}", times[1] - times[0]);
    }

    #[tokio::test(start_paused = true)]
    async fn shared_limiter_spaces_controllers() {
        let http = FakeHttp::new(|_| Reply::ok(london_payload()));
        let config = SearchConfig::default();
        let limiter = Arc::new(RateLimiter::new(config.min_request_interval()));
        let provider = GeoDbProvider::new(http.clone(), "https://geo.test", "KEY", &config);
        let left = SearchController::with_rate_limiter(provider.clone(), config.clone(), limiter.clone());
        let right = SearchController::with_rate_limiter(provider, config, limiter);

        let (a, b) = tokio::join!(left.submit("Lon"), right.submit("Par"));
        assert!(a.is_ok() && b.is_ok());

        let times = http.dispatch_times();
        let gap = if times[1] > times[0] { times[1] - times[0] } else { times[0] - times[1] };
        assert!(gap >= ms(300), "{gap:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn dispose_cancels_debouncing_query() {
        let http = FakeHttp::new(|_| Reply::ok(london_payload()));
        let search = controller(http.clone());

        let (outcome, ()) = tokio::join!(search.submit_outcome("Lon"), async {
            tokio::time::sleep(ms(100)).await;
            search.dispose();
        });

        assert_eq!(outcome.unwrap(), SearchOutcome::Cancelled);
        assert!(http.requests().is_empty());
        assert_eq!(search.phase(), QueryPhase::Cancelled);
    }

    #[tokio::test(start_paused = true)]
    async fn dispose_aborts_in_flight_request() {
        let http = FakeHttp::new(|_| Reply::ok(london_payload()).after(Duration::from_secs(2)));
        let search = controller(http.clone());

        let (outcome, ()) = tokio::join!(search.submit_outcome("Lon"), async {
            tokio::time::sleep(ms(300)).await;
            search.dispose();
        });

        assert_eq!(outcome.unwrap(), SearchOutcome::Cancelled);
        assert_eq!(http.requests().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn phase_follows_the_live_query() {
        let http = FakeHttp::new(|_| Reply::ok(london_payload()).after(ms(100)));
        let search = controller(http.clone());

        let (outcome, ()) = tokio::join!(search.submit_outcome("Lon"), async {
            tokio::time::sleep(ms(100)).await;
            assert_eq!(search.phase(), QueryPhase::Debouncing);
            tokio::time::sleep(ms(200)).await;
            assert_eq!(search.phase(), QueryPhase::InFlight);
        });

        assert!(outcome.unwrap().is_active());
        assert_eq!(search.phase(), QueryPhase::Resolved);
    }

    #[tokio::test(start_paused = true)]
    async fn soft_timeout_does_not_abort() {
        let http = FakeHttp::new(|_| Reply::ok(london_payload()).after(Duration::from_secs(7)));
        let search = controller(http.clone());
        let start = Instant::now();

        let cities = search.submit("Lon").await.unwrap();

        assert_eq!(cities.len(), 2);
        assert!(start.elapsed() >= Duration::from_millis(7250));
        assert_eq!(search.soft_timeout_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn fast_response_does_not_trip_soft_timeout() {
        let http = FakeHttp::new(|_| Reply::ok(london_payload()).after(ms(500)));
        let search = controller(http.clone());

        search.submit("Lon").await.unwrap();

        assert_eq!(search.soft_timeout_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn short_input_supersedes_in_flight_query() {
        let http = FakeHttp::new(|_| Reply::ok(london_payload()).after(Duration::from_secs(1)));
        let search = controller(http.clone());

        let (a, b) = tokio::join!(search.submit_outcome("Lon"), async {
            tokio::time::sleep(ms(400)).await;
            search.submit_outcome("L").await
        });

        assert_eq!(a.unwrap(), SearchOutcome::Cancelled);
        assert_eq!(b.unwrap(), SearchOutcome::TooShort);
        assert_eq!(prefixes(&http), ["Lon"]);
        assert_eq!(search.phase(), QueryPhase::Cancelled);
    }

    #[tokio::test(start_paused = true)]
    async fn short_input_cancels_debouncing_query() {
        let http = FakeHttp::new(|_| Reply::ok(london_payload()));
        let search = controller(http.clone());

        let (a, b) = tokio::join!(search.submit_outcome("Lo"), async {
            tokio::time::sleep(ms(100)).await;
            search.submit_outcome("").await
        });

        assert_eq!(a.unwrap(), SearchOutcome::Cancelled);
        assert_eq!(b.unwrap(), SearchOutcome::TooShort);
        assert!(http.requests().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_rate_limit_wait_does_not_delay_next_dispatch() {
        let http = FakeHttp::new(|_| Reply::ok(london_payload()));
        let search = controller(http.clone());
        let start = Instant::now();

        let (a, b, c) = tokio::join!(
            search.submit_outcome("Xa"),
            async {
                tokio::time::sleep(ms(260)).await;
                search.submit_outcome("Ab").await
            },
            async {
                tokio::time::sleep(ms(520)).await;
                search.submit_outcome("Bc").await
            },
        );

        assert!(a.unwrap().is_active());
        assert_eq!(b.unwrap(), SearchOutcome::Cancelled);
        assert!(c.unwrap().is_active());
        assert_eq!(prefixes(&http), ["Xa", "Bc"]);

        // "Ab" waited on the limiter from 510ms until it was cancelled at 520ms;
        // "Bc" goes out as soon as its own debounce ends.
        let times: Vec<_> = http.dispatch_times().iter().map(|t| *t - start).collect();
        assert!(times[0] >= ms(250) && times[0] < ms(260), "{times:?}");
        assert!(times[1] >= ms(770) && times[1] < ms(780), "{times:?}");
    }
}
