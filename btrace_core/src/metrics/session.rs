/**
 * Usage-metrics sessions.
 *
 * A session is a durable identity that spans process restarts until the
 * application has been inactive for more than thirty minutes. It lives in
 * the key-value store under `sessionId` and `lastActive` (epoch seconds).
 *
 * Lifecycle:
 *
 * ```text
 *   new() ── no stored id ──► mint id ─► queue unique event + "Application Launches"
 *     │                                        │
 *     └── stored id ──► adopt ◄────────────────┘
 *                          │
 *                   persist_session()   (also every heartbeat tick)
 *                          │
 *         last_active absent or stale? ── yes ─► mint id ─► unique event
 *                          │
 *                 lastActive = now
 * ```
 *
 * `new()` never touches the network. Events it produces are queued and
 * sent by `send_pending_events()`, which the heartbeat thread runs first.
 */
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{info, warn};
use uuid::Uuid;

use super::payload::{EventAttributes, SummedEventsPayload, UniqueEventsPayload};
use crate::attributes::AttributeProvider;
use crate::clock::Clock;
use crate::error::ConfigError;
use crate::protocol::constants::DEFAULT_METRICS_HOST;
use crate::protocol::endpoint::{resolve_endpoint, MetricsEndpoints};
use crate::storage::KeyValueStore;
use crate::transport::SubmissionApi;

/// A session stays alive while activity gaps are at most this long.
pub const PERSISTENCE_INTERVAL_SECS: i64 = 1800;

/// Summed-event group emitted when a new installation starts its first session.
pub const APPLICATION_LAUNCHES: &str = "Application Launches";

const SESSION_ID_KEY: &str = "sessionId";
const LAST_ACTIVE_KEY: &str = "lastActive";

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub session_id: String,
    /// Epoch seconds of the last recorded activity.
    pub last_active: Option<i64>,
}

impl Session {
    /// True when the session has been idle for longer than the persistence interval.
    pub fn is_expired(&self, now: i64) -> bool {
        match self.last_active {
            Some(last_active) => now - last_active > PERSISTENCE_INTERVAL_SECS,
            None => true,
        }
    }
}

/// Reads and writes the session keys of a [`KeyValueStore`].
pub struct SessionStorage {
    store: Arc<dyn KeyValueStore>,
}

impl SessionStorage {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    pub fn session_id(&self) -> Option<String> {
        self.store.get(SESSION_ID_KEY).filter(|id| !id.is_empty())
    }

    pub fn last_active(&self) -> Option<i64> {
        self.store
            .get(LAST_ACTIVE_KEY)
            .and_then(|raw| raw.trim().parse().ok())
    }

    pub fn set_session_id(&self, session_id: &str) {
        if let Err(e) = self.store.set(SESSION_ID_KEY, session_id) {
            warn!(error = %e, "failed to persist metrics session id");
        }
    }

    pub fn set_last_active(&self, secs: i64) {
        if let Err(e) = self.store.set(LAST_ACTIVE_KEY, &secs.to_string()) {
            warn!(error = %e, "failed to persist metrics session activity");
        }
    }
}

// ---------------------------------------------------------------------------
// MetricsSession
// ---------------------------------------------------------------------------

/// An event produced during construction and not yet sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PendingEvent {
    Unique,
    Summed(&'static str),
}

/// Collaborators a [`MetricsSession`] is built from.
pub struct MetricsContext {
    pub api: Arc<SubmissionApi>,
    pub store: Arc<dyn KeyValueStore>,
    pub attributes: Arc<dyn AttributeProvider>,
    pub clock: Arc<dyn Clock>,
}

/**
 * Maintains the current session and emits unique and summed events.
 *
 * Shared between the client and the heartbeat thread; every mutation of the
 * session goes through one mutex.
 */
pub struct MetricsSession {
    endpoints: MetricsEndpoints,
    storage: SessionStorage,
    session: Mutex<Session>,
    pending: Mutex<Vec<PendingEvent>>,
    api: Arc<SubmissionApi>,
    attributes: Arc<dyn AttributeProvider>,
    clock: Arc<dyn Clock>,
}

impl MetricsSession {
    /**
     * Resolves the metrics endpoints from `endpoint`/`token`, adopts or
     * mints the stored session and records activity once. Launch events
     * are queued rather than sent.
     *
     * `submission_host` overrides the default metrics host.
     */
    pub fn new(
        endpoint: &str,
        token: Option<&str>,
        submission_host: Option<&str>,
        context: MetricsContext,
    ) -> Result<Self, ConfigError> {
        if endpoint.is_empty() {
            return Err(ConfigError::MissingEndpoint);
        }

        let params = resolve_endpoint(endpoint, token)
            .ok_or_else(|| ConfigError::UnresolvableEndpoint(endpoint.to_string()))?;
        if params.universe.is_empty() {
            return Err(ConfigError::MissingUniverse);
        }
        let token = params
            .token
            .filter(|t| !t.is_empty())
            .ok_or(ConfigError::MissingToken)?;

        let host = submission_host.unwrap_or(DEFAULT_METRICS_HOST);
        let endpoints = MetricsEndpoints::new(host, &params.universe, &token);

        let storage = SessionStorage::new(context.store);
        let stored = storage.session_id();
        let last_active = stored.as_ref().and_then(|_| storage.last_active());
        let minted = stored.is_none();

        let metrics = Self {
            endpoints,
            storage,
            session: Mutex::new(Session {
                session_id: stored.unwrap_or_default(),
                last_active,
            }),
            pending: Mutex::new(Vec::new()),
            api: context.api,
            attributes: context.attributes,
            clock: context.clock,
        };

        if minted {
            let now = metrics.clock.now_secs();
            metrics.mint(&mut metrics.lock(), now);
            metrics.queue(PendingEvent::Unique);
            metrics.queue(PendingEvent::Summed(APPLICATION_LAUNCHES));
        }

        if metrics.touch() {
            metrics.queue(PendingEvent::Unique);
        }
        Ok(metrics)
    }

    /// Current session identifier.
    pub fn session_id(&self) -> String {
        self.lock().session_id.clone()
    }

    pub fn endpoints(&self) -> &MetricsEndpoints {
        &self.endpoints
    }

    /**
     * Records activity now. A stale or never-active session is replaced by
     * a new one first, which emits a unique event.
     */
    pub fn persist_session(&self) {
        if self.touch() {
            self.send_unique_event();
        }
    }

    /// Sends the events queued by construction. Later calls send nothing.
    pub fn send_pending_events(&self) {
        let pending = std::mem::take(&mut *lock(&self.pending));
        for event in pending {
            match event {
                PendingEvent::Unique => self.send_unique_event(),
                PendingEvent::Summed(group) => self.send_summed_event(group),
            };
        }
    }

    /// Emits a unique event along the `guid` dimension.
    pub fn send_unique_event(&self) -> bool {
        let payload = UniqueEventsPayload::new(self.clock.now_secs(), self.event_attributes());
        self.api.send_metrics(&self.endpoints.unique, &payload)
    }

    /// Emits a summed event in `metric_group`.
    pub fn send_summed_event(&self, metric_group: &str) -> bool {
        let payload = SummedEventsPayload::new(
            self.clock.now_secs(),
            metric_group,
            self.event_attributes(),
        );
        self.api.send_metrics(&self.endpoints.summed, &payload)
    }

    /**
     * Client attributes stringified for metrics. Empty values are dropped;
     * `application.session` is always the current session and
     * `application.version` defaults to `unknown`.
     */
    pub fn event_attributes(&self) -> EventAttributes {
        let mut result = EventAttributes::new();
        result.insert("application.session".into(), self.session_id());
        result.insert("application.version".into(), "unknown".into());

        for (key, value) in self.attributes.attributes() {
            let value = value.to_metric_string();
            if !value.is_empty() {
                result.insert(key, value);
            }
        }
        result
    }

    /**
     * Marks the session active now, minting a new one if it expired.
     * Returns `true` when a new session was minted. The expiry check and the
     * mint happen under one lock.
     */
    fn touch(&self) -> bool {
        let now = self.clock.now_secs();
        let mut session = self.lock();

        let expired = session.is_expired(now);
        if expired {
            self.mint(&mut session, now);
        }

        session.last_active = Some(now);
        self.storage.set_last_active(now);
        expired
    }

    fn mint(&self, session: &mut Session, now: i64) {
        let session_id = Uuid::new_v4().to_string();
        self.storage.set_session_id(&session_id);
        self.storage.set_last_active(now);
        info!(session = %session_id, "started metrics session");

        session.session_id = session_id;
        session.last_active = Some(now);
    }

    fn queue(&self, event: PendingEvent) {
        lock(&self.pending).push(event);
    }

    fn lock(&self) -> MutexGuard<'_, Session> {
        lock(&self.session)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex as StdMutex;

    use super::*;
    use crate::clock::ManualClock;
    use crate::protocol::types::{AttributeValue, Attributes};
    use crate::storage::MemoryStore;
    use crate::transport::{HttpResponse, Transport, TransportError};

    const TOKEN: &str = "b";

    #[derive(Default)]
    struct Recorder {
        posts: StdMutex<Vec<(String, serde_json::Value)>>,
    }

    impl Recorder {
        fn urls(&self) -> Vec<String> {
            self.posts.lock().unwrap().iter().map(|(u, _)| u.clone()).collect()
        }

        fn bodies(&self) -> Vec<serde_json::Value> {
            self.posts.lock().unwrap().iter().map(|(_, b)| b.clone()).collect()
        }
    }

    impl Transport for Recorder {
        fn post(
            &self,
            url: &str,
            _content_type: &str,
            body: &[u8],
        ) -> Result<HttpResponse, TransportError> {
            let body = serde_json::from_slice(body).unwrap_or(serde_json::Value::Null);
            self.posts.lock().unwrap().push((url.to_string(), body));
            Ok(HttpResponse {
                status: 200,
                body: String::new(),
            })
        }
    }

    struct Fixture {
        recorder: Arc<Recorder>,
        store: Arc<MemoryStore>,
        clock: Arc<ManualClock>,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                recorder: Arc::new(Recorder::default()),
                store: Arc::new(MemoryStore::new()),
                clock: Arc::new(ManualClock::at_secs(1_000_000)),
            }
        }

        fn session(&self, endpoint: &str) -> Result<MetricsSession, ConfigError> {
            let provider: Arc<dyn AttributeProvider> = Arc::new(|| {
                let mut attributes = Attributes::new();
                attributes.insert("application".into(), "demo".into());
                attributes.insert("guid".into(), "g-1".into());
                attributes.insert("empty".into(), "".into());
                attributes.insert("count".into(), AttributeValue::Number(3.0));
                attributes
            });
            MetricsSession::new(
                endpoint,
                Some(TOKEN),
                None,
                MetricsContext {
                    api: Arc::new(SubmissionApi::new(String::new(), self.recorder.clone())),
                    store: self.store.clone(),
                    attributes: provider,
                    clock: self.clock.clone(),
                },
            )
        }
    }

    #[test]
    fn test_first_launch_mints_and_reports() {
        let fixture = Fixture::new();
        let session = fixture.session("https://a.sp.backtrace.io").unwrap();

        let stored = fixture.store.get(SESSION_ID_KEY);
        assert_eq!(stored.as_deref(), Some(session.session_id().as_str()));
        assert_eq!(fixture.store.get(LAST_ACTIVE_KEY).as_deref(), Some("1000000"));
        assert!(fixture.recorder.urls().is_empty());

        session.send_pending_events();
        session.send_pending_events();

        let urls = fixture.recorder.urls();
        assert_eq!(urls.len(), 2);
        assert_eq!(
            urls[0],
            "https://events.backtrace.io/api/unique-events/submit?universe=a&token=b"
        );
        assert_eq!(
            urls[1],
            "https://events.backtrace.io/api/summed-events/submit?universe=a&token=b"
        );

        let bodies = fixture.recorder.bodies();
        assert_eq!(bodies[1]["summed_events"][0]["metric_group"], APPLICATION_LAUNCHES);
        assert_eq!(bodies[0]["application"], "demo");
        assert_eq!(bodies[0]["appversion"], "unknown");
    }

    #[test]
    fn test_session_resumes_within_interval() {
        let fixture = Fixture::new();
        let first = fixture.session("https://a.sp.backtrace.io").unwrap();
        first.send_pending_events();

        fixture.clock.advance_secs(PERSISTENCE_INTERVAL_SECS - 1);
        let second = fixture.session("https://a.sp.backtrace.io").unwrap();
        second.send_pending_events();

        assert_eq!(second.session_id(), first.session_id());
        assert_eq!(fixture.recorder.urls().len(), 2);
        assert_eq!(
            fixture.store.get(LAST_ACTIVE_KEY),
            Some((1_000_000 + PERSISTENCE_INTERVAL_SECS - 1).to_string())
        );
    }

    #[test]
    fn test_session_expires_after_interval() {
        let fixture = Fixture::new();
        let first = fixture.session("https://a.sp.backtrace.io").unwrap();
        first.send_pending_events();

        fixture.clock.advance_secs(PERSISTENCE_INTERVAL_SECS + 1);
        let second = fixture.session("https://a.sp.backtrace.io").unwrap();
        assert_eq!(fixture.recorder.urls().len(), 2);
        second.send_pending_events();

        assert_ne!(second.session_id(), first.session_id());
        let urls = fixture.recorder.urls();
        assert_eq!(urls.len(), 3);
        assert!(urls[2].contains("unique-events"));
    }

    #[test]
    fn test_persist_session_on_active_session_only_touches() {
        let fixture = Fixture::new();
        let session = fixture.session("https://a.sp.backtrace.io").unwrap();
        session.send_pending_events();
        let id = session.session_id();

        fixture.clock.advance_secs(60);
        session.persist_session();

        assert_eq!(session.session_id(), id);
        assert_eq!(fixture.recorder.urls().len(), 2);
        assert_eq!(fixture.store.get(LAST_ACTIVE_KEY).as_deref(), Some("1000060"));
    }

    #[test]
    fn test_persist_session_replaces_stale_session() {
        let fixture = Fixture::new();
        let session = fixture.session("https://a.sp.backtrace.io").unwrap();
        session.send_pending_events();
        let id = session.session_id();

        fixture.clock.advance_secs(PERSISTENCE_INTERVAL_SECS + 60);
        session.persist_session();

        let renewed = session.session_id();
        assert_ne!(renewed, id);
        assert_eq!(fixture.store.get(SESSION_ID_KEY), Some(renewed.clone()));
        assert_eq!(
            fixture.store.get(LAST_ACTIVE_KEY),
            Some((1_000_000 + PERSISTENCE_INTERVAL_SECS + 60).to_string())
        );

        let urls = fixture.recorder.urls();
        assert_eq!(urls.len(), 3);
        assert!(urls[2].contains("unique-events"));
        assert_eq!(
            fixture.recorder.bodies()[2]["unique_events"][0]["attributes"]["application.session"],
            renewed
        );
    }

    #[test]
    fn test_concurrent_persist_mints_once() {
        let fixture = Fixture::new();
        let session = Arc::new(fixture.session("https://a.sp.backtrace.io").unwrap());
        session.send_pending_events();

        fixture.clock.advance_secs(PERSISTENCE_INTERVAL_SECS + 1);
        let workers: Vec<_> = (0..8)
            .map(|_| {
                let session = session.clone();
                std::thread::spawn(move || session.persist_session())
            })
            .collect();
        for worker in workers {
            worker.join().unwrap();
        }

        let unique = fixture
            .recorder
            .urls()
            .iter()
            .filter(|url| url.contains("unique-events"))
            .count();
        assert_eq!(unique, 2);
    }

    #[test]
    fn test_event_attributes_are_stringified() {
        let fixture = Fixture::new();
        let session = fixture.session("https://a.sp.backtrace.io").unwrap();
        let attributes = session.event_attributes();

        assert_eq!(attributes["application.session"], session.session_id());
        assert_eq!(attributes["application.version"], "unknown");
        assert_eq!(attributes["count"], "3");
        assert!(!attributes.contains_key("empty"));
    }

    #[test]
    fn test_unresolvable_endpoint_is_rejected() {
        let fixture = Fixture::new();
        assert!(matches!(
            fixture.session("not a url"),
            Err(ConfigError::UnresolvableEndpoint(_))
        ));
        assert!(matches!(
            fixture.session(""),
            Err(ConfigError::MissingEndpoint)
        ));
        assert!(fixture.recorder.urls().is_empty());
    }

    #[test]
    fn test_missing_token_is_rejected() {
        let fixture = Fixture::new();
        let result = MetricsSession::new(
            "https://a.sp.backtrace.io",
            None,
            None,
            MetricsContext {
                api: Arc::new(SubmissionApi::new(String::new(), fixture.recorder.clone())),
                store: fixture.store.clone(),
                attributes: Arc::new(Attributes::new),
                clock: fixture.clock.clone(),
            },
        );
        assert!(matches!(result, Err(ConfigError::MissingToken)));
    }

    #[test]
    fn test_expiry_boundary() {
        let session = Session {
            session_id: "s".into(),
            last_active: Some(100),
        };
        assert!(!session.is_expired(100 + PERSISTENCE_INTERVAL_SECS));
        assert!(session.is_expired(101 + PERSISTENCE_INTERVAL_SECS));
        assert!(Session {
            session_id: "s".into(),
            last_active: None
        }
        .is_expired(0));
    }
}
