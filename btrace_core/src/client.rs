/**
 * The reporting client: central orchestrator that owns admission control,
 * the breadcrumb trail, the report queue with its background worker, and
 * the optional metrics session.
 *
 * Every report goes through the same pipeline:
 *
 * ```text
 *  id present? ──no──► Err(MissingId)
 *      │
 *  filter ──true──► FilterHit
 *      │
 *  sampler ──hit──► SamplingHit
 *      │
 *  rate limiter ──full──► LimitReached
 *      │
 *  merge client attributes (report keys win)
 *      │
 *      ├── send()        → deliver on the calling thread
 *      └── send_report() → enqueue for the worker, InProcessing
 * ```
 *
 * Skip outcomes never touch the network.
 */
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use crossbeam_channel::Sender;
use tracing::{debug, warn};

use crate::admission::{RateLimiter, Sampler};
use crate::attributes::{AttributeProvider, HostAttributes, LayeredAttributes};
use crate::breadcrumbs::BreadcrumbBuffer;
use crate::clock::{Clock, SystemClock};
use crate::error::{ConfigError, ReportError, SubmissionError};
use crate::metrics::{
    AlwaysVisible, Heartbeat, MetricsContext, MetricsSession, Visibility, HEARTBEAT_INTERVAL,
};
use crate::options::{Options, ReportFilter};
use crate::protocol::endpoint::submission_url;
use crate::protocol::result::ReportResult;
use crate::protocol::types::{AttributeValue, Attachment, Attributes, Payload, Report};
use crate::storage::{FileStore, KeyValueStore, MemoryStore};
use crate::transport::{
    FlushSignal, HttpTransport, Job, ReportCallback, SubmissionApi, Transport, Worker, WorkerMsg,
};

// ---------------------------------------------------------------------------
// Internal constants
// ---------------------------------------------------------------------------

/// Bounded channel capacity. When full, new reports are dropped.
const QUEUE_CAPACITY: usize = 100;

/// How long `Guard`-style callers wait for the queue to drain by default.
pub const DEFAULT_FLUSH_TIMEOUT: Duration = Duration::from_secs(2);

// ---------------------------------------------------------------------------
// ClientBuilder
// ---------------------------------------------------------------------------

/**
 * Builds a [`Client`] from [`Options`], with optional replacements for the
 * host-facing collaborators (network, wall clock, persistent storage,
 * attribute harvesting, foreground detection).
 */
pub struct ClientBuilder {
    options: Options,
    transport: Option<Arc<dyn Transport>>,
    clock: Option<Arc<dyn Clock>>,
    store: Option<Arc<dyn KeyValueStore>>,
    attribute_provider: Option<Arc<dyn AttributeProvider>>,
    visibility: Option<Arc<dyn Visibility>>,
    heartbeat_interval: Duration,
}

impl ClientBuilder {
    pub fn new(options: Options) -> Self {
        Self {
            options,
            transport: None,
            clock: None,
            store: None,
            attribute_provider: None,
            visibility: None,
            heartbeat_interval: HEARTBEAT_INTERVAL,
        }
    }

    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn store(mut self, store: Arc<dyn KeyValueStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Replaces the harvested host attributes.
    pub fn attribute_provider(mut self, provider: Arc<dyn AttributeProvider>) -> Self {
        self.attribute_provider = Some(provider);
        self
    }

    pub fn visibility(mut self, visibility: Arc<dyn Visibility>) -> Self {
        self.visibility = Some(visibility);
        self
    }

    pub fn heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }

    /**
     * Validates the options and starts the client.
     *
     * # Steps
     * 1. Derive the submission URL from endpoint and token.
     * 2. Build admission control (rate limiter, sampler).
     * 3. Open persistent storage and harvest host attributes.
     * 4. Create the bounded channel and spawn the worker.
     * 5. Start the metrics session and its heartbeat, if enabled.
     */
    pub fn build(self) -> Result<Client, ConfigError> {
        let options = self.options;

        let url = submission_url(&options.endpoint, options.token.as_deref())?;

        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let rate_limiter = RateLimiter::new(options.rate_limit, clock.clone())?;
        let sampler = Sampler::new(options.sampling)?;

        let store = self
            .store
            .unwrap_or_else(|| open_store(options.storage_path.clone()));
        let harvested = self
            .attribute_provider
            .unwrap_or_else(|| Arc::new(HostAttributes::new(store.as_ref())));

        let transport = self
            .transport
            .unwrap_or_else(|| Arc::new(HttpTransport::new(options.timeout)));
        let api = Arc::new(SubmissionApi::new(url, transport));

        let breadcrumbs = Arc::new(BreadcrumbBuffer::new(
            options.breadcrumb_limit,
            clock.clone(),
        ));

        /*
         * `try_send` fails fast when the channel is full, which drops the
         * report instead of blocking the caller.
         */
        let (sender, receiver) = crossbeam_channel::bounded(QUEUE_CAPACITY);
        Worker::spawn(receiver, api.clone(), breadcrumbs.clone())?;

        let (metrics, heartbeat) = if options.enable_metrics_support {
            let provider: Arc<dyn AttributeProvider> = Arc::new(LayeredAttributes::new(
                harvested.clone(),
                options.user_attributes.clone(),
            ));
            let session = Arc::new(MetricsSession::new(
                &options.endpoint,
                options.token.as_deref(),
                options.metrics_submission_url.as_deref(),
                MetricsContext {
                    api: api.clone(),
                    store: store.clone(),
                    attributes: provider,
                    clock: clock.clone(),
                },
            )?);
            let visibility = self.visibility.unwrap_or_else(|| Arc::new(AlwaysVisible));
            let heartbeat = Heartbeat::start(session.clone(), visibility, self.heartbeat_interval)?;
            (Some(session), Some(heartbeat))
        } else {
            (None, None)
        };

        Ok(Client {
            api,
            sender,
            breadcrumbs,
            rate_limiter,
            sampler,
            filter: options.filter,
            harvested,
            user_attributes: options.user_attributes,
            memorized: Mutex::new(Attributes::new()),
            clock,
            metrics,
            _heartbeat: heartbeat,
        })
    }
}

/// Opens the file store, degrading to memory when the file is unusable.
fn open_store(path: Option<PathBuf>) -> Arc<dyn KeyValueStore> {
    let opened = match path {
        Some(path) => FileStore::open(path),
        None => FileStore::open_default(),
    };
    match opened {
        Ok(store) => Arc::new(store),
        Err(e) => {
            warn!(error = %e, "persistent storage unavailable; state will not survive restarts");
            Arc::new(MemoryStore::new())
        }
    }
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// Outcome of admission control for one report.
enum Admission {
    Accepted(Report),
    Skipped(ReportResult),
}

/**
 * The reporting client.
 *
 * All methods take `&self`; the client can be shared between threads
 * behind an `Arc`. Dropping it disconnects the worker (which drains what
 * is already queued) and stops the metrics heartbeat.
 */
pub struct Client {
    api: Arc<SubmissionApi>,

    /// Sender side of the bounded report channel.
    sender: Sender<WorkerMsg>,

    breadcrumbs: Arc<BreadcrumbBuffer>,
    rate_limiter: RateLimiter,
    sampler: Sampler,
    filter: Option<ReportFilter>,

    harvested: Arc<dyn AttributeProvider>,
    user_attributes: Attributes,
    memorized: Mutex<Attributes>,

    clock: Arc<dyn Clock>,
    metrics: Option<Arc<MetricsSession>>,
    _heartbeat: Option<Heartbeat>,
}

impl Client {
    /// Builds a client with the default collaborators.
    pub fn new(options: Options) -> Result<Self, ConfigError> {
        ClientBuilder::new(options).build()
    }

    pub fn builder(options: Options) -> ClientBuilder {
        ClientBuilder::new(options)
    }

    // -- report construction ------------------------------------------------

    /**
     * Creates a report stamped with the current time and, when the trail is
     * enabled, a snapshot of the breadcrumbs.
     */
    pub fn create_report(
        &self,
        payload: impl Into<Payload>,
        attributes: Attributes,
        attachment: Option<Attachment>,
    ) -> Report {
        let mut report = Report::new(payload, self.clock.now_secs());
        report.attributes = attributes;
        report.breadcrumbs = self.breadcrumbs.snapshot();
        report.attachment = attachment;
        report
    }

    /// Creates and sends a report on the calling thread.
    pub fn report(
        &self,
        payload: impl Into<Payload>,
        attributes: Attributes,
    ) -> Result<ReportResult, ReportError> {
        self.send(self.create_report(payload, attributes, None))
    }

    /// Creates a report and hands it to the background worker.
    pub fn report_in_background(
        &self,
        payload: impl Into<Payload>,
        attributes: Attributes,
        callback: Option<ReportCallback>,
    ) -> Result<ReportResult, ReportError> {
        self.send_report(self.create_report(payload, attributes, None), callback)
    }

    // -- pipeline -----------------------------------------------------------

    /**
     * Runs admission control and delivers the report on the calling thread.
     *
     * Skip outcomes come back as `Ok` results. A failed delivery becomes
     * `Err(ReportError::Submission)`.
     */
    pub fn send(&self, report: Report) -> Result<ReportResult, ReportError> {
        match self.admit(report)? {
            Admission::Skipped(result) => Ok(result),
            Admission::Accepted(report) => {
                let result = self.api.send(Arc::new(report));
                match result.error() {
                    Some(error) => Err(ReportError::Submission(error.clone())),
                    None => Ok(result),
                }
            }
        }
    }

    /**
     * Runs admission control and enqueues the report for the worker.
     *
     * Returns `InProcessing` for queued reports; `callback` then receives
     * the delivery outcome on the worker thread. Skip outcomes and a full
     * queue resolve the callback immediately.
     */
    pub fn send_report(
        &self,
        report: Report,
        callback: Option<ReportCallback>,
    ) -> Result<ReportResult, ReportError> {
        let report = match self.admit(report)? {
            Admission::Skipped(result) => {
                if let Some(callback) = callback {
                    callback(result.clone());
                }
                return Ok(result);
            }
            Admission::Accepted(report) => Arc::new(report),
        };

        let job = Job {
            report: report.clone(),
            callback,
        };

        match self.sender.try_send(WorkerMsg::Report(job)) {
            Ok(()) => Ok(ReportResult::processing(report)),
            Err(e) => {
                let error = if e.is_full() {
                    warn!("report queue is full; dropping report");
                    SubmissionError::QueueFull
                } else {
                    warn!("report worker has shut down; dropping report");
                    SubmissionError::WorkerGone
                };
                let result = ReportResult::server_error(report, error);
                if let WorkerMsg::Report(Job {
                    callback: Some(callback),
                    ..
                }) = e.into_inner()
                {
                    callback(result.clone());
                }
                Ok(result)
            }
        }
    }

    fn admit(&self, mut report: Report) -> Result<Admission, ReportError> {
        if report.id.is_none() {
            return Err(ReportError::MissingId);
        }

        if self.is_filtered(&report) {
            debug!("report dropped by filter");
            return Ok(Admission::Skipped(ReportResult::filter_hit(Arc::new(report))));
        }

        if self.sampler.is_hit() {
            debug!("report dropped by sampling");
            return Ok(Admission::Skipped(ReportResult::sampling_hit(Arc::new(
                report,
            ))));
        }

        if self.rate_limiter.should_skip(&report) {
            debug!("report dropped by rate limit");
            return Ok(Admission::Skipped(ReportResult::limit_reached(Arc::new(
                report,
            ))));
        }

        report.add_object_attributes(&self.lock_memorized());
        report.add_object_attributes(&self.user_attributes);
        report.add_object_attributes(&self.harvested.attributes());

        Ok(Admission::Accepted(report))
    }

    /**
     * Runs the user filter. A panicking filter lets the report through.
     */
    fn is_filtered(&self, report: &Report) -> bool {
        let Some(filter) = &self.filter else {
            return false;
        };

        match std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| filter(report))) {
            Ok(filtered) => filtered,
            Err(_) => {
                warn!("report filter panicked; sending report unfiltered");
                false
            }
        }
    }

    // -- attributes ---------------------------------------------------------

    /// Remembers an attribute for every subsequent report.
    pub fn memorize(&self, key: impl Into<String>, value: impl Into<AttributeValue>) {
        self.lock_memorized().insert(key.into(), value.into());
    }

    /// Same as [`Client::memorize`].
    pub fn set_attribute(&self, key: impl Into<String>, value: impl Into<AttributeValue>) {
        self.memorize(key, value);
    }

    /**
     * The attributes a report would receive right now: harvested, then
     * user attributes, then memorized values, each layer overriding the
     * previous one.
     */
    pub fn attributes(&self) -> Attributes {
        let mut attributes = self.harvested.attributes();
        attributes.extend(self.user_attributes.clone());
        attributes.extend(self.lock_memorized().clone());
        attributes
    }

    fn lock_memorized(&self) -> MutexGuard<'_, Attributes> {
        self.memorized
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    // -- breadcrumbs --------------------------------------------------------

    pub fn leave_breadcrumb(&self, message: impl Into<String>, attributes: Attributes) {
        self.breadcrumbs.add(message, attributes, None, None, None);
    }

    pub fn breadcrumbs(&self) -> &BreadcrumbBuffer {
        &self.breadcrumbs
    }

    // -- lifecycle ----------------------------------------------------------

    pub fn metrics(&self) -> Option<&Arc<MetricsSession>> {
        self.metrics.as_ref()
    }

    pub fn submission_url(&self) -> &str {
        self.api.submission_url()
    }

    /**
     * Blocks until every report queued before this call has been delivered,
     * or `timeout` elapses. Returns `true` if the queue drained in time.
     */
    pub fn flush(&self, timeout: Duration) -> bool {
        let signal = Arc::new(FlushSignal::new());

        /*
         * The channel is FIFO: by the time the worker reaches the flush
         * marker, every report enqueued before it has been handled.
         */
        match self
            .sender
            .send_timeout(WorkerMsg::Flush(signal.clone()), timeout)
        {
            Ok(()) => signal.wait_timeout(timeout),
            Err(_) => false,
        }
    }
}
