/**
 * Background worker thread that drains the report queue, delivers each
 * report and resolves its callback.
 *
 * Architecture overview:
 *
 * ```text
 *  ┌──────────────┐     bounded channel     ┌─────────────────┐
 *  │  User code   │ ───── WorkerMsg ──────► │  Worker thread  │
 *  │ (any thread) │                         │    (single)     │
 *  └──────────────┘                         └───────┬─────────┘
 *                                                   │
 *                                          SubmissionApi::send()
 *                                                   │
 *                                     breadcrumb + callback(result)
 * ```
 *
 * The channel carries `WorkerMsg` variants:
 * - `Report(Job)`: an admitted report and its optional callback.
 * - `Flush(Arc<FlushSignal>)`: a signal requesting the worker to notify
 *   the caller once all preceding reports have been delivered.
 *
 * The worker loop runs until the channel disconnects, which happens when
 * the owning `Client` is dropped.
 */
use std::sync::{Arc, Condvar, Mutex};
use std::thread;

use crossbeam_channel::Receiver;
use tracing::warn;

use super::api::SubmissionApi;
use crate::breadcrumbs::BreadcrumbBuffer;
use crate::error::ConfigError;
use crate::protocol::result::ReportResult;
use crate::protocol::types::{AttributeValue, Attributes, Report};

/// Message recorded in the trail after every background delivery.
pub const OUTCOME_BREADCRUMB: &str = "Report sent to Backtrace";

/// Name of the background delivery thread.
pub const WORKER_THREAD_NAME: &str = "btrace-worker";

/// Invoked exactly once with the terminal result of a background send.
pub type ReportCallback = Box<dyn FnOnce(ReportResult) + Send + 'static>;

// ---------------------------------------------------------------------------
// WorkerMsg
// ---------------------------------------------------------------------------

/// An admitted report waiting for delivery.
pub struct Job {
    pub report: Arc<Report>,
    pub callback: Option<ReportCallback>,
}

/**
 * Messages that flow through the bounded channel from producer threads
 * to the single background worker.
 */
pub enum WorkerMsg {
    Report(Job),

    /**
     * A flush request. The worker signals `FlushSignal` once all messages
     * that were in the channel *before* this one have been processed.
     */
    Flush(Arc<FlushSignal>),
}

// ---------------------------------------------------------------------------
// FlushSignal
// ---------------------------------------------------------------------------

/**
 * Blocks the caller of `flush()` until the worker has drained all pending
 * messages. A `Mutex<bool>` + `Condvar` pair: the worker flips the flag and
 * notifies, the caller waits with a timeout.
 */
pub struct FlushSignal {
    mutex: Mutex<bool>,
    condvar: Condvar,
}

impl FlushSignal {
    pub fn new() -> Self {
        Self {
            mutex: Mutex::new(false),
            condvar: Condvar::new(),
        }
    }

    /// Called by the worker thread when the flush marker is reached.
    pub fn notify(&self) {
        if let Ok(mut done) = self.mutex.lock() {
            *done = true;
            self.condvar.notify_all();
        }
    }

    /**
     * Waits until the worker signals completion or `timeout` elapses.
     * Returns `true` if the flush completed in time.
     */
    pub fn wait_timeout(&self, timeout: std::time::Duration) -> bool {
        let Ok(guard) = self.mutex.lock() else {
            return false;
        };
        match self.condvar.wait_timeout_while(guard, timeout, |done| !*done) {
            Ok((_, timeout_result)) => !timeout_result.timed_out(),
            Err(_) => false,
        }
    }
}

impl Default for FlushSignal {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Outcome breadcrumb
// ---------------------------------------------------------------------------

/**
 * Appends the `{error, message, objectId}` summary of a delivery to the
 * trail, if the trail is enabled.
 */
pub fn record_outcome(breadcrumbs: &BreadcrumbBuffer, result: &ReportResult) {
    if !breadcrumbs.is_enabled() {
        return;
    }

    let mut attributes = Attributes::new();
    if let Some(error) = result.error() {
        attributes.insert("error".into(), AttributeValue::from(error.to_string()));
    }
    attributes.insert("message".into(), result.message().into());
    if let Some(object_id) = result.object_id() {
        attributes.insert("objectId".into(), object_id.into());
    }

    breadcrumbs.add(OUTCOME_BREADCRUMB, attributes, None, Some("error"), Some("log"));
}

/**
 * Runs a user callback. A panicking callback is logged and the worker
 * carries on with the next message.
 */
fn run_callback(callback: ReportCallback, result: ReportResult) {
    let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(move || callback(result)));
    if outcome.is_err() {
        warn!("report callback panicked");
    }
}

// ---------------------------------------------------------------------------
// Worker
// ---------------------------------------------------------------------------

/**
 * Handle to the background worker thread.
 *
 * It processes messages sequentially:
 * - `Report` → deliver via `SubmissionApi`, record the outcome, run the
 *   callback (a panicking callback does not stop the worker).
 * - `Flush` → signal the requester that all prior reports are done.
 */
pub struct Worker;

impl Worker {
    /**
     * Spawns the worker thread. It is fire-and-forget: no join handle is
     * kept, `Client::flush()` is the way to wait for delivery.
     */
    pub fn spawn(
        receiver: Receiver<WorkerMsg>,
        api: Arc<SubmissionApi>,
        breadcrumbs: Arc<BreadcrumbBuffer>,
    ) -> Result<(), ConfigError> {
        thread::Builder::new()
            .name(WORKER_THREAD_NAME.into())
            .spawn(move || {
                /*
                 * Callbacks are isolated in `run_callback`; this only
                 * catches panics from delivery itself.
                 */
                let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                    Self::run_loop(&receiver, &api, &breadcrumbs);
                }));

                if result.is_err() {
                    warn!("report worker panicked; pending reports will be dropped");
                }
            })
            .map(|_| ())
            .map_err(|source| ConfigError::Spawn {
                name: WORKER_THREAD_NAME,
                source,
            })
    }

    fn run_loop(
        receiver: &Receiver<WorkerMsg>,
        api: &SubmissionApi,
        breadcrumbs: &BreadcrumbBuffer,
    ) {
        while let Ok(msg) = receiver.recv() {
            match msg {
                WorkerMsg::Report(job) => {
                    let result = api.send(job.report);
                    if let Some(error) = result.error() {
                        warn!(%error, "report delivery failed");
                    }
                    record_outcome(breadcrumbs, &result);
                    if let Some(callback) = job.callback {
                        run_callback(callback, result);
                    }
                }
                WorkerMsg::Flush(signal) => {
                    signal.notify();
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::error::SubmissionError;

    #[test]
    fn test_record_outcome_summarizes_result() {
        let breadcrumbs = BreadcrumbBuffer::new(Some(5), Arc::new(ManualClock::at_secs(1)));
        let report = Arc::new(Report::new("boom", 0));

        record_outcome(&breadcrumbs, &ReportResult::ok(report.clone(), r#"{"object":"42"}"#));
        record_outcome(
            &breadcrumbs,
            &ReportResult::server_error(report, SubmissionError::QuotaExceeded),
        );

        let trail = breadcrumbs.get();
        assert_eq!(trail.len(), 2);
        assert_eq!(trail[0].message, OUTCOME_BREADCRUMB);
        assert_eq!(trail[0].level, "error");
        assert_eq!(trail[0].kind, "log");
        assert_eq!(trail[0].attributes["objectId"], AttributeValue::from("42"));
        assert!(!trail[0].attributes.contains_key("error"));
        assert_eq!(
            trail[1].attributes["error"],
            AttributeValue::from("remote report limit reached")
        );
    }

    #[test]
    fn test_record_outcome_skips_disabled_trail() {
        let breadcrumbs = BreadcrumbBuffer::new(None, Arc::new(ManualClock::at_secs(1)));
        let report = Arc::new(Report::new("boom", 0));
        record_outcome(&breadcrumbs, &ReportResult::ok(report, ""));
        assert!(breadcrumbs.is_empty());
    }

    #[test]
    fn test_panicking_callback_is_contained() {
        let report = Arc::new(Report::new("boom", 0));
        run_callback(
            Box::new(|_: ReportResult| panic!("callback failed")),
            ReportResult::ok(report, ""),
        );
    }

    #[test]
    fn test_flush_signal_times_out_without_notify() {
        let signal = FlushSignal::new();
        assert!(!signal.wait_timeout(std::time::Duration::from_millis(10)));
        signal.notify();
        assert!(signal.wait_timeout(std::time::Duration::from_millis(10)));
    }
}
