/*!
 * btrace: crash reporting SDK.
 *
 * This is the main crate applications should depend on. It re-exports the
 * core API, keeps one process-wide client, and wires up addons (panic hook)
 * through a single `init` call.
 *
 * # Quick start
 *
 * ```ignore
 * fn main() {
 *     let _guard = btrace::init("https://submit.backtrace.io/myteam/TOKEN/json");
 *
 *     btrace::leave_breadcrumb("Application started");
 *     btrace::report_in_background("something odd happened");
 *
 *     // panics are automatically captured (catch_panics defaults to true)
 *     // _guard is dropped here → flush() is called automatically
 * }
 * ```
 *
 * # With options
 *
 * ```ignore
 * use std::sync::Arc;
 *
 * fn main() {
 *     let _guard = btrace::init(btrace::Options {
 *         core: btrace::CoreOptions {
 *             token: Some("TOKEN".into()),
 *             rate_limit: 10,
 *             breadcrumb_limit: Some(100),
 *             filter: Some(Arc::new(|report: &btrace::Report| {
 *                 report.payload.message().contains("expected")
 *             })),
 *             ..btrace::CoreOptions::new("https://myteam.sp.backtrace.io:6098")
 *         },
 *         catch_panics: false,
 *     });
 * }
 * ```
 */

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use tracing::warn;

// ---------------------------------------------------------------------------
// Re-exports from btrace_core: the public surface area
// ---------------------------------------------------------------------------

pub use btrace_core::{
    capture_stack, convert_backtrace, AttributeValue, Attachment, Attributes, Breadcrumb, Client,
    ClientBuilder, ConfigError, Payload, Report, ReportCallback, ReportError, ReportFilter,
    ReportResult, ReportStatus, StackFrame, SubmissionError, DEFAULT_FLUSH_TIMEOUT,
};

/// Options of the underlying client.
pub use btrace_core::Options as CoreOptions;

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

/**
 * Configuration for the SDK.
 *
 * Implements `From<&str>` so you can pass just an endpoint to `init()`.
 * `catch_panics` defaults to `true`.
 */
pub struct Options {
    /// Client configuration: endpoint, token, admission control, metrics.
    pub core: CoreOptions,

    /// Whether to install a panic hook that auto-captures panics.
    pub catch_panics: bool,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            core: CoreOptions::default(),
            catch_panics: true,
        }
    }
}

/**
 * Allows `btrace::init("ENDPOINT")`: an endpoint string with all other
 * options at their defaults.
 */
impl From<&str> for Options {
    fn from(endpoint: &str) -> Self {
        Self {
            core: CoreOptions::new(endpoint),
            ..Default::default()
        }
    }
}

impl From<CoreOptions> for Options {
    fn from(core: CoreOptions) -> Self {
        Self {
            core,
            ..Default::default()
        }
    }
}

// ---------------------------------------------------------------------------
// Global client
// ---------------------------------------------------------------------------

static GLOBAL_CLIENT: OnceLock<Arc<Client>> = OnceLock::new();

/// The client registered by `init()`, if any.
pub fn client() -> Option<&'static Arc<Client>> {
    GLOBAL_CLIENT.get()
}

/**
 * Builds a client from `options` and registers it process-wide.
 *
 * Fails if the options are invalid. If a client is already registered it
 * stays in place and the new one is dropped.
 */
pub fn try_init(options: impl Into<Options>) -> Result<Guard, ConfigError> {
    let opts = options.into();

    let client = Arc::new(Client::new(opts.core)?);
    if GLOBAL_CLIENT.set(client.clone()).is_err() {
        warn!("btrace is already initialized; keeping the existing client");
    }

    /*
     * Panic hook is opt-out (enabled by default).
     */
    if opts.catch_panics {
        if let Some(client) = GLOBAL_CLIENT.get() {
            btrace_panic::install(client.clone());
        }
    }

    Ok(Guard::new())
}

/**
 * Initializes the SDK.
 *
 * Accepts either a bare endpoint string or a full `Options` struct.
 *
 * # Panics
 * Panics if the configuration is invalid. These are configuration bugs that
 * should be caught at startup; use [`try_init`] to handle them instead.
 *
 * # Returns
 * A `Guard`: keep it alive for the duration of your app. When it drops,
 * all pending reports are flushed.
 */
pub fn init(options: impl Into<Options>) -> Guard {
    match try_init(options) {
        Ok(guard) => guard,
        Err(e) => panic!("[btrace] Failed to initialize SDK: {e}"),
    }
}

// ---------------------------------------------------------------------------
// Free functions over the global client
// ---------------------------------------------------------------------------

/**
 * Reports `payload` on the calling thread and returns the outcome.
 *
 * Returns `None` if the SDK has not been initialized.
 */
pub fn report(payload: impl Into<Payload>) -> Option<Result<ReportResult, ReportError>> {
    client().map(|client| client.report(payload, Attributes::new()))
}

/**
 * Queues `payload` for background delivery. Silent no-op if the SDK has
 * not been initialized.
 */
pub fn report_in_background(payload: impl Into<Payload>) {
    if let Some(client) = client() {
        if let Err(e) = client.report_in_background(payload, Attributes::new(), None) {
            warn!(error = %e, "failed to queue report");
        }
    }
}

/**
 * Reports an error value with a stack captured at the call site.
 */
pub fn report_error(error: &(dyn std::error::Error + 'static)) {
    report_in_background(Payload::from_error(error));
}

/**
 * Appends a breadcrumb to the trail. Empty messages are ignored.
 */
pub fn leave_breadcrumb(message: &str) {
    if message.is_empty() {
        return;
    }
    if let Some(client) = client() {
        client.leave_breadcrumb(message, Attributes::new());
    }
}

/// Remembers an attribute for every subsequent report.
pub fn memorize(key: &str, value: impl Into<AttributeValue>) {
    if let Some(client) = client() {
        client.memorize(key, value);
    }
}

/**
 * Manually flushes pending reports, blocking until drained or timeout.
 *
 * Normally you don't need this: the `Guard` handles it on drop.
 */
pub fn flush(timeout: Duration) -> bool {
    match client() {
        Some(client) => client.flush(timeout),
        None => true,
    }
}

// ---------------------------------------------------------------------------
// Guard
// ---------------------------------------------------------------------------

/**
 * Flush-on-drop guard returned by `init()`.
 *
 * The guard does not own the client: the client lives in a static
 * `OnceLock` and outlives it. Dropping the guard only drains the queue.
 *
 * If the flush times out, the guard drops without blocking further.
 */
pub struct Guard {
    _private: (),
}

impl Guard {
    fn new() -> Self {
        Self { _private: () }
    }
}

impl Drop for Guard {
    fn drop(&mut self) {
        if !flush(DEFAULT_FLUSH_TIMEOUT) {
            warn!("flush timed out; some reports may not have been sent");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_options_from_endpoint() {
        let options = Options::from("https://a.sp.backtrace.io");
        assert_eq!(options.core.endpoint, "https://a.sp.backtrace.io");
        assert!(options.catch_panics);
    }

    #[test]
    fn test_try_init_rejects_invalid_options() {
        let result = try_init(Options {
            core: CoreOptions::default(),
            catch_panics: false,
        });
        assert!(matches!(result, Err(ConfigError::MissingEndpoint)));
    }

    #[test]
    fn test_free_functions_without_client_are_noops() {
        assert!(client().is_none());
        leave_breadcrumb("ignored");
        memorize("key", "value");
        report_in_background("ignored");
        assert!(report("ignored").is_none());
        assert!(flush(Duration::from_millis(1)));
    }
}
