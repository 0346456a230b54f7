/**
 * Client configuration.
 *
 * Every field except `endpoint` has a default, so the usual way to build
 * options is:
 *
 * ```ignore
 * let options = btrace_core::Options {
 *     token: Some("TOKEN".into()),
 *     rate_limit: 10,
 *     breadcrumb_limit: Some(50),
 *     ..btrace_core::Options::new("https://myteam.sp.backtrace.io:6098")
 * };
 * ```
 */
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::protocol::types::{Attributes, Report};

/// Returns `true` to drop the report before it is sent.
pub type ReportFilter = Arc<dyn Fn(&Report) -> bool + Send + Sync>;

/// Default per-request network timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Clone)]
pub struct Options {
    /// Per-request network timeout for report and metrics submission.
    pub timeout: Duration,

    /// Collector address: a direct submission URL or a server URL whose
    /// first hostname label is the universe.
    pub endpoint: String,

    /// Submission token. May instead be embedded in the endpoint.
    pub token: Option<String>,

    /// Attributes attached to every report and metrics event.
    pub user_attributes: Attributes,

    /// Probability of keeping a report, within `[0, 1]`. `None` keeps all.
    pub sampling: Option<f64>,

    /// Maximum reports admitted per minute. `0` disables the limit.
    pub rate_limit: i64,

    /// Drops reports it returns `true` for.
    pub filter: Option<ReportFilter>,

    /// Breadcrumb trail capacity. `None` or non-positive disables the trail.
    pub breadcrumb_limit: Option<i64>,

    /// Maintain a usage-metrics session.
    pub enable_metrics_support: bool,

    /// Overrides the metrics host (`https://events.backtrace.io`).
    pub metrics_submission_url: Option<String>,

    /// Location of the state file. Defaults to the platform data directory.
    pub storage_path: Option<PathBuf>,
}

impl Options {
    /// Defaults with the given endpoint.
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            ..Self::default()
        }
    }
}

impl Default for Options {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            endpoint: String::new(),
            token: None,
            user_attributes: Attributes::new(),
            sampling: None,
            rate_limit: 0,
            filter: None,
            breadcrumb_limit: None,
            enable_metrics_support: true,
            metrics_submission_url: None,
            storage_path: None,
        }
    }
}

impl std::fmt::Debug for Options {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Options")
            .field("timeout", &self.timeout)
            .field("endpoint", &self.endpoint)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("user_attributes", &self.user_attributes)
            .field("sampling", &self.sampling)
            .field("rate_limit", &self.rate_limit)
            .field("filter", &self.filter.is_some())
            .field("breadcrumb_limit", &self.breadcrumb_limit)
            .field("enable_metrics_support", &self.enable_metrics_support)
            .field("metrics_submission_url", &self.metrics_submission_url)
            .field("storage_path", &self.storage_path)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = Options::new("https://a.sp.backtrace.io");
        assert_eq!(options.endpoint, "https://a.sp.backtrace.io");
        assert_eq!(options.timeout, Duration::from_secs(15));
        assert_eq!(options.rate_limit, 0);
        assert!(options.enable_metrics_support);
        assert!(options.sampling.is_none());
        assert!(options.breadcrumb_limit.is_none());
    }

    #[test]
    fn test_debug_redacts_token() {
        let options = Options {
            token: Some("secret".into()),
            ..Options::default()
        };
        let rendered = format!("{options:?}");
        assert!(!rendered.contains("secret"));
        assert!(rendered.contains("<redacted>"));
    }
}
