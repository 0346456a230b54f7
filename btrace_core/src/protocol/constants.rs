/**
 * SDK-wide constants.
 *
 * Agent identity is baked into every report body; hosts and paths are
 * the fixed parts of the collection service layout.
 */

/// Agent name reported in the `agent` field of every report.
pub const AGENT_NAME: &str = "btrace-rust";

/// Agent version, derived at compile time from the `btrace_core` package version.
pub const AGENT_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Host marker identifying a direct submission URL of the collection service.
pub const SUBMIT_HOST: &str = "submit.backtrace.io";

/// Path marker that precedes the universe segment in a submission URL.
pub const UNIVERSE_MARKER: &str = "backtrace.io/";

/// Length of a submission token embedded in a submission URL path.
pub const TOKEN_LENGTH: usize = 64;

/// Default host receiving unique/summed metrics events.
pub const DEFAULT_METRICS_HOST: &str = "https://events.backtrace.io";

/// Multipart field holding the JSON report body.
pub const REPORT_FIELD: &str = "upload_file";

/// Multipart field holding the serialized breadcrumb trail.
pub const BREADCRUMBS_ATTACHMENT: &str = "bt-breadcrumbs-0";
