//! Error types shared across the engine.

/// Invalid configuration. Raised at construction; the client never starts
/// in this state.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing 'endpoint' option")]
    MissingEndpoint,

    #[error("missing 'token' option or it could not be parsed from the endpoint")]
    MissingToken,

    #[error("rate limit must be greater or equal to zero, got {0}")]
    InvalidRateLimit(i64),

    #[error("sampling must be within [0, 1], got {0}")]
    InvalidSampling(f64),

    #[error("cannot derive universe and token from endpoint {0}")]
    UnresolvableEndpoint(String),

    #[error("'universe' could not be parsed from the endpoint")]
    MissingUniverse,

    #[error("failed to spawn {name} thread: {source}")]
    Spawn {
        name: &'static str,
        #[source]
        source: std::io::Error,
    },
}

/// Why an accepted report did not reach the collector.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SubmissionError {
    #[error("remote report limit reached")]
    QuotaExceeded,

    #[error("invalid attempt to submit report (HTTP {status}): {body}")]
    Rejected { status: u16, body: String },

    #[error("transport failure: {0}")]
    Transport(String),

    #[error("failed to encode report: {0}")]
    Encode(String),

    #[error("report queue is full")]
    QueueFull,

    #[error("submission worker has shut down")]
    WorkerGone,
}

/// Errors surfaced by the direct (awaiting) submission path.
#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    #[error("invalid report: missing identifier")]
    MissingId,

    #[error(transparent)]
    Submission(#[from] SubmissionError),
}
