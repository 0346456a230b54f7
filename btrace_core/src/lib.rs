/*!
 * btrace core: the report submission engine.
 *
 * This crate provides admission control, the breadcrumb trail, transport,
 * the background worker and usage-metrics sessions. Applications usually
 * depend on the `btrace` facade instead, which owns a process-wide client
 * and wires up the panic hook.
 *
 * # Module structure
 *
 * - `protocol/`: what we send (reports, results, endpoints, wire encoding)
 * - `admission/`: local gates, the sampler and rate limiter
 * - `transport/`: how we deliver (HTTP, classification, background worker)
 * - `metrics/`: session identity, unique/summed events, heartbeat
 * - `breadcrumbs`: bounded trail of recent events
 * - `storage`: durable key-value state
 * - `attributes`: host attribute harvesting
 * - `client`: the pipeline tying everything together
 */

pub mod admission;
pub mod attributes;
pub mod breadcrumbs;
mod client;
pub mod clock;
pub mod error;
pub mod metrics;
mod options;
pub mod protocol;
pub mod storage;
pub mod transport;

// ---------------------------------------------------------------------------
// Re-exports
// ---------------------------------------------------------------------------

pub use client::{Client, ClientBuilder, DEFAULT_FLUSH_TIMEOUT};
pub use error::{ConfigError, ReportError, SubmissionError};
pub use options::{Options, ReportFilter, DEFAULT_TIMEOUT};
pub use protocol::constants::{AGENT_NAME, AGENT_VERSION};
pub use protocol::result::{ReportResult, ReportStatus};
pub use protocol::types::{
    AttributeValue, Attachment, Attributes, Breadcrumb, Payload, Report, StackFrame,
};
pub use transport::ReportCallback;

// ---------------------------------------------------------------------------
// Stack capture
// ---------------------------------------------------------------------------

/**
 * Captures the stack at the current call site.
 */
pub fn capture_stack() -> Vec<StackFrame> {
    convert_backtrace(&backtrace::Backtrace::new())
}

/**
 * Converts a `backtrace::Backtrace` into report stack frames.
 * Frames with neither a file nor a function name are skipped.
 */
pub fn convert_backtrace(bt: &backtrace::Backtrace) -> Vec<StackFrame> {
    let mut frames = Vec::new();

    for frame in bt.frames() {
        for symbol in frame.symbols() {
            let function = symbol.name().map(|n| n.to_string());
            let path = symbol.filename().map(|p| p.display().to_string());

            if function.is_none() && path.is_none() {
                continue;
            }

            frames.push(StackFrame {
                function,
                path,
                line: symbol.lineno(),
                column: symbol.colno(),
            });
        }
    }

    frames
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_convert_skips_empty_frames() {
        let bt = backtrace::Backtrace::new();
        assert!(convert_backtrace(&bt)
            .iter()
            .all(|f| f.function.is_some() || f.path.is_some()));
    }

    #[test]
    fn test_error_payload_carries_message() {
        let error = std::io::Error::new(std::io::ErrorKind::NotFound, "missing file");
        let payload = Payload::from_error(&error);
        assert_eq!(payload.message(), "missing file");
        assert_eq!(payload.classifier(), Some("Error"));
    }
}
