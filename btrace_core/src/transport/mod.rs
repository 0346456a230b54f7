/**
 * Transport layer: HTTP delivery, result classification and the
 * background worker thread.
 *
 * Everything related to *how* reports reach the collector:
 * - `http`: the `Transport` trait and its ureq implementation
 * - `api`: submission API and response classification
 * - `worker`: background thread, bounded channel, flush signaling
 */

pub mod api;
pub mod http;
pub mod worker;

pub use api::SubmissionApi;
pub use http::{HttpResponse, HttpTransport, Transport, TransportError};
pub use worker::{FlushSignal, Job, ReportCallback, Worker, WorkerMsg, WORKER_THREAD_NAME};
