/**
 * Submission API: turns transport outcomes into typed results.
 *
 * One delivery attempt per report, no retries:
 *
 * | outcome                       | result                                 |
 * |-------------------------------|----------------------------------------|
 * | HTTP 200                      | `Ok`, receipt parsed from the body     |
 * | HTTP 429                      | `ServerError` / `QuotaExceeded`        |
 * | any other status              | `ServerError` / `Rejected{status,body}`|
 * | transport or encoding failure | `ServerError` carrying the error       |
 *
 * Metrics calls reduce everything to a boolean.
 */
use std::sync::Arc;

use serde::Serialize;
use tracing::debug;

use crate::error::SubmissionError;
use crate::protocol::form::encode_report;
use crate::protocol::result::ReportResult;
use crate::protocol::types::Report;
use crate::transport::http::{HttpResponse, Transport};

/// Maps a completed HTTP response to a report result.
pub fn classify_response(report: Arc<Report>, response: HttpResponse) -> ReportResult {
    match response.status {
        200 => ReportResult::ok(report, &response.body),
        429 => ReportResult::server_error(report, SubmissionError::QuotaExceeded),
        status => ReportResult::server_error(
            report,
            SubmissionError::Rejected {
                status,
                body: response.body,
            },
        ),
    }
}

/**
 * Delivers reports to the resolved submission URL and metrics payloads to
 * their endpoints, over a shared transport.
 */
pub struct SubmissionApi {
    submission_url: String,
    transport: Arc<dyn Transport>,
}

impl SubmissionApi {
    pub fn new(submission_url: String, transport: Arc<dyn Transport>) -> Self {
        Self {
            submission_url,
            transport,
        }
    }

    pub fn submission_url(&self) -> &str {
        &self.submission_url
    }

    /**
     * Encodes and POSTs one report, classifying whatever happens. Never
     * fails: errors become `ServerError` results.
     */
    pub fn send(&self, report: Arc<Report>) -> ReportResult {
        let form = match encode_report(&report) {
            Ok(form) => form,
            Err(e) => return ReportResult::server_error(report, e),
        };

        match self
            .transport
            .post(&self.submission_url, &form.content_type, &form.body)
        {
            Ok(response) => classify_response(report, response),
            Err(e) => ReportResult::server_error(report, SubmissionError::Transport(e.0)),
        }
    }

    /**
     * POSTs a JSON metrics payload. Returns `true` only on HTTP 200; every
     * failure is swallowed.
     */
    pub fn send_metrics<T: Serialize>(&self, url: &str, payload: &T) -> bool {
        let body = match serde_json::to_vec(payload) {
            Ok(body) => body,
            Err(e) => {
                debug!(error = %e, "failed to encode metrics payload");
                return false;
            }
        };

        match self.transport.post(url, "application/json", &body) {
            Ok(response) if response.status == 200 => true,
            Ok(response) => {
                debug!(status = response.status, "metrics submission rejected");
                false
            }
            Err(e) => {
                debug!(error = %e, "metrics submission failed");
                false
            }
        }
    }
}
