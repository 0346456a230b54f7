/**
 * Typed outcome of a single admission/send attempt.
 *
 * Skip outcomes (`FilterHit`, `SamplingHit`, `LimitReached`) are produced
 * by the pipeline before any network interaction. `InProcessing` is the
 * only non-terminal status: it is what the background path hands back
 * while the worker is still delivering.
 */
use std::sync::Arc;

use serde::Deserialize;

use crate::error::SubmissionError;
use crate::protocol::types::Report;

/// Status of a [`ReportResult`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReportStatus {
    /// The sampler decided to drop the report.
    SamplingHit,
    /// The local rate limit for the current window is used up.
    LimitReached,
    /// Delivery failed: transport error, quota or non-200 response.
    ServerError,
    /// The collector accepted the report.
    Ok,
    /// Accepted and handed to the worker; the real outcome arrives later.
    InProcessing,
    /// The user filter rejected the report.
    FilterHit,
}

impl ReportStatus {
    pub fn is_terminal(self) -> bool {
        self != ReportStatus::InProcessing
    }
}

/// Receipt returned by the collector on success.
#[derive(Debug, Default, Deserialize)]
struct Receipt {
    #[serde(rename = "_rxid")]
    rx_id: Option<String>,
    object: Option<String>,
    message: Option<String>,
}

/**
 * Outcome of submitting one report. Immutable once constructed.
 */
#[derive(Debug, Clone)]
pub struct ReportResult {
    status: ReportStatus,
    message: String,
    report: Arc<Report>,
    error: Option<SubmissionError>,
    object_id: Option<String>,
}

impl ReportResult {
    fn new(report: Arc<Report>, message: &str, status: ReportStatus) -> Self {
        Self {
            status,
            message: message.to_string(),
            report,
            error: None,
            object_id: None,
        }
    }

    pub fn processing(report: Arc<Report>) -> Self {
        Self::new(
            report,
            "Data were sent to the API and are waiting for the server result",
            ReportStatus::InProcessing,
        )
    }

    /**
     * Successful delivery. `body` is the raw response text; when it is a
     * JSON receipt its `object` (or `_rxid`) becomes the object id and its
     * `message`, if any, replaces the default message.
     */
    pub fn ok(report: Arc<Report>, body: &str) -> Self {
        let mut result = Self::new(
            report,
            "Report is available on the server",
            ReportStatus::Ok,
        );
        let receipt: Receipt = serde_json::from_str(body).unwrap_or_default();
        result.object_id = receipt
            .object
            .filter(|o| !o.is_empty())
            .or(receipt.rx_id.filter(|r| !r.is_empty()));
        if let Some(message) = receipt.message.filter(|m| !m.is_empty()) {
            result.message = message;
        }
        result
    }

    pub fn limit_reached(report: Arc<Report>) -> Self {
        Self::new(report, "Client report limit reached", ReportStatus::LimitReached)
    }

    pub fn sampling_hit(report: Arc<Report>) -> Self {
        Self::new(report, "Sampling hit", ReportStatus::SamplingHit)
    }

    pub fn filter_hit(report: Arc<Report>) -> Self {
        Self::new(report, "Filter hit", ReportStatus::FilterHit)
    }

    pub fn server_error(report: Arc<Report>, error: SubmissionError) -> Self {
        let mut result = Self::new(report, &error.to_string(), ReportStatus::ServerError);
        result.error = Some(error);
        result
    }

    pub fn status(&self) -> ReportStatus {
        self.status
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// The report this result refers to.
    pub fn report(&self) -> &Arc<Report> {
        &self.report
    }

    pub fn error(&self) -> Option<&SubmissionError> {
        self.error.as_ref()
    }

    /// Server-assigned object id, when the collector returned one.
    pub fn object_id(&self) -> Option<&str> {
        self.object_id.as_deref()
    }
}
