/*!
 * HTTP transport layer.
 *
 * The engine only needs one primitive from the network: POST a body with a
 * content type and read back status + body text. That primitive is the
 * [`Transport`] trait; [`HttpTransport`] implements it with `ureq`, a
 * pure-Rust blocking client. Blocking is fine here: report delivery runs on
 * the dedicated worker thread (or on a caller that explicitly chose the
 * direct path), and metrics run on the heartbeat thread.
 *
 * HTTP error statuses are returned as responses, not errors, so the
 * classifier can tell a 429 from a 500.
 */

use std::time::Duration;

use ureq::Agent;

/// Status and body text of a completed request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

/// The request never produced a response (DNS, connect, timeout, I/O).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct TransportError(pub String);

/// Something that can POST a body and report the response.
pub trait Transport: Send + Sync {
    fn post(&self, url: &str, content_type: &str, body: &[u8])
        -> Result<HttpResponse, TransportError>;
}

/**
 * `ureq`-backed transport with a global per-request timeout.
 */
pub struct HttpTransport {
    agent: Agent,
}

impl HttpTransport {
    /**
     * Creates a transport whose requests give up after `timeout`.
     *
     * Connection pooling and keep-alive are handled by the agent internally.
     */
    pub fn new(timeout: Duration) -> Self {
        let agent: Agent = Agent::config_builder()
            .timeout_global(Some(timeout))
            .http_status_as_error(false)
            .build()
            .into();

        Self { agent }
    }
}

impl Transport for HttpTransport {
    fn post(
        &self,
        url: &str,
        content_type: &str,
        body: &[u8],
    ) -> Result<HttpResponse, TransportError> {
        let mut response = self
            .agent
            .post(url)
            .header("Content-Type", content_type)
            .send(body)
            .map_err(|e| TransportError(e.to_string()))?;

        let status = response.status().as_u16();
        let body = response
            .body_mut()
            .read_to_string()
            .map_err(|e| TransportError(format!("failed to read response body: {e}")))?;

        Ok(HttpResponse { status, body })
    }
}
