/**
 * Report wire encoding.
 *
 * Reports are POSTed as `multipart/form-data`:
 *
 * - `upload_file`: the JSON report body (id, timestamp, agent, attributes,
 *   annotations, classifiers, stack);
 * - `attachment_bt-breadcrumbs-0`: the breadcrumb snapshot, when present;
 * - `attachment_<name>`: the user attachment, when present.
 */
use std::collections::BTreeMap;

use serde::Serialize;
use uuid::Uuid;

use crate::error::SubmissionError;
use crate::protocol::constants::{AGENT_NAME, AGENT_VERSION, BREADCRUMBS_ATTACHMENT, REPORT_FIELD};
use crate::protocol::types::{AttributeValue, Attributes, Payload, Report, StackFrame};

// ---------------------------------------------------------------------------
// Report body
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct ThreadBody<'a> {
    name: &'static str,
    fault: bool,
    stack: &'a [StackFrame],
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ReportBody<'a> {
    uuid: String,
    timestamp: i64,
    lang: &'static str,
    lang_version: &'static str,
    agent: &'static str,
    agent_version: &'static str,
    main_thread: &'static str,
    attributes: Attributes,
    annotations: &'a BTreeMap<String, serde_json::Value>,
    classifiers: Vec<&'a str>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    threads: BTreeMap<&'static str, ThreadBody<'a>>,
}

/**
 * Serializes the JSON body sent in the `upload_file` part.
 *
 * The payload message is exposed as the `error.message` attribute unless
 * the report already sets one.
 */
pub fn report_body(report: &Report) -> Result<Vec<u8>, SubmissionError> {
    let id = report
        .id
        .ok_or_else(|| SubmissionError::Encode("report has no identifier".into()))?;

    let mut attributes = report.attributes.clone();
    attributes
        .entry("error.message".to_string())
        .or_insert_with(|| AttributeValue::from(report.payload.message()));

    let mut threads = BTreeMap::new();
    if let Payload::Error { stack, .. } = &report.payload {
        if !stack.is_empty() {
            threads.insert(
                "main",
                ThreadBody {
                    name: "main",
                    fault: true,
                    stack,
                },
            );
        }
    }

    let body = ReportBody {
        uuid: id.to_string(),
        timestamp: report.timestamp,
        lang: "rust",
        lang_version: env!("CARGO_PKG_RUST_VERSION"),
        agent: AGENT_NAME,
        agent_version: AGENT_VERSION,
        main_thread: "main",
        attributes,
        annotations: &report.annotations,
        classifiers: report.payload.classifier().into_iter().collect(),
        threads,
    };

    serde_json::to_vec(&body).map_err(|e| SubmissionError::Encode(e.to_string()))
}

// ---------------------------------------------------------------------------
// Multipart
// ---------------------------------------------------------------------------

/// A fully encoded request body plus its `Content-Type` header value.
#[derive(Debug, Clone)]
pub struct EncodedForm {
    pub content_type: String,
    pub body: Vec<u8>,
}

/// Minimal `multipart/form-data` writer.
pub struct MultipartForm {
    boundary: String,
    body: Vec<u8>,
}

impl MultipartForm {
    pub fn new() -> Self {
        Self {
            boundary: format!("----btrace-{}", Uuid::new_v4().simple()),
            body: Vec::new(),
        }
    }

    /// Appends one file part.
    pub fn part(&mut self, name: &str, filename: &str, content_type: &str, data: &[u8]) {
        let name = escape_quoted(name);
        let filename = escape_quoted(filename);
        self.body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"{name}\"; filename=\"{filename}\"\r\nContent-Type: {content_type}\r\n\r\n",
                self.boundary
            )
            .as_bytes(),
        );
        self.body.extend_from_slice(data);
        self.body.extend_from_slice(b"\r\n");
    }

    pub fn finish(mut self) -> EncodedForm {
        self.body
            .extend_from_slice(format!("--{}--\r\n", self.boundary).as_bytes());
        EncodedForm {
            content_type: format!("multipart/form-data; boundary={}", self.boundary),
            body: self.body,
        }
    }
}

/**
 * Percent-encodes the characters that would end a quoted
 * `Content-Disposition` parameter or the header line itself, as browsers
 * do for form-data names.
 */
fn escape_quoted(value: &str) -> String {
    value
        .replace('"', "%22")
        .replace('\r', "%0D")
        .replace('\n', "%0A")
}

impl Default for MultipartForm {
    fn default() -> Self {
        Self::new()
    }
}

/**
 * Encodes a report into its multipart submission body.
 */
pub fn encode_report(report: &Report) -> Result<EncodedForm, SubmissionError> {
    let mut form = MultipartForm::new();
    form.part(REPORT_FIELD, "report.json", "application/json", &report_body(report)?);

    if let Some(breadcrumbs) = &report.breadcrumbs {
        let data =
            serde_json::to_vec(breadcrumbs).map_err(|e| SubmissionError::Encode(e.to_string()))?;
        form.part(
            &format!("attachment_{BREADCRUMBS_ATTACHMENT}"),
            BREADCRUMBS_ATTACHMENT,
            "application/json",
            &data,
        );
    }

    if let Some(attachment) = &report.attachment {
        form.part(
            &format!("attachment_{}", attachment.name),
            &attachment.name,
            &attachment.content_type,
            &attachment.data,
        );
    }

    Ok(form.finish())
}
