/**
 * Core type definitions for reports and breadcrumbs.
 *
 * A `Report` is one error or message instance created by the `Client` and
 * handed to the submission pipeline. Attributes are restricted to the
 * closed set of primitive kinds the collection service indexes; anything
 * richer goes into annotations or an attachment.
 */
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Attributes
// ---------------------------------------------------------------------------

/// Largest magnitude below which every integral `f64` is exact (2^53).
const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_992.0;

/**
 * A primitive attribute value: string, number or boolean.
 *
 * Serialized untagged, so `{"mobile": false, "process.age": 12}` round-trips
 * as plain JSON scalars.
 */
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    Bool(bool),
    Number(f64),
    String(String),
}

impl AttributeValue {
    /**
     * Renders the value the way metrics events expect it: every attribute
     * is sent as a string. Integral numbers within the exactly representable
     * range drop their fractional part so `3.0` becomes `"3"`.
     */
    pub fn to_metric_string(&self) -> String {
        match self {
            AttributeValue::String(s) => s.clone(),
            AttributeValue::Bool(b) => b.to_string(),
            AttributeValue::Number(n) if n.fract() == 0.0 && n.abs() < MAX_SAFE_INTEGER => {
                format!("{}", *n as i64)
            }
            AttributeValue::Number(n) => n.to_string(),
        }
    }

    /// Returns the inner string, if this is a string value.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttributeValue::String(s) => Some(s),
            _ => None,
        }
    }

    /**
     * Coerces a JSON value into an attribute, discarding kinds the
     * attribute bag cannot hold (null, arrays, objects).
     */
    pub fn from_json(value: &serde_json::Value) -> Option<Self> {
        match value {
            serde_json::Value::String(s) => Some(AttributeValue::String(s.clone())),
            serde_json::Value::Bool(b) => Some(AttributeValue::Bool(*b)),
            serde_json::Value::Number(n) => n.as_f64().map(AttributeValue::Number),
            _ => None,
        }
    }
}

impl From<&str> for AttributeValue {
    fn from(value: &str) -> Self {
        AttributeValue::String(value.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(value: String) -> Self {
        AttributeValue::String(value)
    }
}

impl From<bool> for AttributeValue {
    fn from(value: bool) -> Self {
        AttributeValue::Bool(value)
    }
}

impl From<f64> for AttributeValue {
    fn from(value: f64) -> Self {
        AttributeValue::Number(value)
    }
}

impl From<i64> for AttributeValue {
    fn from(value: i64) -> Self {
        AttributeValue::Number(value as f64)
    }
}

impl From<i32> for AttributeValue {
    fn from(value: i32) -> Self {
        AttributeValue::Number(f64::from(value))
    }
}

impl From<u32> for AttributeValue {
    fn from(value: u32) -> Self {
        AttributeValue::Number(f64::from(value))
    }
}

/// Ordered attribute bag keyed by attribute name.
pub type Attributes = BTreeMap<String, AttributeValue>;

/**
 * Converts a JSON object into an attribute bag, dropping non-primitive
 * members. Non-object input yields an empty bag.
 */
pub fn attributes_from_json(value: &serde_json::Value) -> Attributes {
    value
        .as_object()
        .map(|map| {
            map.iter()
                .filter_map(|(k, v)| AttributeValue::from_json(v).map(|v| (k.clone(), v)))
                .collect()
        })
        .unwrap_or_default()
}

// ---------------------------------------------------------------------------
// Payload
// ---------------------------------------------------------------------------

/**
 * A single stack frame, from the most recent call to the earliest.
 */
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StackFrame {
    /// Demangled function / symbol name.
    #[serde(rename = "funcName", skip_serializing_if = "Option::is_none")]
    pub function: Option<String>,

    /// Source file path, if debug info is available.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub column: Option<u32>,
}

/**
 * What the report is about: a structured error or a free-text message.
 */
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Error {
        /// Error class name, e.g. `"io::Error"` or `"panic"`.
        name: String,
        message: String,
        stack: Vec<StackFrame>,
    },
    Message(String),
}

impl Payload {
    /**
     * Builds an error payload from any `std::error::Error`, capturing a
     * backtrace at the call site.
     */
    pub fn from_error(error: &(dyn std::error::Error + 'static)) -> Self {
        Payload::Error {
            name: "Error".to_string(),
            message: error.to_string(),
            stack: crate::capture_stack(),
        }
    }

    /// The human-readable message, for either variant.
    pub fn message(&self) -> &str {
        match self {
            Payload::Error { message, .. } => message,
            Payload::Message(message) => message,
        }
    }

    /// The error class name, or `None` for plain messages.
    pub fn classifier(&self) -> Option<&str> {
        match self {
            Payload::Error { name, .. } => Some(name),
            Payload::Message(_) => None,
        }
    }
}

impl Default for Payload {
    fn default() -> Self {
        Payload::Message(String::new())
    }
}

impl From<&str> for Payload {
    fn from(value: &str) -> Self {
        Payload::Message(value.to_string())
    }
}

impl From<String> for Payload {
    fn from(value: String) -> Self {
        Payload::Message(value)
    }
}

// ---------------------------------------------------------------------------
// Attachment
// ---------------------------------------------------------------------------

/**
 * Opaque blob sent as its own multipart part, next to the report body.
 */
#[derive(Debug, Clone, PartialEq)]
pub struct Attachment {
    /// Part name suffix; the field is sent as `attachment_<name>`.
    pub name: String,
    pub content_type: String,
    pub data: Vec<u8>,
}

impl Attachment {
    /// A plain-text attachment.
    pub fn text(name: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            content_type: "text/plain".to_string(),
            data: text.into().into_bytes(),
        }
    }

    /// A JSON attachment serialized from an arbitrary value.
    pub fn json(name: impl Into<String>, value: &serde_json::Value) -> Self {
        Self {
            name: name.into(),
            content_type: "application/json".to_string(),
            data: value.to_string().into_bytes(),
        }
    }
}

// ---------------------------------------------------------------------------
// Breadcrumb
// ---------------------------------------------------------------------------

/**
 * One recorded trail event. Ordering is insertion order; `id` breaks ties
 * between equal timestamps.
 */
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Breadcrumb {
    pub id: u64,

    /// Milliseconds since the Unix epoch.
    pub timestamp: i64,

    pub level: String,

    #[serde(rename = "type")]
    pub kind: String,

    pub message: String,

    pub attributes: Attributes,
}

// ---------------------------------------------------------------------------
// Report
// ---------------------------------------------------------------------------

/**
 * One error/event instance submitted for delivery.
 *
 * Created through `Client::create_report` (or `Report::new`), which assigns
 * a fresh id. A report whose `id` is `None` is rejected by the pipeline
 * before any admission check runs.
 */
#[derive(Debug, Clone, Default)]
pub struct Report {
    pub id: Option<Uuid>,

    /// Seconds since the Unix epoch at creation.
    pub timestamp: i64,

    pub payload: Payload,

    pub attributes: Attributes,

    /// Free-form structured context, serialized as-is.
    pub annotations: BTreeMap<String, serde_json::Value>,

    /// Snapshot of the breadcrumb trail at creation, `None` when disabled.
    pub breadcrumbs: Option<Vec<Breadcrumb>>,

    pub attachment: Option<Attachment>,
}

impl Report {
    /// Creates a report with a fresh id at the given timestamp (seconds).
    pub fn new(payload: impl Into<Payload>, timestamp: i64) -> Self {
        Self {
            id: Some(Uuid::new_v4()),
            timestamp,
            payload: payload.into(),
            ..Default::default()
        }
    }

    /// Sets a single attribute, replacing any previous value for `key`.
    pub fn set_attribute(&mut self, key: impl Into<String>, value: impl Into<AttributeValue>) {
        self.attributes.insert(key.into(), value.into());
    }

    /**
     * Merges `attributes` into the report. Keys the report already holds
     * are left untouched.
     */
    pub fn add_object_attributes(&mut self, attributes: &Attributes) {
        for (key, value) in attributes {
            self.attributes
                .entry(key.clone())
                .or_insert_with(|| value.clone());
        }
    }

    pub fn add_annotation(&mut self, key: impl Into<String>, value: serde_json::Value) {
        self.annotations.insert(key.into(), value);
    }
}
