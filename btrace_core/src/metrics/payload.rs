//! Metrics wire payloads.
//!
//! Unique events count distinct occurrences along a declared uniqueness
//! dimension; summed events count occurrences per metric group. Both carry
//! the application name and version, a `dropped_events` counter and a set
//! of string attributes.

use std::collections::BTreeMap;

use serde::Serialize;

/// Attribute key naming the uniqueness dimension of unique events.
pub const UNIQUE_ATTRIBUTE: &str = "guid";

/// String-only attribute set sent with metrics events.
pub type EventAttributes = BTreeMap<String, String>;

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct Metadata {
    /// Always zero: events are never queued locally.
    pub dropped_events: u64,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct UniqueEvent {
    pub timestamp: i64,
    pub unique: Vec<String>,
    pub attributes: EventAttributes,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SummedEvent {
    pub timestamp: i64,
    pub metric_group: String,
    pub attributes: EventAttributes,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct UniqueEventsPayload {
    pub application: String,
    pub appversion: String,
    pub metadata: Metadata,
    pub unique_events: Vec<UniqueEvent>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SummedEventsPayload {
    pub application: String,
    pub appversion: String,
    pub metadata: Metadata,
    pub summed_events: Vec<SummedEvent>,
}

fn header(attributes: &EventAttributes) -> (String, String) {
    let get = |key: &str| {
        attributes
            .get(key)
            .cloned()
            .unwrap_or_else(|| "unknown".to_string())
    };
    (get("application"), get("application.version"))
}

impl UniqueEventsPayload {
    pub fn new(timestamp: i64, attributes: EventAttributes) -> Self {
        let (application, appversion) = header(&attributes);
        Self {
            application,
            appversion,
            metadata: Metadata::default(),
            unique_events: vec![UniqueEvent {
                timestamp,
                unique: vec![UNIQUE_ATTRIBUTE.to_string()],
                attributes,
            }],
        }
    }
}

impl SummedEventsPayload {
    pub fn new(timestamp: i64, metric_group: &str, attributes: EventAttributes) -> Self {
        let (application, appversion) = header(&attributes);
        Self {
            application,
            appversion,
            metadata: Metadata::default(),
            summed_events: vec![SummedEvent {
                timestamp,
                metric_group: metric_group.to_string(),
                attributes,
            }],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attributes() -> EventAttributes {
        let mut attributes = EventAttributes::new();
        attributes.insert("application".into(), "demo".into());
        attributes.insert("application.version".into(), "1.2.3".into());
        attributes.insert("guid".into(), "g".into());
        attributes
    }

    #[test]
    fn test_unique_payload_shape() {
        let json = serde_json::to_value(UniqueEventsPayload::new(7, attributes())).unwrap();
        assert_eq!(json["application"], "demo");
        assert_eq!(json["appversion"], "1.2.3");
        assert_eq!(json["metadata"]["dropped_events"], 0);
        assert_eq!(json["unique_events"][0]["timestamp"], 7);
        assert_eq!(json["unique_events"][0]["unique"][0], "guid");
        assert_eq!(json["unique_events"][0]["attributes"]["guid"], "g");
    }

    #[test]
    fn test_summed_payload_shape() {
        let json =
            serde_json::to_value(SummedEventsPayload::new(7, "Application Launches", attributes()))
                .unwrap();
        assert_eq!(json["summed_events"][0]["metric_group"], "Application Launches");
        assert_eq!(json["metadata"]["dropped_events"], 0);
    }

    #[test]
    fn test_missing_application_defaults_to_unknown() {
        let payload = UniqueEventsPayload::new(0, EventAttributes::new());
        assert_eq!(payload.application, "unknown");
        assert_eq!(payload.appversion, "unknown");
    }
}
