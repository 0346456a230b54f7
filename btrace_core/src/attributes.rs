//! Environment attribute harvesting.
//!
//! Every report is enriched with a read-only snapshot of host properties.
//! The snapshot is produced by an [`AttributeProvider`]; [`HostAttributes`]
//! is the default one, describing the running process and machine.

use std::sync::Arc;
use std::time::Instant;

use crate::protocol::constants::AGENT_VERSION;
use crate::protocol::types::{AttributeValue, Attributes};
use crate::storage::{installation_guid, KeyValueStore};

/// Produces a fresh attribute snapshot on every call.
pub trait AttributeProvider: Send + Sync {
    fn attributes(&self) -> Attributes;
}

impl<F> AttributeProvider for F
where
    F: Fn() -> Attributes + Send + Sync,
{
    fn attributes(&self) -> Attributes {
        self()
    }
}

/// Process and machine attributes.
pub struct HostAttributes {
    application: String,
    guid: String,
    started: Instant,
}

impl HostAttributes {
    /**
     * Captures the static part of the snapshot. The installation guid is
     * read from (or created in) `store`.
     */
    pub fn new(store: &dyn KeyValueStore) -> Self {
        let application = std::env::current_exe()
            .ok()
            .and_then(|p| p.file_stem().map(|s| s.to_string_lossy().into_owned()))
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| "unknown".to_string());

        Self {
            application,
            guid: installation_guid(store),
            started: Instant::now(),
        }
    }

    pub fn guid(&self) -> &str {
        &self.guid
    }
}

impl AttributeProvider for HostAttributes {
    fn attributes(&self) -> Attributes {
        let mut attributes = Attributes::new();
        let mut put = |key: &str, value: AttributeValue| {
            attributes.insert(key.to_string(), value);
        };

        put("application", self.application.as_str().into());
        put("guid", self.guid.as_str().into());
        put("backtrace.version", AGENT_VERSION.into());
        put(
            "process.age",
            AttributeValue::Number(self.started.elapsed().as_secs() as f64),
        );
        put("process.id", std::process::id().into());
        put("uname.sysname", std::env::consts::OS.into());
        put("uname.machine", std::env::consts::ARCH.into());

        if let Ok(n) = std::thread::available_parallelism() {
            put("cpu.count", AttributeValue::Number(n.get() as f64));
        }
        if let Some(host) = std::env::var("HOSTNAME")
            .or_else(|_| std::env::var("COMPUTERNAME"))
            .ok()
            .filter(|h| !h.is_empty())
        {
            put("hostname", host.into());
        }
        if let Some(lang) = std::env::var("LANG").ok().filter(|l| !l.is_empty()) {
            put("language", lang.into());
        }

        attributes
    }
}

/// A base provider with fixed attributes laid on top of it.
pub struct LayeredAttributes {
    base: Arc<dyn AttributeProvider>,
    overrides: Attributes,
}

impl LayeredAttributes {
    pub fn new(base: Arc<dyn AttributeProvider>, overrides: Attributes) -> Self {
        Self { base, overrides }
    }
}

impl AttributeProvider for LayeredAttributes {
    fn attributes(&self) -> Attributes {
        let mut attributes = self.base.attributes();
        attributes.extend(
            self.overrides
                .iter()
                .map(|(k, v)| (k.clone(), v.clone())),
        );
        attributes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{MemoryStore, GUID_KEY};

    #[test]
    fn test_layered_overrides_win() {
        let base: Arc<dyn AttributeProvider> = Arc::new(|| {
            let mut attributes = Attributes::new();
            attributes.insert("application".into(), "host".into());
            attributes.insert("guid".into(), "g".into());
            attributes
        });
        let mut overrides = Attributes::new();
        overrides.insert("application".into(), "mine".into());

        let attributes = LayeredAttributes::new(base, overrides).attributes();
        assert_eq!(attributes["application"], AttributeValue::from("mine"));
        assert_eq!(attributes["guid"], AttributeValue::from("g"));
    }

    #[test]
    fn test_host_attributes_include_guid_and_application() {
        let store = MemoryStore::new();
        let host = HostAttributes::new(&store);
        let attributes = host.attributes();

        assert_eq!(
            attributes.get("guid").and_then(AttributeValue::as_str),
            store.get(GUID_KEY).as_deref()
        );
        assert!(attributes.contains_key("application"));
        assert_eq!(
            attributes.get("uname.sysname").and_then(AttributeValue::as_str),
            Some(std::env::consts::OS)
        );
    }

    #[test]
    fn test_closure_provider() {
        let provider = || {
            let mut attributes = Attributes::new();
            attributes.insert("a".into(), true.into());
            attributes
        };
        assert_eq!(provider.attributes().len(), 1);
    }
}
