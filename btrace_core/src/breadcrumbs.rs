/**
 * Bounded breadcrumb trail.
 *
 * Records lightweight events describing recent application activity. The
 * trail holds at most `limit` entries; adding to a full trail evicts the
 * oldest entry first. Every entry gets a fresh id from a monotonic counter,
 * so ids are never reused even after eviction.
 *
 * A limit that is unset or non-positive disables the trail: `add` becomes a
 * no-op and reports carry no breadcrumbs.
 *
 * The buffer is shared by the caller threads and the submission worker
 * (which records the outcome of each background send), so its state sits
 * behind a `Mutex`.
 */
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use crate::clock::Clock;
use crate::protocol::types::{Attributes, Breadcrumb};

/// Level used when none is given.
pub const DEFAULT_LEVEL: &str = "info";

/// Type used when none is given.
pub const DEFAULT_KIND: &str = "manual";

struct Trail {
    entries: VecDeque<Breadcrumb>,
    next_id: u64,
}

/**
 * FIFO-evicted breadcrumb trail.
 */
pub struct BreadcrumbBuffer {
    /// `None` when disabled.
    limit: Option<usize>,
    clock: Arc<dyn Clock>,
    trail: Mutex<Trail>,
}

impl BreadcrumbBuffer {
    /**
     * Creates a buffer holding up to `limit` entries. `None`, zero and
     * negative limits disable the trail.
     */
    pub fn new(limit: Option<i64>, clock: Arc<dyn Clock>) -> Self {
        let limit = limit
            .filter(|l| *l > 0)
            .and_then(|l| usize::try_from(l).ok());
        Self {
            limit,
            clock,
            trail: Mutex::new(Trail {
                entries: VecDeque::new(),
                next_id: 0,
            }),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.limit.is_some()
    }

    /**
     * Records a breadcrumb with all fields explicit. `timestamp` is in
     * milliseconds and defaults to now; `level` and `kind` default to
     * `"info"` and `"manual"`.
     */
    pub fn add(
        &self,
        message: impl Into<String>,
        attributes: Attributes,
        timestamp: Option<i64>,
        level: Option<&str>,
        kind: Option<&str>,
    ) {
        let Some(limit) = self.limit else {
            return;
        };
        let Ok(mut trail) = self.trail.lock() else {
            return;
        };

        while trail.entries.len() >= limit {
            trail.entries.pop_front();
        }

        let id = trail.next_id;
        trail.next_id += 1;
        trail.entries.push_back(Breadcrumb {
            id,
            timestamp: timestamp.unwrap_or_else(|| self.clock.now_millis()),
            level: level.unwrap_or(DEFAULT_LEVEL).to_string(),
            kind: kind.unwrap_or(DEFAULT_KIND).to_string(),
            message: message.into(),
            attributes,
        });
    }

    /// Records a breadcrumb with default timestamp, level and type.
    pub fn add_message(&self, message: impl Into<String>) {
        self.add(message, Attributes::new(), None, None, None);
    }

    /**
     * Returns the current trail, oldest first.
     *
     * The returned vector is a copy taken under the lock; it does not
     * observe later additions.
     */
    pub fn get(&self) -> Vec<Breadcrumb> {
        self.trail
            .lock()
            .map(|trail| trail.entries.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Snapshot to attach to a new report, `None` when disabled.
    pub fn snapshot(&self) -> Option<Vec<Breadcrumb>> {
        self.is_enabled().then(|| self.get())
    }

    pub fn len(&self) -> usize {
        self.trail.lock().map(|t| t.entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
