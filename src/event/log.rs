//! EventLog - append-only record of a provisioning run
//!
//! - Event: envelope with id + timestamp + kind
//! - EventKind: 9 variants across 3 levels (run/layer/resource)
//! - EventLog: thread-safe, append-only log
//!
//! Events carry output key names only, never output values.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::RwLock;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Single event in the run log
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// Monotonic sequence ID (for ordering)
    pub id: u64,
    /// Time since log creation (ms)
    pub timestamp_ms: u64,
    /// Event type and data
    pub kind: EventKind,
}

/// All possible event types (3 levels)
///
/// Uses Arc<str> for resource names to enable zero-cost cloning.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventKind {
    // ═══════════════════════════════════════════
    // RUN LEVEL
    // ═══════════════════════════════════════════
    RunStarted {
        resource_count: usize,
        layer_count: usize,
    },
    RunCompleted {
        succeeded: usize,
        failed: usize,
        skipped: usize,
        cancelled: usize,
        total_duration_ms: u64,
    },

    // ═══════════════════════════════════════════
    // LAYER LEVEL
    // ═══════════════════════════════════════════
    LayerStarted {
        index: usize,
        resources: Vec<Arc<str>>,
    },

    // ═══════════════════════════════════════════
    // RESOURCE LEVEL
    // ═══════════════════════════════════════════
    ResourceStarted {
        resource: Arc<str>,
        kind: String,
        /// Non-secret resolved parameters
        parameters: Value,
    },
    ResourceAdopted {
        resource: Arc<str>,
        external_id: String,
        output_keys: Vec<String>,
        duration_ms: u64,
    },
    ResourceCreated {
        resource: Arc<str>,
        output_keys: Vec<String>,
        duration_ms: u64,
    },
    ResourceFailed {
        resource: Arc<str>,
        code: String,
        phase: String,
        error: String,
    },
    ResourceSkipped {
        resource: Arc<str>,
        dependency: Arc<str>,
    },
    ResourceCancelled {
        resource: Arc<str>,
    },
}

impl EventKind {
    /// Extract the resource name if event is resource-related
    pub fn resource(&self) -> Option<&str> {
        match self {
            Self::ResourceStarted { resource, .. }
            | Self::ResourceAdopted { resource, .. }
            | Self::ResourceCreated { resource, .. }
            | Self::ResourceFailed { resource, .. }
            | Self::ResourceSkipped { resource, .. }
            | Self::ResourceCancelled { resource } => Some(resource),
            Self::RunStarted { .. } | Self::RunCompleted { .. } | Self::LayerStarted { .. } => None,
        }
    }

    /// Check if this is a run-level event
    pub fn is_run_event(&self) -> bool {
        matches!(self, Self::RunStarted { .. } | Self::RunCompleted { .. })
    }
}

/// Thread-safe, append-only event log
#[derive(Clone)]
pub struct EventLog {
    events: Arc<RwLock<Vec<Event>>>,
    start_time: Instant,
    next_id: Arc<AtomicU64>,
}

impl EventLog {
    pub fn new() -> Self {
        Self {
            events: Arc::new(RwLock::new(Vec::new())),
            start_time: Instant::now(),
            next_id: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Emit an event (thread-safe, returns event ID)
    pub fn emit(&self, kind: EventKind) -> u64 {
        let mut events = self.events.write();
        // id assigned under the lock so ids follow log order
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        events.push(Event {
            id,
            timestamp_ms: self.start_time.elapsed().as_millis() as u64,
            kind,
        });
        id
    }

    /// Get all events (cloned)
    pub fn events(&self) -> Vec<Event> {
        self.events.read().clone()
    }

    /// Borrow events without cloning
    pub fn with_events<T>(&self, f: impl FnOnce(&[Event]) -> T) -> T {
        f(&self.events.read())
    }

    /// Filter events by resource name
    pub fn filter_resource(&self, resource: &str) -> Vec<Event> {
        self.with_events(|events| {
            events
                .iter()
                .filter(|e| e.kind.resource() == Some(resource))
                .cloned()
                .collect()
        })
    }

    /// Run-level events only
    pub fn run_events(&self) -> Vec<Event> {
        self.with_events(|events| {
            events
                .iter()
                .filter(|e| e.kind.is_run_event())
                .cloned()
                .collect()
        })
    }

    /// Serialize to JSON for persistence/debugging
    pub fn to_json(&self) -> Value {
        serde_json::to_value(self.events()).unwrap_or(Value::Null)
    }

    pub fn len(&self) -> usize {
        self.events.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for EventLog {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EventLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventLog").field("len", &self.len()).finish()
    }
}
