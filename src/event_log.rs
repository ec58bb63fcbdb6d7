//! Page event log
//!
//! Append-only audit trail of what a page did: gateway traffic, bind passes,
//! dispatched actions, and feedback shown to the visitor.
//! - Event: envelope with id + timestamp + kind
//! - EventKind: gateway / binding / action / feedback levels
//! - EventLog: cloneable handle over a shared log

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Single event in the page log
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// Monotonic sequence ID (for ordering)
    pub id: u64,
    /// Time since page construction (ms)
    pub timestamp_ms: u64,
    pub kind: EventKind,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventKind {
    // ═══════════════════════════════════════════
    // PAGE
    // ═══════════════════════════════════════════
    PageLoaded {
        page: String,
        has_fallback: bool,
    },

    // ═══════════════════════════════════════════
    // GATEWAY
    // ═══════════════════════════════════════════
    RequestSent {
        endpoint: String,
        method: String,
        url: String,
    },
    RequestSucceeded {
        endpoint: String,
        status: u16,
    },
    RequestFailed {
        endpoint: String,
        reason: String,
    },
    FallbackServed {
        endpoint: String,
    },

    // ═══════════════════════════════════════════
    // BINDING
    // ═══════════════════════════════════════════
    Bound {
        written: usize,
        gaps: usize,
        rows: usize,
    },
    /// A newer request for the same scope was issued; this result is dropped
    BindDiscarded {
        ticket: u64,
    },

    // ═══════════════════════════════════════════
    // ACTIONS
    // ═══════════════════════════════════════════
    ActionStarted {
        action: String,
    },
    ActionSucceeded {
        action: String,
        duration_ms: u64,
    },
    ActionFailed {
        action: String,
        error: String,
    },
    ActionSuppressed {
        action: String,
    },
    ActionIgnored {
        name: String,
    },

    // ═══════════════════════════════════════════
    // FEEDBACK
    // ═══════════════════════════════════════════
    Notified {
        severity: String,
        message: String,
    },
    LoginPrompted,
}

impl EventKind {
    /// Action name if the event is action-related
    pub fn action(&self) -> Option<&str> {
        match self {
            Self::ActionStarted { action }
            | Self::ActionSucceeded { action, .. }
            | Self::ActionFailed { action, .. }
            | Self::ActionSuppressed { action } => Some(action),
            Self::ActionIgnored { name } => Some(name),
            _ => None,
        }
    }

    pub fn is_gateway_event(&self) -> bool {
        matches!(
            self,
            Self::RequestSent { .. }
                | Self::RequestSucceeded { .. }
                | Self::RequestFailed { .. }
                | Self::FallbackServed { .. }
        )
    }
}

/// Shared, append-only event log
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

    /// Emit an event (returns event ID)
    pub fn emit(&self, kind: EventKind) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let event = Event {
            id,
            timestamp_ms: self.start_time.elapsed().as_millis() as u64,
            kind,
        };
        self.events.write().push(event);
        id
    }

    /// Get all events (cloned)
    pub fn events(&self) -> Vec<Event> {
        self.events.read().clone()
    }

    /// Events belonging to one action name
    pub fn filter_action(&self, action: &str) -> Vec<Event> {
        self.events()
            .into_iter()
            .filter(|e| e.kind.action() == Some(action))
            .collect()
    }

    pub fn gateway_events(&self) -> Vec<Event> {
        self.events()
            .into_iter()
            .filter(|e| e.kind.is_gateway_event())
            .collect()
    }

    /// Serialize to JSON for debugging
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn eventkind_action_extraction() {
        let started = EventKind::ActionStarted {
            action: "bookmark".into(),
        };
        assert_eq!(started.action(), Some("bookmark"));
        assert_eq!(EventKind::LoginPrompted.action(), None);
    }

    #[test]
    fn eventkind_serializes_with_type_tag() {
        let kind = EventKind::RequestFailed {
            endpoint: "search".into(),
            reason: "HTTP 500".into(),
        };
        let json = serde_json::to_value(&kind).unwrap();
        assert_eq!(json["type"], "request_failed");
        assert_eq!(json["endpoint"], "search");
    }

    #[test]
    fn eventlog_emit_returns_monotonic_ids() {
        let log = EventLog::new();
        let a = log.emit(EventKind::LoginPrompted);
        let b = log.emit(EventKind::LoginPrompted);
        assert_eq!((a, b), (0, 1));
        assert_eq!(log.len(), 2);
    }

    #[test]
    fn eventlog_filters() {
        let log = EventLog::new();
        log.emit(EventKind::ActionStarted {
            action: "track".into(),
        });
        log.emit(EventKind::RequestSent {
            endpoint: "track".into(),
            method: "POST".into(),
            url: "http://localhost/api/tracking".into(),
        });
        log.emit(EventKind::ActionStarted {
            action: "export".into(),
        });

        assert_eq!(log.filter_action("track").len(), 1);
        assert_eq!(log.gateway_events().len(), 1);
    }

    #[test]
    fn eventlog_is_shared_between_clones() {
        let log = EventLog::new();
        let clone = log.clone();
        clone.emit(EventKind::LoginPrompted);
        assert_eq!(log.len(), 1);
        assert!(log.to_json().is_array());
    }
}
