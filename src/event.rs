//! Push event context.
//!
//! An [`Event`] is the immutable record of one triggering occurrence (a code
//! push). It carries the coordinates trigger predicates evaluate against and
//! the context goal actions receive. Once constructed it is never mutated;
//! the engine shares it between activations behind an `Arc`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use uuid::Uuid;

/// One triggering occurrence, typically a code push.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Event {
    /// Unique id assigned on construction.
    pub id: Uuid,
    /// Repository identifier (e.g. "org/service").
    pub repository: String,
    /// Branch the push landed on.
    pub branch: String,
    /// Commit sha of the push head.
    pub commit: String,
    /// Arbitrary metadata attached by the ingesting integration
    /// (detected build tool, changed paths, author, ...).
    #[serde(default)]
    pub metadata: HashMap<String, Value>,
    /// When the event was received.
    pub received_at: DateTime<Utc>,
}

impl Event {
    /// Create a push event for the given coordinates.
    pub fn push(repository: &str, branch: &str, commit: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            repository: repository.to_string(),
            branch: branch.to_string(),
            commit: commit.to_string(),
            metadata: HashMap::new(),
            received_at: Utc::now(),
        }
    }

    /// Attach a metadata entry. Consumes and returns self for chaining
    /// during event construction; events are immutable once handed to the
    /// engine.
    pub fn with_metadata(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }

    /// Look up a metadata entry.
    pub fn metadata(&self, key: &str) -> Option<&Value> {
        self.metadata.get(key)
    }

    /// True if the metadata entry exists and is boolean `true`.
    ///
    /// Ingesting integrations record detections ("is_maven",
    /// "has_dockerfile") as boolean flags; predicates test them with this.
    pub fn metadata_flag(&self, key: &str) -> bool {
        matches!(self.metadata.get(key), Some(Value::Bool(true)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_event_assigns_unique_ids() {
        let a = Event::push("org/app", "main", "abc123");
        let b = Event::push("org/app", "main", "abc123");
        assert_ne!(a.id, b.id);
        assert_eq!(a.repository, "org/app");
        assert_eq!(a.branch, "main");
        assert_eq!(a.commit, "abc123");
    }

    #[test]
    fn metadata_flag_requires_boolean_true() {
        let event = Event::push("org/app", "main", "abc123")
            .with_metadata("is_maven", true)
            .with_metadata("has_dockerfile", false)
            .with_metadata("builder", "maven");

        assert!(event.metadata_flag("is_maven"));
        assert!(!event.metadata_flag("has_dockerfile"));
        assert!(!event.metadata_flag("builder"));
        assert!(!event.metadata_flag("missing"));
    }

    #[test]
    fn event_round_trips_through_json() {
        let event = Event::push("org/app", "main", "abc123").with_metadata("is_maven", true);
        let json = serde_json::to_string(&event).unwrap();
        let back: Event = serde_json::from_str(&json).unwrap();
        assert_eq!(event, back);
    }
}
