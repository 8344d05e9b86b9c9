//! Domain Events
//!
//! Events emitted on every committed mutation of the node store or structure
//! index. They follow the observer pattern: components publish through the
//! [`crate::store::SubscriptionHub`] and consumers (UI layer, sync adapters)
//! subscribe without coupling to the store implementation.
//!
//! # Wire shape
//!
//! Envelopes serialize flat, with the event discriminator merged into the
//! envelope map:
//!
//! ```json
//! { "type": "node:created", "namespace": "lifecycle", "source": "user-edit",
//!   "timestamp": "...", "nodeId": "...", "node": { ... } }
//! ```
//!
//! Frontend event types must match this format; the contract tests below
//! enforce it.

use crate::models::Node;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Event namespace: lifecycle mutations vs. error reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventNamespace {
    Lifecycle,
    Error,
}

/// Origin of a mutation, carried on every envelope
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum UpdateSource {
    /// Local UI edit (the common case)
    UserEdit,
    /// Replay of backend state into the local store
    PersistenceReplay,
    /// Internal bookkeeping (rollback, migrations)
    System,
}

/// Classified persistence failure reason (string match on the backend error)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailureReason {
    Timeout,
    ForeignKeyConstraint,
    DatabaseLocked,
    Unknown,
}

impl FailureReason {
    /// Classify a raw backend error message.
    ///
    /// Case-insensitive substring match, first match wins: "timeout",
    /// "foreign key", "locked", otherwise unknown.
    pub fn classify(message: &str) -> Self {
        let lowered = message.to_lowercase();
        if lowered.contains("timeout") {
            Self::Timeout
        } else if lowered.contains("foreign key") {
            Self::ForeignKeyConstraint
        } else if lowered.contains("locked") {
            Self::DatabaseLocked
        } else {
            Self::Unknown
        }
    }

    /// Whether a retry of the same operation can reasonably succeed.
    /// Constraint violations and unknown errors are not retryable.
    pub fn can_retry(&self) -> bool {
        matches!(self, Self::Timeout | Self::DatabaseLocked)
    }
}

/// Per-operation breakdown inside a persistence failure report
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AffectedOperation {
    /// Human-readable operation description (from `OperationOptions`)
    pub operation: String,
    /// Node ids the operation touched
    pub node_ids: Vec<String>,
    /// Raw error text from the backend (or rollback note for batch peers)
    pub error: String,
}

/// Payload of `error:persistence-failed`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistenceFailureEvent {
    /// Aggregated human-readable message (operation descriptions joined with ", ")
    pub message: String,
    /// All node ids rolled back, in call order
    pub failed_node_ids: Vec<String>,
    /// Classified reason from the first failing backend call
    pub failure_reason: FailureReason,
    /// Whether retrying the operation(s) can succeed
    pub can_retry: bool,
    /// Per-operation breakdown
    pub affected_operations: Vec<AffectedOperation>,
}

/// Domain events published on committed mutations
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum DomainEvent {
    /// A new node was created
    #[serde(rename = "node:created", rename_all = "camelCase")]
    NodeCreated { node_id: String, node: Node },

    /// An existing node was updated
    #[serde(rename = "node:updated", rename_all = "camelCase")]
    NodeUpdated { node_id: String, node: Node },

    /// A node was deleted
    #[serde(rename = "node:deleted", rename_all = "camelCase")]
    NodeDeleted { node_id: String },

    /// Parent/child structure changed (create, combine, indent, outdent, move)
    #[serde(rename = "hierarchy:changed", rename_all = "camelCase")]
    HierarchyChanged { affected_nodes: Vec<String> },

    /// A detached persistence call failed and local state was rolled back
    #[serde(rename = "error:persistence-failed")]
    PersistenceFailed(PersistenceFailureEvent),
}

impl DomainEvent {
    /// String representation of the event type, matching the serialized tag
    pub fn event_type(&self) -> &'static str {
        match self {
            DomainEvent::NodeCreated { .. } => "node:created",
            DomainEvent::NodeUpdated { .. } => "node:updated",
            DomainEvent::NodeDeleted { .. } => "node:deleted",
            DomainEvent::HierarchyChanged { .. } => "hierarchy:changed",
            DomainEvent::PersistenceFailed(_) => "error:persistence-failed",
        }
    }
}

/// Envelope carrying namespace, source, and timestamp alongside the event
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventEnvelope {
    pub namespace: EventNamespace,
    pub source: UpdateSource,
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub event: DomainEvent,
}

impl EventEnvelope {
    /// Lifecycle envelope for a committed mutation
    pub fn lifecycle(source: UpdateSource, event: DomainEvent) -> Self {
        Self {
            namespace: EventNamespace::Lifecycle,
            source,
            timestamp: Utc::now(),
            event,
        }
    }

    /// Error envelope (persistence failures)
    pub fn error(event: DomainEvent) -> Self {
        Self {
            namespace: EventNamespace::Error,
            source: UpdateSource::System,
            timestamp: Utc::now(),
            event,
        }
    }

    /// Node ids this envelope concerns, used for per-node subscription routing
    pub fn node_ids(&self) -> Vec<&str> {
        match &self.event {
            DomainEvent::NodeCreated { node_id, .. }
            | DomainEvent::NodeUpdated { node_id, .. }
            | DomainEvent::NodeDeleted { node_id } => vec![node_id.as_str()],
            DomainEvent::HierarchyChanged { affected_nodes } => {
                affected_nodes.iter().map(String::as_str).collect()
            }
            DomainEvent::PersistenceFailed(failure) => {
                failure.failed_node_ids.iter().map(String::as_str).collect()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    /// Contract test: documents and enforces the exact JSON format consumers
    /// depend on. The discriminator merges flat into the envelope map.
    #[test]
    fn test_envelope_serialization_contract() {
        let envelope = EventEnvelope::lifecycle(
            UpdateSource::UserEdit,
            DomainEvent::NodeDeleted {
                node_id: "node-123".to_string(),
            },
        );
        let parsed: serde_json::Value = serde_json::to_value(&envelope).unwrap();

        assert_eq!(parsed.get("type").unwrap(), "node:deleted");
        assert_eq!(parsed.get("namespace").unwrap(), "lifecycle");
        assert_eq!(parsed.get("source").unwrap(), "user-edit");
        assert_eq!(parsed.get("nodeId").unwrap(), "node-123");
        assert!(parsed.get("timestamp").is_some());
        // Flat, never nested under an "event" key
        assert!(parsed.get("event").is_none());
    }

    #[test]
    fn test_persistence_failed_serialization() {
        let envelope = EventEnvelope::error(DomainEvent::PersistenceFailed(
            PersistenceFailureEvent {
                message: "delete node: database is locked".to_string(),
                failed_node_ids: vec!["n-1".to_string()],
                failure_reason: FailureReason::DatabaseLocked,
                can_retry: true,
                affected_operations: vec![AffectedOperation {
                    operation: "delete node".to_string(),
                    node_ids: vec!["n-1".to_string()],
                    error: "database is locked".to_string(),
                }],
            },
        ));
        let parsed: serde_json::Value = serde_json::to_value(&envelope).unwrap();

        assert_eq!(parsed.get("type").unwrap(), "error:persistence-failed");
        assert_eq!(parsed.get("namespace").unwrap(), "error");
        assert_eq!(parsed.get("failureReason").unwrap(), "database-locked");
        assert_eq!(parsed.get("canRetry").unwrap(), true);
        assert_eq!(
            parsed.get("failedNodeIds").unwrap(),
            &json!(["n-1"])
        );
    }

    #[test]
    fn test_failure_classification() {
        assert_eq!(
            FailureReason::classify("Request Timeout after 30s"),
            FailureReason::Timeout
        );
        assert_eq!(
            FailureReason::classify("FOREIGN KEY constraint failed"),
            FailureReason::ForeignKeyConstraint
        );
        assert_eq!(
            FailureReason::classify("database is locked"),
            FailureReason::DatabaseLocked
        );
        assert_eq!(
            FailureReason::classify("something else entirely"),
            FailureReason::Unknown
        );
        // First match wins: "timeout" beats "locked"
        assert_eq!(
            FailureReason::classify("timeout while table locked"),
            FailureReason::Timeout
        );
    }

    #[test]
    fn test_retryability() {
        assert!(FailureReason::Timeout.can_retry());
        assert!(FailureReason::DatabaseLocked.can_retry());
        assert!(!FailureReason::ForeignKeyConstraint.can_retry());
        assert!(!FailureReason::Unknown.can_retry());
    }

    #[test]
    fn test_event_type_strings() {
        let event = DomainEvent::HierarchyChanged {
            affected_nodes: vec!["a".to_string(), "b".to_string()],
        };
        assert_eq!(event.event_type(), "hierarchy:changed");

        let envelope = EventEnvelope::lifecycle(UpdateSource::System, event);
        assert_eq!(envelope.node_ids(), vec!["a", "b"]);
    }
}
