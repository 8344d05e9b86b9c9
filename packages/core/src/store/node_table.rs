//! Node Table
//!
//! Canonical map of node-id -> node record with per-node monotonic version
//! counters. Every committed write notifies the
//! [`crate::store::SubscriptionHub`] synchronously, in the same call, before
//! returning - observers always see a consistent post-write state.
//!
//! Conflict detection: `update` compares the caller-asserted
//! `expected_version` against the stored version; a mismatch is routed
//! through the configured [`ConflictResolver`] and surfaced as a non-fatal
//! resolution in the returned outcome, never as an error.

use crate::models::{Node, NodeUpdate};
use crate::store::conflict::{ConflictResolution, ConflictResolver, LastWriteWins};
use crate::store::events::{DomainEvent, EventEnvelope, UpdateSource};
use crate::store::subscription_hub::SubscriptionHub;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use thiserror::Error;
use tracing::{debug, warn};

/// Errors raised by the node table
#[derive(Error, Debug)]
pub enum StoreError {
    /// Operation referenced an id absent from the table. A missing id
    /// reaching the mutation layer is a local invariant violation; the
    /// table never silently fabricates a node.
    #[error("Node not found: {id}")]
    NodeNotFound { id: String },
}

impl StoreError {
    pub fn node_not_found(id: impl Into<String>) -> Self {
        Self::NodeNotFound { id: id.into() }
    }
}

/// Result of a committed (or conflict-resolved) update
#[derive(Debug, Clone)]
pub struct UpdateOutcome {
    /// Post-operation state of the node (the stored state when the incoming
    /// write was discarded)
    pub node: Node,
    /// Present when conflict detection fired; reports how it was resolved
    pub conflict: Option<ConflictResolution>,
}

/// Canonical versioned node store
pub struct NodeTable {
    records: RwLock<HashMap<String, Node>>,
    resolver: Box<dyn ConflictResolver>,
    hub: Arc<SubscriptionHub>,
}

impl NodeTable {
    /// Create a table wired to the given hub, with last-write-wins
    /// conflict resolution
    pub fn new(hub: Arc<SubscriptionHub>) -> Self {
        Self::with_resolver(hub, Box::new(LastWriteWins))
    }

    /// Create a table with a custom conflict resolution policy
    pub fn with_resolver(hub: Arc<SubscriptionHub>, resolver: Box<dyn ConflictResolver>) -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
            resolver,
            hub,
        }
    }

    /// Fetch a node by id
    pub fn get(&self, id: &str) -> Option<Node> {
        self.records.read().unwrap().get(id).cloned()
    }

    /// Current version of a node, if present
    pub fn get_version(&self, id: &str) -> Option<i64> {
        self.records.read().unwrap().get(id).map(|n| n.version)
    }

    /// Whether the table holds the given id
    pub fn contains(&self, id: &str) -> bool {
        self.records.read().unwrap().contains_key(id)
    }

    /// Number of stored nodes
    pub fn len(&self) -> usize {
        self.records.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().unwrap().is_empty()
    }

    /// Insert or fully replace a node. Replacement bumps the stored version
    /// so committed writes always strictly increase it.
    pub fn set(&self, mut node: Node, source: UpdateSource) {
        let (event, node_for_event) = {
            let mut records = self.records.write().unwrap();
            if let Some(existing) = records.get(&node.id) {
                node.version = existing.version + 1;
                let stored = node.clone();
                records.insert(node.id.clone(), node);
                (
                    DomainEvent::NodeUpdated {
                        node_id: stored.id.clone(),
                        node: stored.clone(),
                    },
                    stored,
                )
            } else {
                let stored = node.clone();
                records.insert(node.id.clone(), node);
                (
                    DomainEvent::NodeCreated {
                        node_id: stored.id.clone(),
                        node: stored.clone(),
                    },
                    stored,
                )
            }
        };
        debug!(node_id = %node_for_event.id, version = node_for_event.version, "node set");
        self.hub.publish(&EventEnvelope::lifecycle(source, event));
    }

    /// Apply a partial update.
    ///
    /// With conflict detection enabled (the default), a stale
    /// `expected_version` routes through the resolver: `AcceptIncoming`
    /// applies the write anyway, `KeepCurrent` discards it and returns the
    /// stored state. Either way the outcome reports the resolution.
    pub fn update(
        &self,
        id: &str,
        changes: NodeUpdate,
        source: UpdateSource,
        skip_conflict_detection: bool,
    ) -> Result<UpdateOutcome, StoreError> {
        let (outcome, event) = {
            let mut records = self.records.write().unwrap();
            let current = records
                .get_mut(id)
                .ok_or_else(|| StoreError::node_not_found(id))?;

            let mut conflict = None;
            if !skip_conflict_detection {
                if let Some(expected) = changes.expected_version {
                    if expected != current.version {
                        let resolution = self.resolver.resolve(current, &changes);
                        warn!(
                            node_id = %id,
                            expected_version = expected,
                            actual_version = current.version,
                            ?resolution,
                            "version conflict"
                        );
                        if resolution == ConflictResolution::KeepCurrent {
                            return Ok(UpdateOutcome {
                                node: current.clone(),
                                conflict: Some(resolution),
                            });
                        }
                        conflict = Some(resolution);
                    }
                }
            }

            apply_changes(current, &changes);
            current.version += 1;
            let stored = current.clone();
            (
                UpdateOutcome {
                    node: stored.clone(),
                    conflict,
                },
                DomainEvent::NodeUpdated {
                    node_id: stored.id.clone(),
                    node: stored,
                },
            )
        };
        self.hub.publish(&EventEnvelope::lifecycle(source, event));
        Ok(outcome)
    }

    /// Apply a list of partial updates in call order
    pub fn batch_update(
        &self,
        entries: Vec<(String, NodeUpdate)>,
        source: UpdateSource,
    ) -> Result<Vec<UpdateOutcome>, StoreError> {
        let mut outcomes = Vec::with_capacity(entries.len());
        for (id, changes) in entries {
            outcomes.push(self.update(&id, changes, source, false)?);
        }
        Ok(outcomes)
    }

    /// Remove a node, returning its final state
    pub fn delete(&self, id: &str, source: UpdateSource) -> Result<Node, StoreError> {
        let removed = {
            let mut records = self.records.write().unwrap();
            records
                .remove(id)
                .ok_or_else(|| StoreError::node_not_found(id))?
        };
        debug!(node_id = %id, "node deleted");
        self.hub.publish(&EventEnvelope::lifecycle(
            source,
            DomainEvent::NodeDeleted {
                node_id: id.to_string(),
            },
        ));
        Ok(removed)
    }

    /// Put a record back verbatim during rollback: no version bump, no
    /// fan-out. The single persistence-failed event is the only signal a
    /// rolled-back operation emits.
    pub(crate) fn restore_record(&self, node: Node) {
        self.records.write().unwrap().insert(node.id.clone(), node);
    }

    /// Remove a record during rollback without fan-out
    pub(crate) fn remove_record(&self, id: &str) {
        self.records.write().unwrap().remove(id);
    }
}

/// Apply the provided fields of a partial update onto a node
fn apply_changes(node: &mut Node, changes: &NodeUpdate) {
    if let Some(node_type) = &changes.node_type {
        node.node_type = node_type.clone();
    }
    if let Some(content) = &changes.content {
        node.content = content.clone();
    }
    if let Some(parent_id) = &changes.parent_id {
        node.parent_id = parent_id.clone();
    }
    if let Some(properties) = &changes.properties {
        node.properties = properties.clone();
    }
    if let Some(mentions) = &changes.mentions {
        node.mentions = mentions.clone();
    }
    node.modified_at = changes.modified_at.unwrap_or_else(Utc::now);
}
