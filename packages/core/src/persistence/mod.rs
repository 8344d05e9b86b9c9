//! Persistence Boundary
//!
//! The local store never talks to a database directly; it goes through the
//! [`PersistenceBackend`] trait so the synchronization core stays storage
//! agnostic. [`PlaceholderGate`] sits in front of the backend and keeps
//! placeholder nodes (empty or prefix-only content) out of it entirely:
//! a placeholder exists only in local memory until real content appears.

use crate::models::{is_placeholder, Node, NodeFilter, NodeUpdate};
use crate::store::{DocumentContext, ParentKey, UpdateSource};
use anyhow::Context;
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tracing::{debug, info};

/// Errors surfaced by a persistence backend
#[derive(Error, Debug)]
pub enum PersistenceError {
    /// Storage-layer failure, message preserved verbatim for classification
    #[error("Backend error: {message}")]
    Backend { message: String },

    /// The backend has no record for the requested id
    #[error("Node '{id}' not found in backend")]
    NotFound { id: String },

    /// The caller's expected version no longer matches the stored row
    #[error("Version conflict on node '{node_id}': expected {expected_version}, found {actual_version}")]
    VersionConflict {
        node_id: String,
        expected_version: i64,
        actual_version: i64,
    },
}

impl PersistenceError {
    /// Create a Backend error
    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend {
            message: message.into(),
        }
    }
}

/// Storage abstraction the synchronization core writes through.
///
/// `update_node` and `delete_node` take the version the caller last observed;
/// backends enforce it with a compare-and-set and reject stale writers with
/// [`PersistenceError::VersionConflict`]. Deletion is not idempotent: deleting
/// an id the backend does not hold is a [`PersistenceError::NotFound`].
#[async_trait]
pub trait PersistenceBackend: Send + Sync {
    async fn create_node(&self, node: Node) -> Result<(), PersistenceError>;

    async fn update_node(
        &self,
        id: &str,
        expected_version: i64,
        update: NodeUpdate,
    ) -> Result<(), PersistenceError>;

    async fn delete_node(&self, id: &str, expected_version: i64) -> Result<(), PersistenceError>;

    async fn get_node(&self, id: &str) -> Result<Option<Node>, PersistenceError>;

    async fn query_nodes(&self, filter: NodeFilter) -> Result<Vec<Node>, PersistenceError>;
}

/// What the gate decided to do with a write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersistAction {
    /// Placeholder never persisted: the backend is not contacted
    Skip,
    /// First real content on a never-persisted node: backend create
    Create,
    /// Node already known to the backend: backend update
    Update,
}

/// Tracks which node ids the backend already holds, so placeholder writes
/// can be skipped and the first real write becomes a create.
///
/// A node that was persisted once stays on the update path even if its
/// content is later emptied back to placeholder shape; emptying is a real
/// edit the backend must see.
pub struct PlaceholderGate {
    persisted: Mutex<HashSet<String>>,
}

impl PlaceholderGate {
    pub fn new() -> Self {
        Self {
            persisted: Mutex::new(HashSet::new()),
        }
    }

    /// Decide the backend action for a node in its current shape
    pub fn action_for(&self, node: &Node) -> PersistAction {
        let persisted = self.persisted.lock().unwrap();
        if persisted.contains(&node.id) {
            PersistAction::Update
        } else if is_placeholder(node) {
            PersistAction::Skip
        } else {
            PersistAction::Create
        }
    }

    /// Record that the backend accepted a create for this id
    pub fn mark_persisted(&self, id: &str) {
        self.persisted.lock().unwrap().insert(id.to_string());
    }

    /// Record that the backend deleted this id
    pub fn mark_removed(&self, id: &str) {
        self.persisted.lock().unwrap().remove(id);
    }

    pub fn is_persisted(&self, id: &str) -> bool {
        self.persisted.lock().unwrap().contains(id)
    }
}

impl Default for PlaceholderGate {
    fn default() -> Self {
        Self::new()
    }
}

/// Backend writer that routes every write through the placeholder gate
pub struct BackendWriter {
    backend: Arc<dyn PersistenceBackend>,
    gate: Arc<PlaceholderGate>,
}

impl BackendWriter {
    pub fn new(backend: Arc<dyn PersistenceBackend>, gate: Arc<PlaceholderGate>) -> Self {
        Self { backend, gate }
    }

    pub fn gate(&self) -> &PlaceholderGate {
        &self.gate
    }

    /// Write the node's current state through the gate. Placeholders are
    /// skipped, first real content becomes a create, everything after that
    /// an update carrying the previous version for compare-and-set.
    pub async fn upsert(&self, node: &Node) -> Result<PersistAction, PersistenceError> {
        let action = self.gate.action_for(node);
        match action {
            PersistAction::Skip => {
                debug!(node_id = %node.id, "placeholder write skipped");
            }
            PersistAction::Create => {
                self.backend.create_node(node.clone()).await?;
                self.gate.mark_persisted(&node.id);
            }
            PersistAction::Update => {
                let update = NodeUpdate {
                    node_type: Some(node.node_type.clone()),
                    content: Some(node.content.clone()),
                    parent_id: Some(node.parent_id.clone()),
                    properties: Some(node.properties.clone()),
                    mentions: Some(node.mentions.clone()),
                    expected_version: None,
                    modified_at: Some(node.modified_at),
                };
                self.backend
                    .update_node(&node.id, node.version - 1, update)
                    .await?;
            }
        }
        Ok(action)
    }

    /// Delete the node from the backend if it was ever persisted. Removing a
    /// placeholder is a pure local operation and never reaches the backend.
    pub async fn remove(&self, id: &str, version: i64) -> Result<bool, PersistenceError> {
        if !self.gate.is_persisted(id) {
            debug!(node_id = %id, "placeholder removal skipped");
            return Ok(false);
        }
        self.backend.delete_node(id, version).await?;
        self.gate.mark_removed(id);
        Ok(true)
    }
}

/// Replay the backend's state into a local document context.
///
/// Runs at document open: every stored node lands in the node table and the
/// structure index, tagged `persistence-replay` so subscribers can tell
/// hydration apart from user edits, and the gate learns which ids the
/// backend already holds. Orphaned nodes (parent id the backend no longer
/// has) are attached at the root rather than dropped.
///
/// Returns the number of nodes loaded.
pub async fn replay_into(
    context: &DocumentContext,
    backend: &dyn PersistenceBackend,
    gate: &PlaceholderGate,
) -> anyhow::Result<usize> {
    let nodes = backend
        .query_nodes(NodeFilter::default())
        .await
        .context("querying backend for document hydration")?;

    let known: HashSet<String> = nodes.iter().map(|node| node.id.clone()).collect();
    let loaded = nodes.len();
    for node in nodes {
        let parent = match node.parent_id.as_deref() {
            Some(parent_id) if known.contains(parent_id) => {
                ParentKey::Node(parent_id.to_string())
            }
            Some(parent_id) => {
                debug!(node_id = %node.id, missing_parent = %parent_id, "orphan attached at root");
                ParentKey::Root
            }
            None => ParentKey::Root,
        };
        gate.mark_persisted(&node.id);
        context.structure.append_child(parent, &node.id);
        context.nodes.set(node, UpdateSource::PersistenceReplay);
    }

    info!(loaded, "document hydrated from backend");
    Ok(loaded)
}
