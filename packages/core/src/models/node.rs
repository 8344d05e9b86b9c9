//! Node Data Structures
//!
//! This module defines the core `Node` struct shared by every component of the
//! synchronization layer.
//!
//! # Architecture
//!
//! - **Universal Node**: a single struct represents all content types
//! - **Open properties**: entity-specific data lives in the `properties` field
//! - **Flat storage**: parent/child relationships are plain id references; the
//!   ordered adjacency lives in [`crate::store::StructureIndex`], never in
//!   object pointers, so re-parenting is a key rewrite with no aliasing risk
//!
//! # Examples
//!
//! ```rust
//! use outline_core::models::Node;
//! use serde_json::json;
//!
//! // Create a text node at the document root
//! let text_node = Node::new(
//!     "text".to_string(),
//!     "My first note".to_string(),
//!     None,
//!     json!({}),
//! );
//!
//! // Create a task node with properties
//! let task_node = Node::new(
//!     "task".to_string(),
//!     "Ship the release".to_string(),
//!     Some(text_node.id.clone()),
//!     json!({ "status": "todo", "priority": "high" }),
//! );
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

/// Default version value for serde deserialization (version 1)
fn default_version() -> i64 {
    1
}

fn deserialize_optional_field<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    // Accept either T or Option<T> from JSON
    // Missing field is handled by #[serde(default)] on the struct field
    Ok(Some(Option::<T>::deserialize(deserializer)?))
}

/// Universal node structure for all content types in an outline document.
///
/// # Fields
///
/// - `id`: opaque unique identifier (UUID v4 unless supplied by the caller)
/// - `node_type`: type identifier (e.g. "text", "header", "task",
///   "quote-block", "code-block", "ordered-list"); the set is open
/// - `content`: primary text; its semantics depend on `node_type`
/// - `parent_id`: parent reference (not ownership; mirrors the structure index)
/// - `version`: optimistic concurrency counter, bumped on every committed write
/// - `created_at` / `modified_at`: timestamps
/// - `properties`: open JSON object for entity-specific fields
///   (`"collapsed": true` marks a collapsed outline item)
/// - `mentions`: ids of nodes referenced from this node's content
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    /// Unique identifier (UUID unless a deterministic id is supplied)
    pub id: String,

    /// Node type (e.g. "text", "header", "task", "quote-block")
    pub node_type: String,

    /// Primary content/text of the node
    pub content: String,

    /// Parent node ID (hierarchy reference, kept in sync with the structure index)
    pub parent_id: Option<String>,

    /// Optimistic concurrency control version (incremented on each committed write)
    #[serde(default = "default_version")]
    pub version: i64,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Last modification timestamp
    pub modified_at: DateTime<Utc>,

    /// All entity-specific fields (open JSON object)
    pub properties: serde_json::Value,

    /// Outgoing mentions - IDs of nodes that THIS node references
    #[serde(default)]
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub mentions: Vec<String>,
}

impl Node {
    /// Create a new Node with an auto-generated UUID
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use outline_core::models::Node;
    /// # use serde_json::json;
    /// let root = Node::new("text".to_string(), "Hello".to_string(), None, json!({}));
    /// assert_eq!(root.version, 1);
    /// ```
    pub fn new(
        node_type: String,
        content: String,
        parent_id: Option<String>,
        properties: serde_json::Value,
    ) -> Self {
        Self::new_with_id(
            Uuid::new_v4().to_string(),
            node_type,
            content,
            parent_id,
            properties,
        )
    }

    /// Create a new Node with a caller-provided id
    ///
    /// The UI pre-generates UUIDs for optimistic updates so that local state
    /// and the persistence backend agree on ids from the first write.
    pub fn new_with_id(
        id: String,
        node_type: String,
        content: String,
        parent_id: Option<String>,
        properties: serde_json::Value,
    ) -> Self {
        let now = Utc::now();
        Self {
            id,
            node_type,
            content,
            parent_id,
            version: 1,
            created_at: now,
            modified_at: now,
            properties,
            mentions: Vec::new(),
        }
    }

    /// Whether this outline item is collapsed in the UI.
    ///
    /// Collapsed nodes keep their children on structural splits; expanded
    /// nodes hand them over (see `TreeMutator::create_node`).
    pub fn is_collapsed(&self) -> bool {
        self.properties
            .get("collapsed")
            .and_then(|v| v.as_bool())
            .unwrap_or(false)
    }
}

/// Partial node update for PATCH-style operations
///
/// All fields are optional; only provided fields are applied. `parent_id`
/// uses the double-Option pattern:
///
/// - `None`: don't change parent_id
/// - `Some(None)`: clear parent_id (node becomes root-level)
/// - `Some(Some(id))`: set parent_id to the given id
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeUpdate {
    /// Update node type
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node_type: Option<String>,

    /// Update primary content
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,

    /// Update parent reference (double-Option, see struct docs)
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "deserialize_optional_field"
    )]
    pub parent_id: Option<Option<String>>,

    /// Replace the properties object
    #[serde(skip_serializing_if = "Option::is_none")]
    pub properties: Option<serde_json::Value>,

    /// Replace the mention list
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mentions: Option<Vec<String>>,

    /// Version the caller last observed; a mismatch against the stored
    /// version triggers conflict resolution (unless detection is skipped)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected_version: Option<i64>,

    /// Timestamp of the incoming write, used by last-write-wins resolution.
    /// Defaults to the commit time when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub modified_at: Option<DateTime<Utc>>,
}

impl NodeUpdate {
    /// Update that replaces the content only
    pub fn content(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            ..Self::default()
        }
    }

    /// Update that rewrites the parent reference only
    pub fn parent(parent_id: Option<String>) -> Self {
        Self {
            parent_id: Some(parent_id),
            ..Self::default()
        }
    }

    /// Attach the caller's last-observed version for conflict detection
    pub fn with_expected_version(mut self, version: i64) -> Self {
        self.expected_version = Some(version);
        self
    }

    /// Attach the incoming write's timestamp (last-write-wins input)
    pub fn with_modified_at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.modified_at = Some(timestamp);
        self
    }
}

/// Query filter for the persistence backend's `query_nodes`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeFilter {
    /// Filter by node type
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node_type: Option<String>,

    /// Filter by parent ID
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,

    /// Filter by specific IDs
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ids: Option<Vec<String>>,

    /// Filter by content search (substring match)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_contains: Option<String>,
}
