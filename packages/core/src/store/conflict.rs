//! Conflict Resolution
//!
//! Invoked by [`crate::store::NodeTable::update`] when an incoming write's
//! `expected_version` does not match the stored version (a stale write from
//! a lagging persistence echo or a racing client).
//!
//! This is deliberately not a CRDT merge: the version counter is a purely
//! local sequence, sufficient for single-writer-with-async-persistence
//! semantics. The default policy is last-write-wins by timestamp.

use crate::models::{Node, NodeUpdate};
use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Outcome of resolving a stale write
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConflictResolution {
    /// Apply the incoming write over the stored state
    AcceptIncoming,
    /// Discard the incoming write; the stored state stands
    KeepCurrent,
}

/// Policy invoked on version mismatch.
///
/// Implementations decide between the stored node and the incoming partial
/// write; they never merge field-by-field.
pub trait ConflictResolver: Send + Sync {
    fn resolve(&self, current: &Node, incoming: &NodeUpdate) -> ConflictResolution;
}

/// Default policy: accept the incoming write iff its timestamp is strictly
/// newer than the stored node's `modified_at`. An incoming write without a
/// timestamp is treated as happening now.
#[derive(Debug, Default, Clone, Copy)]
pub struct LastWriteWins;

impl ConflictResolver for LastWriteWins {
    fn resolve(&self, current: &Node, incoming: &NodeUpdate) -> ConflictResolution {
        let incoming_at = incoming.modified_at.unwrap_or_else(Utc::now);
        if incoming_at > current.modified_at {
            ConflictResolution::AcceptIncoming
        } else {
            ConflictResolution::KeepCurrent
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use serde_json::json;

    fn sample_node() -> Node {
        Node::new("text".to_string(), "stored".to_string(), None, json!({}))
    }

    #[test]
    fn test_newer_incoming_wins() {
        let node = sample_node();
        let incoming = NodeUpdate::content("incoming")
            .with_modified_at(node.modified_at + Duration::seconds(5));
        assert_eq!(
            LastWriteWins.resolve(&node, &incoming),
            ConflictResolution::AcceptIncoming
        );
    }

    #[test]
    fn test_older_incoming_is_discarded() {
        let node = sample_node();
        let incoming = NodeUpdate::content("incoming")
            .with_modified_at(node.modified_at - Duration::seconds(5));
        assert_eq!(
            LastWriteWins.resolve(&node, &incoming),
            ConflictResolution::KeepCurrent
        );
    }

    #[test]
    fn test_equal_timestamp_keeps_current() {
        let node = sample_node();
        let incoming = NodeUpdate::content("incoming").with_modified_at(node.modified_at);
        assert_eq!(
            LastWriteWins.resolve(&node, &incoming),
            ConflictResolution::KeepCurrent
        );
    }

    #[test]
    fn test_untimestamped_incoming_counts_as_now() {
        let mut node = sample_node();
        node.modified_at -= Duration::seconds(60);
        let incoming = NodeUpdate::content("incoming");
        assert_eq!(
            LastWriteWins.resolve(&node, &incoming),
            ConflictResolution::AcceptIncoming
        );
    }
}
