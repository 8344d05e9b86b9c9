//! Rollback Snapshots
//!
//! An immutable copy of the slice of document state one optimistic operation
//! may need to restore: the structure-index edge lists for the affected
//! nodes' subtrees (always), and the affected node records (only when the
//! operation opts into data snapshotting).
//!
//! A snapshot is owned solely by the operation that captured it: discarded
//! on persistence success, consumed by `restore` on failure. Restoring only
//! touches what was captured - overlapping rollbacks are resolved by
//! whichever restore runs last, an accepted race of the fire-and-forget
//! persistence model.

use crate::models::Node;
use crate::store::structure_index::{ChildEntry, ParentKey};
use crate::store::DocumentContext;
use std::collections::{HashMap, HashSet};

/// Pre-operation copy of the affected slice of the document
pub struct StoreSnapshot {
    /// Edge lists captured verbatim, keyed by parent slot
    edges: HashMap<ParentKey, Vec<ChildEntry>>,
    /// Child ids the snapshot accounts for; restore sweeps these out of any
    /// list the operation moved them into
    covered: HashSet<String>,
    /// Node records, present only when data snapshotting was requested
    /// (`None` per id = the node did not exist pre-operation)
    nodes: Option<HashMap<String, Option<Node>>>,
}

impl StoreSnapshot {
    /// Capture the slice of state reachable from `affected`: each node's
    /// containing sibling list (its vacated position) plus every edge list
    /// in its subtree. Include the structural anchors (parent, sibling) in
    /// `affected` so their lists are captured too.
    pub fn capture(context: &DocumentContext, affected: &[String], include_data: bool) -> Self {
        let mut edges: HashMap<ParentKey, Vec<ChildEntry>> = HashMap::new();
        let mut covered = HashSet::new();

        for id in affected {
            covered.insert(id.clone());
            if let Some(parent) = context.structure.parent_of(id) {
                edges
                    .entry(parent.clone())
                    .or_insert_with(|| context.structure.entries(&parent));
            }
            for member in context.structure.collect_subtree(id) {
                covered.insert(member.clone());
                let key = ParentKey::Node(member);
                edges
                    .entry(key.clone())
                    .or_insert_with(|| context.structure.entries(&key));
            }
        }

        let nodes = include_data.then(|| {
            affected
                .iter()
                .map(|id| (id.clone(), context.nodes.get(id)))
                .collect()
        });

        Self {
            edges,
            covered,
            nodes,
        }
    }

    /// Put the captured slice back. Structural edges are always restored;
    /// node records only when they were captured. No lifecycle events are
    /// emitted - the persistence-failed report is the rollback's only signal.
    pub fn restore(&self, context: &DocumentContext) {
        context.structure.restore_edges(&self.edges, &self.covered);
        if let Some(nodes) = &self.nodes {
            for (id, record) in nodes {
                match record {
                    Some(node) => context.nodes.restore_record(node.clone()),
                    None => context.nodes.remove_record(id),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Node, NodeUpdate};
    use crate::store::events::UpdateSource;
    use serde_json::json;

    fn seed(context: &DocumentContext, id: &str, parent: Option<&str>) {
        let node = Node::new_with_id(
            id.to_string(),
            "text".to_string(),
            format!("content of {id}"),
            parent.map(str::to_string),
            json!({}),
        );
        context.nodes.set(node, UpdateSource::UserEdit);
        match parent {
            Some(p) => context
                .structure
                .append_child(ParentKey::Node(p.to_string()), id),
            None => context.structure.append_child(ParentKey::Root, id),
        };
    }

    #[test]
    fn test_structural_restore_after_move() {
        let context = DocumentContext::new();
        seed(&context, "a", None);
        seed(&context, "b", Some("a"));
        seed(&context, "c", Some("a"));

        let snapshot =
            StoreSnapshot::capture(&context, &["a".to_string(), "c".to_string()], false);

        // Mutate: move c under b
        context
            .structure
            .move_child("c", ParentKey::Node("b".to_string()), None);
        assert_eq!(
            context
                .structure
                .get_children(&ParentKey::Node("b".to_string())),
            ["c"]
        );

        snapshot.restore(&context);
        assert_eq!(
            context
                .structure
                .get_children(&ParentKey::Node("a".to_string())),
            ["b", "c"]
        );
        assert!(context
            .structure
            .get_children(&ParentKey::Node("b".to_string()))
            .is_empty());
    }

    #[test]
    fn test_rolled_back_add_leaves_no_edge() {
        let context = DocumentContext::new();
        seed(&context, "parent", None);

        let snapshot = StoreSnapshot::capture(
            &context,
            &["parent".to_string(), "new-child".to_string()],
            false,
        );

        seed(&context, "new-child", Some("parent"));
        snapshot.restore(&context);

        assert!(
            context
                .structure
                .get_children(&ParentKey::Node("parent".to_string()))
                .is_empty(),
            "getChildren is clean after rollback, not partially applied"
        );
        assert_eq!(context.structure.parent_of("new-child"), None);
    }

    #[test]
    fn test_data_restore_is_opt_in() {
        let context = DocumentContext::new();
        seed(&context, "a", None);

        let structural_only = StoreSnapshot::capture(&context, &["a".to_string()], false);
        context
            .nodes
            .update("a", NodeUpdate::content("mutated"), UpdateSource::UserEdit, true)
            .unwrap();
        structural_only.restore(&context);
        assert_eq!(
            context.nodes.get("a").unwrap().content,
            "mutated",
            "content changes survive a structural-only rollback"
        );

        let with_data = StoreSnapshot::capture(&context, &["a".to_string()], true);
        context
            .nodes
            .update("a", NodeUpdate::content("mutated again"), UpdateSource::UserEdit, true)
            .unwrap();
        with_data.restore(&context);
        assert_eq!(context.nodes.get("a").unwrap().content, "mutated");
    }
}
