//! Structure Index
//!
//! Ordered adjacency model for the document tree: parent-id -> ordered list
//! of child ids, plus a synthetic ROOT bucket for top-level nodes and a
//! reverse child -> parent map for O(1) upward walks.
//!
//! Ordering is maintained by explicit fractional order keys, not array
//! indices, so inserting between two siblings never renumbers the rest of
//! the list; ties are broken by insertion order. Depth is always computed by
//! walking parent links, never cached on the node, so it cannot go stale
//! when ancestors move.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::RwLock;
use tracing::warn;

/// Parent slot of a structure edge: a real node or the synthetic document root
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ParentKey {
    /// Top-level bucket for parent-less nodes
    Root,
    /// A parent node id
    Node(String),
}

impl ParentKey {
    /// Build from a node's `parent_id` field
    pub fn from_parent_id(parent_id: Option<&str>) -> Self {
        match parent_id {
            Some(id) => Self::Node(id.to_string()),
            None => Self::Root,
        }
    }

    /// The parent id this key denotes, if it is a real node
    pub fn as_node_id(&self) -> Option<&str> {
        match self {
            Self::Root => None,
            Self::Node(id) => Some(id.as_str()),
        }
    }

    /// Convert to the `parent_id` field shape
    pub fn to_parent_id(&self) -> Option<String> {
        self.as_node_id().map(str::to_string)
    }
}

/// One ordered edge entry: child id plus its fractional order key
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ChildEntry {
    pub(crate) id: String,
    pub(crate) order: f64,
}

/// Calculate an order key between two neighbors.
///
/// - first child: `1.0`
/// - before the first: `next - 1.0`
/// - after the last: `prev + 1.0`
/// - between siblings: midpoint
fn order_between(prev: Option<f64>, next: Option<f64>) -> f64 {
    match (prev, next) {
        (None, None) => 1.0,
        (None, Some(next)) => next - 1.0,
        (Some(prev), None) => prev + 1.0,
        (Some(prev), Some(next)) => (prev + next) / 2.0,
    }
}

#[derive(Default)]
struct IndexState {
    children: HashMap<ParentKey, Vec<ChildEntry>>,
    parents: HashMap<String, ParentKey>,
}

impl IndexState {
    /// Detach a child from whatever list currently holds it.
    /// Keeps invariant: a child appears in exactly one list at a time.
    fn detach(&mut self, child: &str) {
        if let Some(parent) = self.parents.remove(child) {
            if let Some(entries) = self.children.get_mut(&parent) {
                entries.retain(|e| e.id != child);
                if entries.is_empty() {
                    self.children.remove(&parent);
                }
            }
        }
    }

    /// Insert an entry keeping the list sorted by order key; equal keys
    /// preserve insertion order (new entry goes after existing ties).
    fn attach(&mut self, parent: ParentKey, child: String, order: f64) {
        self.detach(&child);
        let entries = self.children.entry(parent.clone()).or_default();
        let position = entries.partition_point(|e| e.order <= order);
        entries.insert(
            position,
            ChildEntry {
                id: child.clone(),
                order,
            },
        );
        self.parents.insert(child, parent);
    }
}

/// Ordered parent/child adjacency with a synthetic ROOT bucket
#[derive(Default)]
pub struct StructureIndex {
    state: RwLock<IndexState>,
}

impl StructureIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a child under a parent at an explicit order key.
    /// Detaches the child from any previous parent first.
    pub fn add_child(&self, parent: ParentKey, child: &str, order: f64) {
        let mut state = self.state.write().unwrap();
        state.attach(parent, child.to_string(), order);
    }

    /// Append a child at the end of a parent's list, returning its order key
    pub fn append_child(&self, parent: ParentKey, child: &str) -> f64 {
        let mut state = self.state.write().unwrap();
        let last = state
            .children
            .get(&parent)
            .and_then(|entries| entries.last())
            .map(|e| e.order);
        let order = order_between(last, None);
        state.attach(parent, child.to_string(), order);
        order
    }

    /// Insert a child at the beginning of a parent's list
    pub fn insert_first(&self, parent: ParentKey, child: &str) -> f64 {
        let mut state = self.state.write().unwrap();
        let first = state
            .children
            .get(&parent)
            .and_then(|entries| entries.first())
            .map(|e| e.order);
        let order = order_between(None, first);
        state.attach(parent, child.to_string(), order);
        order
    }

    /// Insert a child immediately after an existing sibling.
    /// Falls back to appending when the sibling is not in the list.
    pub fn insert_after_sibling(&self, parent: ParentKey, child: &str, after: &str) -> f64 {
        let mut state = self.state.write().unwrap();
        let (prev, next) = match state.children.get(&parent) {
            Some(entries) => match entries.iter().position(|e| e.id == after) {
                Some(position) => (
                    Some(entries[position].order),
                    entries.get(position + 1).map(|e| e.order),
                ),
                None => {
                    warn!(parent = ?parent, after = %after, "sibling anchor missing, appending");
                    (entries.last().map(|e| e.order), None)
                }
            },
            None => (None, None),
        };
        let order = order_between(prev, next);
        state.attach(parent, child.to_string(), order);
        order
    }

    /// Remove a child from a specific parent's list.
    /// Returns whether an edge was actually removed.
    pub fn remove_child(&self, parent: &ParentKey, child: &str) -> bool {
        let mut state = self.state.write().unwrap();
        if state.parents.get(child) == Some(parent) {
            state.detach(child);
            true
        } else {
            false
        }
    }

    /// Remove a child from whatever list currently holds it
    pub fn remove(&self, child: &str) -> bool {
        let mut state = self.state.write().unwrap();
        if state.parents.contains_key(child) {
            state.detach(child);
            true
        } else {
            false
        }
    }

    /// Move a child to a new parent, after the given sibling
    /// (`None` appends at the end of the new parent's list)
    pub fn move_child(&self, child: &str, new_parent: ParentKey, after_sibling: Option<&str>) {
        match after_sibling {
            Some(after) => {
                self.insert_after_sibling(new_parent, child, after);
            }
            None => {
                self.append_child(new_parent, child);
            }
        }
    }

    /// Ordered child ids of a parent (empty when none)
    pub fn get_children(&self, parent: &ParentKey) -> Vec<String> {
        self.state
            .read()
            .unwrap()
            .children
            .get(parent)
            .map(|entries| entries.iter().map(|e| e.id.clone()).collect())
            .unwrap_or_default()
    }

    /// Position of a child within a parent's ordered list
    pub fn child_position(&self, parent: &ParentKey, child: &str) -> Option<usize> {
        self.state
            .read()
            .unwrap()
            .children
            .get(parent)?
            .iter()
            .position(|e| e.id == child)
    }

    /// Current parent slot of a child, `None` when the child is not indexed
    pub fn parent_of(&self, child: &str) -> Option<ParentKey> {
        self.state.read().unwrap().parents.get(child).cloned()
    }

    /// Depth derived by walking parent links: children of ROOT are depth 0.
    /// `None` when the id is not indexed.
    pub fn depth(&self, id: &str) -> Option<usize> {
        let state = self.state.read().unwrap();
        let mut depth = 0usize;
        let mut current = id;
        let mut visited = HashSet::new();
        loop {
            if !visited.insert(current.to_string()) {
                warn!(node_id = %id, "cycle detected during depth walk");
                return None;
            }
            match state.parents.get(current)? {
                ParentKey::Root => return Some(depth),
                ParentKey::Node(parent) => {
                    depth += 1;
                    current = parent;
                }
            }
        }
    }

    /// Ancestor node ids from the immediate parent up to the root-level node
    pub fn ancestor_chain(&self, id: &str) -> Vec<String> {
        let state = self.state.read().unwrap();
        let mut chain = Vec::new();
        let mut current = id.to_string();
        let mut visited = HashSet::new();
        visited.insert(current.clone());
        while let Some(ParentKey::Node(parent)) = state.parents.get(&current) {
            if !visited.insert(parent.clone()) {
                break;
            }
            chain.push(parent.clone());
            current = parent.clone();
        }
        chain
    }

    /// Whether `candidate` lies inside the subtree rooted at `ancestor`
    pub fn is_descendant(&self, candidate: &str, ancestor: &str) -> bool {
        self.ancestor_chain(candidate)
            .iter()
            .any(|id| id == ancestor)
    }

    /// The node plus all its descendants, preorder
    pub fn collect_subtree(&self, id: &str) -> Vec<String> {
        let state = self.state.read().unwrap();
        let mut result = Vec::new();
        let mut stack = vec![id.to_string()];
        let mut visited = HashSet::new();
        while let Some(current) = stack.pop() {
            if !visited.insert(current.clone()) {
                continue;
            }
            result.push(current.clone());
            if let Some(entries) = state.children.get(&ParentKey::Node(current)) {
                // Reverse so the preorder pops children left-to-right
                for entry in entries.iter().rev() {
                    stack.push(entry.id.clone());
                }
            }
        }
        result
    }

    /// Raw entries of a parent's list, for snapshot capture
    pub(crate) fn entries(&self, parent: &ParentKey) -> Vec<ChildEntry> {
        self.state
            .read()
            .unwrap()
            .children
            .get(parent)
            .cloned()
            .unwrap_or_default()
    }

    /// Restore a set of snapshotted edge lists atomically.
    ///
    /// Every parent key in `edges` is overwritten verbatim; `covered` child
    /// ids are swept out of all other lists first, so a child the operation
    /// moved under a brand-new parent ends up back exactly where the
    /// snapshot says (or nowhere, if it did not exist pre-operation).
    pub(crate) fn restore_edges(
        &self,
        edges: &HashMap<ParentKey, Vec<ChildEntry>>,
        covered: &HashSet<String>,
    ) {
        let mut state = self.state.write().unwrap();

        // Sweep covered children out of non-snapshotted lists
        let foreign_parents: Vec<ParentKey> = state
            .children
            .keys()
            .filter(|parent| !edges.contains_key(parent))
            .cloned()
            .collect();
        for parent in foreign_parents {
            if let Some(entries) = state.children.get_mut(&parent) {
                entries.retain(|e| !covered.contains(&e.id));
                if entries.is_empty() {
                    state.children.remove(&parent);
                }
            }
        }
        for child in covered {
            state.parents.remove(child);
        }

        // Put snapshotted lists back verbatim, unmapping children the
        // operation had parked in a snapshotted list
        for (parent, entries) in edges {
            if let Some(current) = state.children.get(parent) {
                for entry in current.clone() {
                    if !entries.iter().any(|e| e.id == entry.id) {
                        state.parents.remove(&entry.id);
                    }
                }
            }
            if entries.is_empty() {
                state.children.remove(parent);
            } else {
                state.children.insert(parent.clone(), entries.clone());
            }
            for entry in entries {
                state.parents.insert(entry.id.clone(), parent.clone());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_order_between() {
        assert_eq!(order_between(None, None), 1.0);
        assert_eq!(order_between(None, Some(2.0)), 1.0);
        assert_eq!(order_between(Some(3.0), None), 4.0);
        assert_eq!(order_between(Some(1.0), Some(3.0)), 2.0);
    }

    #[test]
    fn test_append_and_order() {
        let index = StructureIndex::new();
        index.append_child(ParentKey::Root, "a");
        index.append_child(ParentKey::Root, "b");
        index.append_child(ParentKey::Root, "c");
        assert_eq!(index.get_children(&ParentKey::Root), ["a", "b", "c"]);
    }

    #[test]
    fn test_insert_between_never_renumbers() {
        let index = StructureIndex::new();
        index.append_child(ParentKey::Root, "a");
        index.append_child(ParentKey::Root, "c");
        let a_order = index.entries(&ParentKey::Root)[0].order;
        let c_order = index.entries(&ParentKey::Root)[1].order;

        index.insert_after_sibling(ParentKey::Root, "b", "a");
        assert_eq!(index.get_children(&ParentKey::Root), ["a", "b", "c"]);
        // Neighbors keep their keys
        let entries = index.entries(&ParentKey::Root);
        assert_eq!(entries[0].order, a_order);
        assert_eq!(entries[2].order, c_order);
    }

    #[test]
    fn test_insert_first() {
        let index = StructureIndex::new();
        index.append_child(ParentKey::Root, "b");
        index.insert_first(ParentKey::Root, "a");
        assert_eq!(index.get_children(&ParentKey::Root), ["a", "b"]);
    }

    #[test]
    fn test_child_in_exactly_one_list() {
        let index = StructureIndex::new();
        index.append_child(ParentKey::Root, "a");
        index.append_child(ParentKey::Node("p".to_string()), "a");
        assert!(index.get_children(&ParentKey::Root).is_empty());
        assert_eq!(
            index.get_children(&ParentKey::Node("p".to_string())),
            ["a"]
        );
        assert_eq!(index.parent_of("a"), Some(ParentKey::Node("p".to_string())));
    }

    #[test]
    fn test_depth_via_ancestor_walk() {
        let index = StructureIndex::new();
        index.append_child(ParentKey::Root, "a");
        index.append_child(ParentKey::Node("a".to_string()), "b");
        index.append_child(ParentKey::Node("b".to_string()), "c");
        assert_eq!(index.depth("a"), Some(0));
        assert_eq!(index.depth("b"), Some(1));
        assert_eq!(index.depth("c"), Some(2));
        assert_eq!(index.depth("unknown"), None);

        // Moving an ancestor is immediately reflected - depth is derived
        index.move_child("b", ParentKey::Root, None);
        assert_eq!(index.depth("c"), Some(1));
    }

    #[test]
    fn test_collect_subtree_preorder() {
        let index = StructureIndex::new();
        index.append_child(ParentKey::Root, "a");
        index.append_child(ParentKey::Node("a".to_string()), "b");
        index.append_child(ParentKey::Node("a".to_string()), "c");
        index.append_child(ParentKey::Node("b".to_string()), "d");
        assert_eq!(index.collect_subtree("a"), ["a", "b", "d", "c"]);
    }

    #[test]
    fn test_is_descendant() {
        let index = StructureIndex::new();
        index.append_child(ParentKey::Root, "a");
        index.append_child(ParentKey::Node("a".to_string()), "b");
        index.append_child(ParentKey::Node("b".to_string()), "c");
        assert!(index.is_descendant("c", "a"));
        assert!(index.is_descendant("b", "a"));
        assert!(!index.is_descendant("a", "c"));
        assert!(!index.is_descendant("a", "a"));
    }

    #[test]
    fn test_move_child_after_sibling() {
        let index = StructureIndex::new();
        index.append_child(ParentKey::Root, "a");
        index.append_child(ParentKey::Root, "b");
        index.append_child(ParentKey::Root, "c");
        index.move_child("c", ParentKey::Root, Some("a"));
        assert_eq!(index.get_children(&ParentKey::Root), ["a", "c", "b"]);
    }

    #[test]
    fn test_remove_child() {
        let index = StructureIndex::new();
        index.append_child(ParentKey::Root, "a");
        assert!(index.remove_child(&ParentKey::Root, "a"));
        assert!(!index.remove_child(&ParentKey::Root, "a"));
        assert!(index.get_children(&ParentKey::Root).is_empty());
        assert_eq!(index.parent_of("a"), None);
    }
}
