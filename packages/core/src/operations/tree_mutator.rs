//! Tree Mutator - Structural Algorithms
//!
//! The structural operations of the outline: create, combine (delete +
//! merge + child promotion), indent, outdent, and move. Each operation is a
//! single atomic transition over (NodeTable, StructureIndex): it validates
//! first, mutates both tables together, keeps `Node.parent_id` in agreement
//! with the index, and emits domain events.
//!
//! # Child promotion policy
//!
//! When a node is deleted by merging it into another node, its children are
//! re-parented under the nearest ancestor of the *merge target* (inclusive)
//! whose depth equals `depth(deleted) - 1` - the ancestor that would have
//! been the deleted node's depth-correct parent when walking up from the
//! merge side. Ties at equal depth on different branches cannot arise: the
//! deleted node's own branch no longer exists after the merge, so the walk
//! always resolves on the merge-target side. If no such ancestor exists
//! (deleted node at depth 0, or the target's chain is shorter), children are
//! promoted to the document root.
//!
//! Promoted subtrees shift by a constant depth delta: only the promoted
//! child's parent edge is rewritten, descendants keep their relative depth.

use crate::models::{block_prefix, has_block_prefix, Node, NodeUpdate};
use crate::operations::error::TreeError;
use crate::store::{DocumentContext, DomainEvent, EventEnvelope, ParentKey, UpdateSource};
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, info};

/// Parameters for creating a node relative to an existing one
#[derive(Debug, Clone)]
pub struct CreateNodeArgs {
    /// Existing node the new node is positioned against
    pub after_node_id: String,
    /// Initial content (block prefix may be seeded in, see `create_node`)
    pub content: String,
    /// Type of the new node
    pub node_type: String,
    /// Requested depth; `depth(after) + 1` places the node as a first child
    pub depth_hint: Option<usize>,
    /// Force first-child placement regardless of `depth_hint`
    pub insert_at_beginning: bool,
}

impl CreateNodeArgs {
    /// Args for the common case: a sibling inserted right after `after_node_id`
    pub fn sibling(
        after_node_id: impl Into<String>,
        content: impl Into<String>,
        node_type: impl Into<String>,
    ) -> Self {
        Self {
            after_node_id: after_node_id.into(),
            content: content.into(),
            node_type: node_type.into(),
            depth_hint: None,
            insert_at_beginning: false,
        }
    }
}

/// Where the first promoted child lands in its new parent's list
enum PromotePosition {
    After(String),
    First,
    Append,
}

/// Structural algorithms over a shared document context
pub struct TreeMutator {
    context: Arc<DocumentContext>,
}

impl TreeMutator {
    pub fn new(context: Arc<DocumentContext>) -> Self {
        Self { context }
    }

    fn require(&self, id: &str) -> Result<Node, TreeError> {
        self.context
            .nodes
            .get(id)
            .ok_or_else(|| TreeError::node_not_found(id))
    }

    fn publish_hierarchy(&self, affected_nodes: Vec<String>) {
        self.context.hub.publish(&EventEnvelope::lifecycle(
            UpdateSource::UserEdit,
            DomainEvent::HierarchyChanged { affected_nodes },
        ));
    }

    /// Insert a new node relative to `after_node_id` and return its id.
    ///
    /// Placement: first child of `after` when `insert_at_beginning` is set
    /// or `depth_hint` equals `depth(after) + 1`; otherwise the immediate
    /// next sibling of `after`.
    ///
    /// Prefix seeding: when `after`'s content carries the block prefix for
    /// its type (header markers, quote marker, code fence, list marker) and
    /// the caller supplies follow-on text without an equivalent prefix, the
    /// prefix is prepended so a split block keeps its formatting.
    ///
    /// Child splitting: inserting a sibling after an *expanded* node that
    /// owns children hands those children to the new node - visually they
    /// stay below the text that now follows them. Collapsed nodes keep
    /// their children.
    pub fn create_node(&self, args: CreateNodeArgs) -> Result<String, TreeError> {
        let after = self.require(&args.after_node_id)?;
        let after_depth = self
            .context
            .structure
            .depth(&after.id)
            .ok_or_else(|| TreeError::node_not_found(&after.id))?;

        let as_first_child =
            args.insert_at_beginning || args.depth_hint == Some(after_depth + 1);

        let content = seed_content(&after, &args.content);
        let parent_id = if as_first_child {
            Some(after.id.clone())
        } else {
            after.parent_id.clone()
        };

        let node = Node::new(args.node_type.clone(), content, parent_id, json!({}));
        let new_id = node.id.clone();
        self.context.nodes.set(node, UpdateSource::UserEdit);

        let mut affected = vec![after.id.clone(), new_id.clone()];
        if as_first_child {
            self.context
                .structure
                .insert_first(ParentKey::Node(after.id.clone()), &new_id);
        } else {
            let parent_key = self
                .context
                .structure
                .parent_of(&after.id)
                .unwrap_or(ParentKey::Root);
            self.context
                .structure
                .insert_after_sibling(parent_key, &new_id, &after.id);

            let children = self
                .context
                .structure
                .get_children(&ParentKey::Node(after.id.clone()));
            if !after.is_collapsed() && !children.is_empty() {
                for child in &children {
                    self.context.structure.move_child(
                        child,
                        ParentKey::Node(new_id.clone()),
                        None,
                    );
                    self.context.nodes.update(
                        child,
                        NodeUpdate::parent(Some(new_id.clone())),
                        UpdateSource::UserEdit,
                        true,
                    )?;
                }
                affected.extend(children);
            }
        }

        info!(after = %after.id, new_id = %new_id, as_first_child, "node created");
        self.publish_hierarchy(affected);
        Ok(new_id)
    }

    /// Merge `deleted_id` into `merge_target_id` and promote its children.
    ///
    /// The deleted node's content is concatenated onto the target's (the
    /// target keeps its id), the deleted node is removed from both tables,
    /// and its former children are re-parented per the module-level
    /// promotion policy - inserted immediately after the new parent's child
    /// that lies on the path toward the merge target, preserving
    /// left-to-right reading order.
    pub fn combine_nodes(&self, deleted_id: &str, merge_target_id: &str) -> Result<(), TreeError> {
        if deleted_id == merge_target_id {
            return Err(TreeError::invalid_operation(
                "cannot merge a node into itself",
            ));
        }
        let deleted = self.require(deleted_id)?;
        let target = self.require(merge_target_id)?;
        let structure = &self.context.structure;
        if structure.is_descendant(merge_target_id, deleted_id) {
            return Err(TreeError::invalid_operation(
                "merge target lies inside the deleted node's subtree",
            ));
        }

        let deleted_depth = structure
            .depth(deleted_id)
            .ok_or_else(|| TreeError::node_not_found(deleted_id))?;
        let target_depth = structure
            .depth(merge_target_id)
            .ok_or_else(|| TreeError::node_not_found(merge_target_id))?;

        let deleted_parent = structure.parent_of(deleted_id).unwrap_or(ParentKey::Root);
        let siblings = structure.get_children(&deleted_parent);
        let previous_sibling = siblings
            .iter()
            .position(|id| id == deleted_id)
            .filter(|&position| position > 0)
            .map(|position| siblings[position - 1].clone());
        let children = structure.get_children(&ParentKey::Node(deleted_id.to_string()));

        // chain[i] is the merge target's ancestor at depth (target_depth - i)
        let mut chain = vec![merge_target_id.to_string()];
        chain.extend(structure.ancestor_chain(merge_target_id));

        let (new_parent, position) = if deleted_depth == 0 {
            // Deleted node was root-level: promote to root, into its slot
            let position = previous_sibling
                .clone()
                .map(PromotePosition::After)
                .unwrap_or(PromotePosition::First);
            (ParentKey::Root, position)
        } else {
            let index = target_depth as i64 - (deleted_depth as i64 - 1);
            if index >= 0 {
                let ancestor = ParentKey::Node(chain[index as usize].clone());
                let position = if index >= 1 {
                    // The ancestor's child on the path toward the merge target
                    PromotePosition::After(chain[(index - 1) as usize].clone())
                } else if ancestor == deleted_parent {
                    // No anchor child: fall back to the deleted node's slot
                    previous_sibling
                        .clone()
                        .map(PromotePosition::After)
                        .unwrap_or(PromotePosition::First)
                } else {
                    PromotePosition::Append
                };
                (ancestor, position)
            } else {
                // Merge target's chain is shorter than the deleted node's
                // depth: promote to root, after the target's root ancestor
                let root_ancestor = chain.last().cloned().unwrap_or_default();
                (ParentKey::Root, PromotePosition::After(root_ancestor))
            }
        };

        // Merge content, then drop the deleted node from both tables
        self.context.nodes.update(
            merge_target_id,
            NodeUpdate::content(format!("{}{}", target.content, deleted.content)),
            UpdateSource::UserEdit,
            true,
        )?;
        structure.remove(deleted_id);
        self.context.nodes.delete(deleted_id, UpdateSource::UserEdit)?;

        // Promote children in their original order; only the parent edge of
        // each child is rewritten, so whole subtrees shift together
        let new_parent_id = new_parent.to_parent_id();
        let mut previous = match &position {
            PromotePosition::After(anchor) => Some(anchor.clone()),
            _ => None,
        };
        for child in &children {
            match previous.as_deref() {
                Some(anchor) => {
                    structure.insert_after_sibling(new_parent.clone(), child, anchor);
                }
                None => match position {
                    PromotePosition::First => {
                        structure.insert_first(new_parent.clone(), child);
                    }
                    _ => {
                        structure.append_child(new_parent.clone(), child);
                    }
                },
            }
            self.context.nodes.update(
                child,
                NodeUpdate::parent(new_parent_id.clone()),
                UpdateSource::UserEdit,
                true,
            )?;
            previous = Some(child.clone());
        }

        info!(
            deleted = %deleted_id,
            target = %merge_target_id,
            promoted = children.len(),
            new_parent = ?new_parent,
            "nodes combined"
        );
        let mut affected = vec![merge_target_id.to_string(), deleted_id.to_string()];
        affected.extend(children);
        self.publish_hierarchy(affected);
        Ok(())
    }

    /// Make the node a child of its immediately preceding sibling. The node
    /// and its whole subtree shift down one depth level. Returns `false`
    /// when there is no preceding sibling.
    pub fn indent_node(&self, node_id: &str) -> Result<bool, TreeError> {
        self.require(node_id)?;
        let structure = &self.context.structure;
        let parent = structure
            .parent_of(node_id)
            .ok_or_else(|| TreeError::node_not_found(node_id))?;
        let siblings = structure.get_children(&parent);
        let position = siblings
            .iter()
            .position(|id| id == node_id)
            .ok_or_else(|| TreeError::node_not_found(node_id))?;
        if position == 0 {
            debug!(node_id = %node_id, "indent refused: no preceding sibling");
            return Ok(false);
        }

        let new_parent = siblings[position - 1].clone();
        structure.move_child(node_id, ParentKey::Node(new_parent.clone()), None);
        self.context.nodes.update(
            node_id,
            NodeUpdate::parent(Some(new_parent.clone())),
            UpdateSource::UserEdit,
            true,
        )?;

        info!(node_id = %node_id, new_parent = %new_parent, "node indented");
        self.publish_hierarchy(vec![node_id.to_string(), new_parent]);
        Ok(true)
    }

    /// Make the node a sibling of its current parent, inserted immediately
    /// after the parent in the parent's own sibling list. The subtree
    /// shifts up one depth level. Returns `false` at depth 0.
    pub fn outdent_node(&self, node_id: &str) -> Result<bool, TreeError> {
        self.require(node_id)?;
        let structure = &self.context.structure;
        let parent_id = match structure.parent_of(node_id) {
            Some(ParentKey::Node(parent_id)) => parent_id,
            Some(ParentKey::Root) => {
                debug!(node_id = %node_id, "outdent refused: already at depth 0");
                return Ok(false);
            }
            None => return Err(TreeError::node_not_found(node_id)),
        };

        let grandparent = structure.parent_of(&parent_id).unwrap_or(ParentKey::Root);
        structure.move_child(node_id, grandparent.clone(), Some(&parent_id));
        self.context.nodes.update(
            node_id,
            NodeUpdate::parent(grandparent.to_parent_id()),
            UpdateSource::UserEdit,
            true,
        )?;

        info!(node_id = %node_id, former_parent = %parent_id, "node outdented");
        self.publish_hierarchy(vec![node_id.to_string(), parent_id]);
        Ok(true)
    }

    /// Move a node (with its subtree) under a new parent, after the given
    /// sibling (`None` appends). Rejects moves that would create a cycle.
    pub fn move_node(
        &self,
        node_id: &str,
        new_parent: Option<&str>,
        after_sibling: Option<&str>,
    ) -> Result<(), TreeError> {
        self.require(node_id)?;
        if let Some(parent) = new_parent {
            self.require(parent)?;
            if parent == node_id {
                return Err(TreeError::circular_reference(node_id, "parent"));
            }
            if self.context.structure.is_descendant(parent, node_id) {
                return Err(TreeError::circular_reference(node_id, "move target"));
            }
        }

        self.context.structure.move_child(
            node_id,
            ParentKey::from_parent_id(new_parent),
            after_sibling,
        );
        self.context.nodes.update(
            node_id,
            NodeUpdate::parent(new_parent.map(str::to_string)),
            UpdateSource::UserEdit,
            true,
        )?;

        let mut affected = vec![node_id.to_string()];
        affected.extend(new_parent.map(str::to_string));
        self.publish_hierarchy(affected);
        Ok(())
    }
}

/// Seed the block prefix of the node being split into the follow-on content,
/// unless the supplied text already starts with an equivalent prefix
fn seed_content(after: &Node, supplied: &str) -> String {
    if supplied.is_empty() {
        return String::new();
    }
    match block_prefix(&after.node_type, &after.content) {
        Some(prefix) if !has_block_prefix(&after.node_type, supplied) => {
            format!("{prefix}{supplied}")
        }
        _ => supplied.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(node_type: &str, content: &str) -> Node {
        Node::new(node_type.to_string(), content.to_string(), None, json!({}))
    }

    #[test]
    fn test_seed_content_inherits_prefix() {
        let header = node("header", "## Title");
        assert_eq!(seed_content(&header, "tail"), "## tail");

        let quote = node("quote-block", "> quoted");
        assert_eq!(seed_content(&quote, "more"), "> more");
    }

    #[test]
    fn test_seed_content_no_duplication() {
        let header = node("header", "## Title");
        assert_eq!(seed_content(&header, "### already marked"), "### already marked");
    }

    #[test]
    fn test_seed_content_empty_supplied_stays_empty() {
        let header = node("header", "## Title");
        assert_eq!(seed_content(&header, ""), "");
    }

    #[test]
    fn test_seed_content_plain_type_untouched() {
        let text = node("text", "plain");
        assert_eq!(seed_content(&text, "tail"), "tail");
    }
}
