//! Error types for the tree-operations layer
//!
//! These errors represent local invariant violations caught before any state
//! is committed. Persistence failures are deliberately not here: a rejected
//! backend call never throws past the operation boundary - it becomes a
//! rollback plus a published `error:persistence-failed` event (see
//! [`crate::operations::OptimisticOperationManager`]).

use crate::store::StoreError;
use thiserror::Error;

/// Errors raised by structural operations before anything is committed
#[derive(Error, Debug)]
pub enum TreeError {
    /// Operation referenced a node id absent from the store.
    /// Always a programming error if it reaches the mutation layer.
    #[error("Node '{node_id}' does not exist")]
    NodeNotFound { node_id: String },

    /// The requested re-parenting would make a node its own ancestor
    #[error("Circular reference: node '{node_id}' cannot become a descendant of itself via {reference_type}")]
    CircularReference {
        node_id: String,
        reference_type: String,
    },

    /// The requested operation violates a structural rule
    #[error("Invalid operation: {reason}")]
    InvalidOperation { reason: String },

    /// Store-level failure surfaced through a structural operation
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl TreeError {
    /// Create a NodeNotFound error
    pub fn node_not_found(node_id: impl Into<String>) -> Self {
        Self::NodeNotFound {
            node_id: node_id.into(),
        }
    }

    /// Create a CircularReference error
    pub fn circular_reference(
        node_id: impl Into<String>,
        reference_type: impl Into<String>,
    ) -> Self {
        Self::CircularReference {
            node_id: node_id.into(),
            reference_type: reference_type.into(),
        }
    }

    /// Create an InvalidOperation error
    pub fn invalid_operation(reason: impl Into<String>) -> Self {
        Self::InvalidOperation {
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_not_found_message() {
        let err = TreeError::node_not_found("missing-node");
        assert!(matches!(err, TreeError::NodeNotFound { .. }));
        assert_eq!(format!("{}", err), "Node 'missing-node' does not exist");
    }

    #[test]
    fn test_circular_reference_message() {
        let err = TreeError::circular_reference("node-123", "move target");
        assert_eq!(
            format!("{}", err),
            "Circular reference: node 'node-123' cannot become a descendant of itself via move target"
        );
    }

    #[test]
    fn test_store_error_conversion() {
        let err: TreeError = StoreError::node_not_found("n-1").into();
        assert!(matches!(err, TreeError::Store(_)));
    }
}
