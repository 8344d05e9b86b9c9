//! Document Store
//!
//! The canonical in-memory state of one outline document:
//!
//! - [`NodeTable`] - versioned node records with conflict resolution
//! - [`StructureIndex`] - ordered parent/child adjacency
//! - [`SubscriptionHub`] - per-node and wildcard observer fan-out
//! - [`StoreSnapshot`] - rollback support for optimistic operations
//!
//! All three live inside a [`DocumentContext`]: an explicitly constructed,
//! explicitly owned context object passed to every component at construction
//! time. There are no module-level globals, so a process can host several
//! independent documents and tests get deterministic isolation by building a
//! fresh context each.

pub mod conflict;
pub mod events;
pub mod node_table;
pub mod snapshot;
pub mod structure_index;
pub mod subscription_hub;

pub use conflict::{ConflictResolution, ConflictResolver, LastWriteWins};
pub use events::{
    AffectedOperation, DomainEvent, EventEnvelope, EventNamespace, FailureReason,
    PersistenceFailureEvent, UpdateSource,
};
pub use node_table::{NodeTable, StoreError, UpdateOutcome};
pub use snapshot::StoreSnapshot;
pub use structure_index::{ParentKey, StructureIndex};
pub use subscription_hub::{SubscriptionHandle, SubscriptionHub};

use std::sync::Arc;

/// Shared state of one logical document.
///
/// Every `TreeMutator` / `OptimisticOperationManager` instance constructed
/// over the same context reads and writes the same tables; isolation between
/// viewers of the document comes from distinct subscriptions, not separate
/// data copies.
pub struct DocumentContext {
    /// Canonical node records
    pub nodes: NodeTable,
    /// Ordered parent/child structure
    pub structure: StructureIndex,
    /// Observer registry all committed mutations fan out through
    pub hub: Arc<SubscriptionHub>,
}

impl DocumentContext {
    /// Build a fresh document with last-write-wins conflict resolution
    pub fn new() -> Arc<Self> {
        let hub = Arc::new(SubscriptionHub::new());
        Arc::new(Self {
            nodes: NodeTable::new(hub.clone()),
            structure: StructureIndex::new(),
            hub,
        })
    }

    /// Build a fresh document with a custom conflict resolution policy
    pub fn with_resolver(resolver: Box<dyn ConflictResolver>) -> Arc<Self> {
        let hub = Arc::new(SubscriptionHub::new());
        Arc::new(Self {
            nodes: NodeTable::with_resolver(hub.clone(), resolver),
            structure: StructureIndex::new(),
            hub,
        })
    }

    /// Depth of a node derived from the structure index
    pub fn depth(&self, id: &str) -> Option<usize> {
        self.structure.depth(id)
    }
}
