//! Outline Core State Synchronization Layer
//!
//! This crate provides the in-memory document state, structural tree
//! operations, and optimistic persistence coordination for a hierarchical
//! outline editor.
//!
//! # Architecture
//!
//! - **Explicit context**: all shared state lives in a
//!   [`store::DocumentContext`]; no module-level globals, one context per
//!   open document
//! - **Flat storage**: nodes reference parents by id; the ordered adjacency
//!   lives in a separate structure index, never in object pointers
//! - **Optimistic writes**: mutations apply locally first, persistence runs
//!   detached, failures roll back from snapshots and surface as events
//! - **Placeholder gating**: empty and prefix-only nodes exist in local
//!   memory only and never reach the persistence backend
//!
//! # Modules
//!
//! - [`models`] - Data structures (Node, NodeUpdate, placeholder rules)
//! - [`store`] - NodeTable, StructureIndex, SubscriptionHub, snapshots
//! - [`operations`] - TreeMutator and the OptimisticOperationManager
//! - [`persistence`] - Backend trait and the placeholder gate

pub mod models;
pub mod operations;
pub mod persistence;
pub mod store;

// Re-export commonly used types
pub use models::{Node, NodeFilter, NodeUpdate};
pub use operations::{
    BatchOperation, CreateNodeArgs, OperationOptions, OptimisticOperationManager,
    PersistenceOutcome, StructuralChange, TreeError, TreeMutator,
};
pub use persistence::{
    replay_into, BackendWriter, PersistAction, PersistenceBackend, PersistenceError,
    PlaceholderGate,
};
pub use store::{
    DocumentContext, DomainEvent, EventEnvelope, FailureReason, SubscriptionHandle,
    SubscriptionHub, UpdateSource,
};

/// Initialize tracing for binaries and integration tests.
///
/// Respects `RUST_LOG`; defaults to `info` for this crate. Safe to call more
/// than once, later calls are no-ops.
pub fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("outline_core=info"));
    let _ = fmt().with_env_filter(filter).try_init();
}
