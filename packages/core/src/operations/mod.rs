//! Structural Operations
//!
//! The mutation surface of the document: [`TreeMutator`] implements the
//! structural algorithms (create, combine, indent, outdent, move) over a
//! shared [`crate::store::DocumentContext`], and
//! [`OptimisticOperationManager`] wraps them in the optimistic
//! apply-now/persist-later protocol with snapshot rollback.

pub mod error;
pub mod optimistic;
pub mod tree_mutator;

pub use error::TreeError;
pub use optimistic::{
    BatchOperation, OperationOptions, OptimisticOperationManager, PersistenceOutcome,
    StructuralChange,
};
pub use tree_mutator::{CreateNodeArgs, TreeMutator};
