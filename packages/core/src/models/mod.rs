//! Data Models
//!
//! Core data structures shared across the synchronization layer:
//!
//! - `Node` - universal node model for all content types
//! - `NodeUpdate` / `NodeFilter` - partial update and query shapes
//! - placeholder predicate and block-prefix helpers

mod node;
mod placeholder;

pub use node::{Node, NodeFilter, NodeUpdate};
pub use placeholder::{block_prefix, has_block_prefix, is_placeholder};
