//! Placeholder detection and block-prefix handling
//!
//! A node whose content is empty (or consists solely of the block prefix for
//! its type) is a *placeholder*: it exists only in local memory and is never
//! sent to the persistence backend. The moment a trailing character lands
//! behind the prefix the node stops being a placeholder and must be promoted
//! with a backend create call (see [`crate::persistence::PlaceholderGate`]).
//!
//! The stripping rules are per node type:
//!
//! - `header`: leading `#{1,6}` with optional whitespace
//! - `quote-block`: `>` marker per line
//! - `code-block`: opening/closing fence lines
//! - `ordered-list`: `N.` marker
//! - `task` and unknown types: bare empty-string check

use crate::models::Node;
use regex::Regex;
use std::sync::LazyLock;

static HEADER_PREFIX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^(#{1,6}\s*)").unwrap());
static QUOTE_PREFIX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^>\s*").unwrap());
static ORDERED_PREFIX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^(\d+\.\s*)").unwrap());

/// Strip the type-specific block prefix from content, leaving only the
/// user-visible text. Unknown types pass through unchanged.
fn strip_block_prefix(node_type: &str, content: &str) -> String {
    match node_type {
        "header" => HEADER_PREFIX.replace(content, "").to_string(),
        "quote-block" => content
            .lines()
            .map(|line| QUOTE_PREFIX.replace(line, "").to_string())
            .collect::<Vec<_>>()
            .join("\n"),
        "code-block" => content
            .lines()
            .filter(|line| !line.trim_start().starts_with("```"))
            .collect::<Vec<_>>()
            .join("\n"),
        "ordered-list" => ORDERED_PREFIX.replace(content, "").to_string(),
        _ => content.to_string(),
    }
}

/// Whether the node is a placeholder: content trimmed is empty, or is a bare
/// type-specific prefix with no trailing text.
///
/// # Examples
///
/// ```rust
/// use outline_core::models::{is_placeholder, Node};
/// use serde_json::json;
///
/// let empty = Node::new("text".to_string(), "  ".to_string(), None, json!({}));
/// assert!(is_placeholder(&empty));
///
/// let bare_header = Node::new("header".to_string(), "## ".to_string(), None, json!({}));
/// assert!(is_placeholder(&bare_header));
///
/// let real_header = Node::new("header".to_string(), "## T".to_string(), None, json!({}));
/// assert!(!is_placeholder(&real_header));
/// ```
pub fn is_placeholder(node: &Node) -> bool {
    let trimmed = node.content.trim();
    if trimmed.is_empty() {
        return true;
    }
    strip_block_prefix(&node.node_type, trimmed).trim().is_empty()
}

/// The block prefix carried by a node's content, if its content actually
/// starts with one for its type.
///
/// Used when splitting a node: the follow-on node inherits the prefix so that
/// e.g. pressing Enter inside a quote block keeps quoting. Returns the exact
/// prefix text (`"## "`, `"> "`, `"3. "`, or the opening fence line).
pub fn block_prefix(node_type: &str, content: &str) -> Option<String> {
    match node_type {
        "header" => HEADER_PREFIX
            .captures(content)
            .map(|c| c.get(1).unwrap().as_str().to_string()),
        "quote-block" => content.starts_with('>').then(|| "> ".to_string()),
        "code-block" => {
            let first = content.lines().next()?;
            first
                .starts_with("```")
                .then(|| format!("{}\n", first.trim_end()))
        }
        "ordered-list" => ORDERED_PREFIX
            .captures(content)
            .map(|c| c.get(1).unwrap().as_str().to_string()),
        _ => None,
    }
}

/// Whether content already starts with an equivalent prefix for the given
/// type, so that prefix seeding does not duplicate markers.
pub fn has_block_prefix(node_type: &str, content: &str) -> bool {
    match node_type {
        "header" => HEADER_PREFIX.is_match(content),
        "quote-block" => content.starts_with('>'),
        "code-block" => content.starts_with("```"),
        "ordered-list" => ORDERED_PREFIX.is_match(content),
        _ => false,
    }
}
