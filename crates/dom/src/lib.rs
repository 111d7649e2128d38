//! Host document model for the table synchronization engine.
//!
//! The coordinator never touches a browser directly: it reads and mutates this
//! arena-backed tree, which is built from server-rendered markup with html5ever
//! and serialized back when a host needs to render it.

#![allow(
    clippy::missing_docs_in_private_items,
    reason = "Internal implementation details don't need public documentation"
)]
#![allow(
    clippy::missing_inline_in_public_items,
    reason = "Inlining decisions left to compiler for this crate"
)]

pub mod document;
pub mod node;
pub mod parser;
mod printing;

pub use document::Document;
pub use indextree::NodeId;
pub use node::{ElementData, NodeData};
pub use parser::{parse_html, parse_html_fragment};
