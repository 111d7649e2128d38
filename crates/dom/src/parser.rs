//! HTML5 parsing using html5ever.
//!
//! html5ever builds an `RcDom`, which we immediately convert into the arena
//! representation so the resulting [`Document`] is `Send` and cheap to query.

use crate::document::Document;
use crate::node::{ElementData, NodeData};
use anyhow::Error;
use html5ever::tendril::TendrilSink as _;
use html5ever::{LocalName, Namespace, ParseOpts, QualName, parse_document, parse_fragment};
use indextree::NodeId;
use markup5ever_rcdom::{Handle, NodeData as RcNodeData, RcDom};

const HTML_NAMESPACE: &str = "http://www.w3.org/1999/xhtml";

/// Elements whose whitespace-only text children never render.
const WHITESPACE_INSENSITIVE: [&str; 7] = ["table", "thead", "tbody", "tfoot", "tr", "colgroup", "select"];

/// Parse a complete HTML document.
///
/// # Errors
/// Returns an error if the converted tree cannot be attached to the arena.
pub fn parse_html(html: &str) -> Result<Document, Error> {
    let dom: RcDom = parse_document(RcDom::default(), ParseOpts::default()).one(html);
    let mut document = Document::new();
    let root = document.root();
    for child in dom.document.children.borrow().iter() {
        convert_node(&mut document, child, root, "")?;
    }
    Ok(document)
}

/// Parse an HTML fragment as if it were assigned to the `innerHTML` of an
/// element named `context_tag`.
///
/// The fragment's top-level nodes become children of the returned document's
/// root. The context matters for table markup: `<tr>` only survives parsing
/// in a `tbody`/`table` context.
///
/// # Errors
/// Returns an error if the converted tree cannot be attached to the arena.
pub fn parse_html_fragment(html: &str, context_tag: &str) -> Result<Document, Error> {
    let context = QualName::new(
        None,
        Namespace::from(HTML_NAMESPACE),
        LocalName::from(context_tag.to_ascii_lowercase()),
    );
    let dom: RcDom =
        parse_fragment(RcDom::default(), ParseOpts::default(), context, Vec::new()).one(html);

    let mut document = Document::new();
    let root = document.root();
    // Fragment parsing wraps the result in a synthetic <html> element.
    for wrapper in dom.document.children.borrow().iter() {
        for child in wrapper.children.borrow().iter() {
            convert_node(&mut document, child, root, &context_tag.to_ascii_lowercase())?;
        }
    }
    Ok(document)
}

/// Convert an html5ever node (and its subtree) into arena nodes under `parent`.
///
/// `context_tag` stands in for the parent's tag when `parent` is the root.
fn convert_node(document: &mut Document, rc_node: &Handle, parent: NodeId, context_tag: &str) -> Result<(), Error> {
    match &rc_node.data {
        RcNodeData::Document => {
            for child in rc_node.children.borrow().iter() {
                convert_node(document, child, parent, context_tag)?;
            }
        }
        RcNodeData::Doctype { .. } | RcNodeData::ProcessingInstruction { .. } => {}
        RcNodeData::Text { contents } => {
            let text = contents.borrow().to_string();
            let parent_tag = document.tag_name(parent).unwrap_or(context_tag);
            if text.trim().is_empty() && WHITESPACE_INSENSITIVE.contains(&parent_tag) {
                return Ok(());
            }
            let node = document.create_node(NodeData::Text(text));
            document.append_child(parent, node)?;
        }
        RcNodeData::Comment { contents } => {
            let node = document.create_node(NodeData::Comment(contents.to_string()));
            document.append_child(parent, node)?;
        }
        RcNodeData::Element { name, attrs, .. } => {
            let mut element = ElementData::new(name.local.to_string());
            for attr in attrs.borrow().iter() {
                element.set_attribute(attr.name.local.to_string(), attr.value.to_string());
            }
            let node = document.create_node(NodeData::Element(element));
            document.append_child(parent, node)?;
            for child in rc_node.children.borrow().iter() {
                convert_node(document, child, node, context_tag)?;
            }
        }
    }
    Ok(())
}
