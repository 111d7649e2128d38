use core::fmt;

use crate::document::Document;
use crate::node::{ElementData, NodeData};
use indextree::NodeId;

const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source", "track",
    "wbr",
];

fn escape_text(text: &str, out: &mut String) {
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(ch),
        }
    }
}

fn escape_attr(value: &str, out: &mut String) {
    for ch in value.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(ch),
        }
    }
}

fn write_start_tag(element: &ElementData, out: &mut String) {
    out.push('<');
    out.push_str(&element.tag_name);
    for (name, value) in &element.attributes {
        out.push(' ');
        out.push_str(name);
        if !value.is_empty() {
            out.push_str("=\"");
            escape_attr(value, out);
            out.push('"');
        }
    }
    out.push('>');
}

fn write_node(document: &Document, node: NodeId, out: &mut String) {
    match document.data(node) {
        Some(NodeData::Document) => {
            for child in node.children(document.arena()) {
                write_node(document, child, out);
            }
        }
        Some(NodeData::Element(element)) => {
            write_start_tag(element, out);
            if VOID_ELEMENTS.contains(&element.tag_name.as_str()) {
                return;
            }
            for child in node.children(document.arena()) {
                write_node(document, child, out);
            }
            out.push_str("</");
            out.push_str(&element.tag_name);
            out.push('>');
        }
        Some(NodeData::Text(text)) => escape_text(text, out),
        Some(NodeData::Comment(comment)) => {
            out.push_str("<!--");
            out.push_str(comment);
            out.push_str("-->");
        }
        None => {}
    }
}

impl Document {
    /// Serialize `node` including its own tag.
    pub fn outer_html(&self, node: NodeId) -> String {
        let mut out = String::new();
        write_node(self, node, &mut out);
        out
    }

    /// Serialize the children of `node`.
    pub fn inner_html(&self, node: NodeId) -> String {
        let mut out = String::new();
        for child in node.children(self.arena()) {
            write_node(self, child, &mut out);
        }
        out
    }
}

impl fmt::Debug for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn fmt_node(
            document: &Document,
            node: NodeId,
            f: &mut fmt::Formatter<'_>,
            depth: usize,
        ) -> fmt::Result {
            let indent = "  ".repeat(depth);
            match document.data(node) {
                Some(NodeData::Document) => writeln!(f, "{indent}#document")?,
                Some(NodeData::Element(element)) => {
                    let mut tag = String::new();
                    write_start_tag(element, &mut tag);
                    writeln!(f, "{indent}{tag}")?;
                }
                Some(NodeData::Text(text)) => writeln!(f, "{indent}{text:?}")?,
                Some(NodeData::Comment(comment)) => writeln!(f, "{indent}<!--{comment}-->")?,
                None => return Ok(()),
            }
            for child in node.children(document.arena()) {
                fmt_node(document, child, f, depth + 1)?;
            }
            Ok(())
        }

        fmt_node(self, self.root(), f, 0)
    }
}
