//! Arena-backed document tree with the queries and mutations the table
//! coordinator needs.

use crate::node::{ElementData, NodeData};
use crate::parser::{parse_html, parse_html_fragment};
use anyhow::{Error, anyhow};
use indextree::{Arena, Node, NodeId};
use log::{trace, warn};

/// A parsed HTML document.
///
/// Nodes are addressed by [`NodeId`]; ids stay stable for as long as the node
/// is attached, which lets callers keep side-tables keyed by element identity.
#[derive(Clone)]
pub struct Document {
    arena: Arena<NodeData>,
    root: NodeId,
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl Document {
    /// Create an empty document containing only the document node.
    pub fn new() -> Self {
        let mut arena = Arena::new();
        let root = arena.new_node(NodeData::Document);
        Self { arena, root }
    }

    /// Parse a full HTML page.
    ///
    /// # Errors
    /// Returns an error if the parsed tree cannot be built.
    pub fn parse(html: &str) -> Result<Self, Error> {
        parse_html(html)
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub(crate) fn arena(&self) -> &Arena<NodeData> {
        &self.arena
    }

    /// Whether `node` refers to a live node of this document.
    pub fn contains(&self, node: NodeId) -> bool {
        self.arena.get(node).is_some_and(|entry| !entry.is_removed())
    }

    pub fn data(&self, node: NodeId) -> Option<&NodeData> {
        self.arena
            .get(node)
            .filter(|entry| !entry.is_removed())
            .map(Node::get)
    }

    pub fn element(&self, node: NodeId) -> Option<&ElementData> {
        self.data(node).and_then(NodeData::as_element)
    }

    pub fn element_mut(&mut self, node: NodeId) -> Option<&mut ElementData> {
        self.arena
            .get_mut(node)
            .filter(|entry| !entry.is_removed())
            .and_then(|entry| entry.get_mut().as_element_mut())
    }

    pub fn tag_name(&self, node: NodeId) -> Option<&str> {
        self.element(node).map(|element| element.tag_name.as_str())
    }

    pub fn attribute(&self, node: NodeId, name: &str) -> Option<&str> {
        self.element(node).and_then(|element| element.attribute(name))
    }

    pub fn has_class(&self, node: NodeId, class: &str) -> bool {
        self.element(node).is_some_and(|element| element.has_class(class))
    }

    pub fn set_attribute(&mut self, node: NodeId, name: &str, value: &str) {
        if let Some(element) = self.element_mut(node) {
            element.set_attribute(name, value);
        }
    }

    pub fn remove_attribute(&mut self, node: NodeId, name: &str) {
        if let Some(element) = self.element_mut(node) {
            element.remove_attribute(name);
        }
    }

    pub fn add_class(&mut self, node: NodeId, class: &str) {
        if let Some(element) = self.element_mut(node) {
            element.add_class(class);
        }
    }

    pub fn remove_class(&mut self, node: NodeId, class: &str) {
        if let Some(element) = self.element_mut(node) {
            element.remove_class(class);
        }
    }

    // ----------------------------
    // Tree structure
    // ----------------------------

    /// Allocate a detached node.
    pub fn create_node(&mut self, data: NodeData) -> NodeId {
        self.arena.new_node(data)
    }

    pub fn create_element(&mut self, tag: &str) -> NodeId {
        self.create_node(NodeData::Element(ElementData::new(tag)))
    }

    /// Append `child` as the last child of `parent`.
    ///
    /// # Errors
    /// Returns an error if the append would create a cycle or either node was removed.
    pub fn append_child(&mut self, parent: NodeId, child: NodeId) -> Result<(), Error> {
        parent
            .checked_append(child, &mut self.arena)
            .map_err(|err| anyhow!("cannot append {child:?} to {parent:?}: {err}"))
    }

    pub fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.arena.get(node).and_then(Node::parent)
    }

    pub fn children(&self, node: NodeId) -> Vec<NodeId> {
        node.children(&self.arena).collect()
    }

    /// Element children only, skipping text and comments.
    pub fn element_children(&self, node: NodeId) -> Vec<NodeId> {
        node.children(&self.arena)
            .filter(|child| self.element(*child).is_some())
            .collect()
    }

    /// Detach `node` (and its subtree) from the tree and free it.
    pub fn remove(&mut self, node: NodeId) {
        if self.contains(node) {
            node.remove_subtree(&mut self.arena);
        }
    }

    /// Move `node` to the end of its parent's child list.
    ///
    /// # Errors
    /// Returns an error if `node` is detached or was removed.
    pub fn move_to_end(&mut self, node: NodeId) -> Result<(), Error> {
        let parent = self
            .parent(node)
            .ok_or_else(|| anyhow!("cannot move detached node {node:?}"))?;
        node.detach(&mut self.arena);
        self.append_child(parent, node)
    }

    /// Remove every child of `parent`.
    pub fn clear_children(&mut self, parent: NodeId) {
        for child in self.children(parent) {
            child.remove_subtree(&mut self.arena);
        }
    }

    /// Copy the children of `fragment`'s root under `parent`, returning the new
    /// top-level nodes in order.
    ///
    /// # Errors
    /// Returns an error if a copied node cannot be attached.
    pub fn adopt_fragment(&mut self, parent: NodeId, fragment: &Self) -> Result<Vec<NodeId>, Error> {
        let mut inserted = Vec::new();
        for child in fragment.children(fragment.root) {
            inserted.push(self.copy_subtree(fragment, child, parent)?);
        }
        Ok(inserted)
    }

    fn copy_subtree(&mut self, source: &Self, node: NodeId, parent: NodeId) -> Result<NodeId, Error> {
        let data = source
            .data(node)
            .cloned()
            .ok_or_else(|| anyhow!("fragment node {node:?} vanished while copying"))?;
        let copy = self.create_node(data);
        self.append_child(parent, copy)?;
        for child in source.children(node) {
            self.copy_subtree(source, child, copy)?;
        }
        Ok(copy)
    }

    /// Replace all children of `parent` with the parsed `html` fragment.
    ///
    /// The fragment is fully parsed before anything is removed, so a parse
    /// failure leaves the old children in place.
    ///
    /// # Errors
    /// Returns an error if `parent` is not an element or the fragment cannot be built.
    pub fn replace_children(&mut self, parent: NodeId, html: &str) -> Result<Vec<NodeId>, Error> {
        let context = self
            .tag_name(parent)
            .ok_or_else(|| anyhow!("replace_children target {parent:?} is not an element"))?
            .to_owned();
        let fragment = parse_html_fragment(html, &context)?;
        self.clear_children(parent);
        let inserted = self.adopt_fragment(parent, &fragment)?;
        trace!("replaced children of <{context}> with {} nodes", inserted.len());
        Ok(inserted)
    }

    /// Parse `html` in the context of `parent` and append the result.
    ///
    /// # Errors
    /// Returns an error if `parent` is not an element or the fragment cannot be built.
    pub fn append_html(&mut self, parent: NodeId, html: &str) -> Result<Vec<NodeId>, Error> {
        let context = self
            .tag_name(parent)
            .ok_or_else(|| anyhow!("append_html target {parent:?} is not an element"))?
            .to_owned();
        let fragment = parse_html_fragment(html, &context)?;
        self.adopt_fragment(parent, &fragment)
    }

    // ----------------------------
    // Queries
    // ----------------------------

    /// All elements in `scope` (inclusive) matching `predicate`, in document order.
    pub fn find_all<P>(&self, scope: NodeId, predicate: P) -> Vec<NodeId>
    where
        P: Fn(&ElementData) -> bool,
    {
        scope
            .descendants(&self.arena)
            .filter(|node| self.element(*node).is_some_and(&predicate))
            .collect()
    }

    /// First element in `scope` (inclusive) matching `predicate`.
    pub fn find_first<P>(&self, scope: NodeId, predicate: P) -> Option<NodeId>
    where
        P: Fn(&ElementData) -> bool,
    {
        scope
            .descendants(&self.arena)
            .find(|node| self.element(*node).is_some_and(&predicate))
    }

    pub fn find_by_class(&self, scope: NodeId, class: &str) -> Vec<NodeId> {
        self.find_all(scope, |element| element.has_class(class))
    }

    pub fn find_by_attribute(&self, scope: NodeId, name: &str) -> Vec<NodeId> {
        self.find_all(scope, |element| element.has_attribute(name))
    }

    pub fn find_by_attribute_value(&self, scope: NodeId, name: &str, value: &str) -> Option<NodeId> {
        self.find_first(scope, |element| element.attribute(name) == Some(value))
    }

    /// Nearest inclusive ancestor matching `predicate`.
    pub fn closest<P>(&self, node: NodeId, predicate: P) -> Option<NodeId>
    where
        P: Fn(&ElementData) -> bool,
    {
        node.ancestors(&self.arena)
            .find(|ancestor| self.element(*ancestor).is_some_and(&predicate))
    }

    pub fn closest_with_class(&self, node: NodeId, class: &str) -> Option<NodeId> {
        self.closest(node, |element| element.has_class(class))
    }

    /// Whether `node` is `ancestor` or lies inside it.
    pub fn is_inclusive_descendant(&self, node: NodeId, ancestor: NodeId) -> bool {
        node.ancestors(&self.arena).any(|candidate| candidate == ancestor)
    }

    /// Concatenated text of all descendant text nodes.
    pub fn text_content(&self, node: NodeId) -> String {
        let mut text = String::new();
        for descendant in node.descendants(&self.arena) {
            if let Some(NodeData::Text(content)) = self.data(descendant) {
                text.push_str(content);
            }
        }
        text
    }

    /// Replace the children of `node` with a single text node.
    pub fn set_text_content(&mut self, node: NodeId, text: &str) {
        self.clear_children(node);
        if text.is_empty() {
            return;
        }
        let text_node = self.create_node(NodeData::Text(text.to_owned()));
        if let Err(err) = self.append_child(node, text_node) {
            warn!("set_text_content failed: {err}");
        }
    }

    // ----------------------------
    // Form control state
    // ----------------------------

    /// Current value of a form control.
    ///
    /// Inputs fall back to their `value` attribute, textareas to their text,
    /// selects to their first selected option.
    pub fn value(&self, node: NodeId) -> String {
        let Some(element) = self.element(node) else {
            return String::new();
        };
        if let Some(value) = &element.value {
            return value.clone();
        }
        match element.tag_name.as_str() {
            "textarea" => self.text_content(node),
            "select" => self.selected_values(node).into_iter().next().unwrap_or_default(),
            _ => element.attribute("value").unwrap_or_default().to_owned(),
        }
    }

    /// Set the live value of an `input`/`textarea`, or select the matching
    /// option of a `select`.
    pub fn set_value(&mut self, node: NodeId, value: &str) {
        if self.tag_name(node) == Some("select") {
            self.select_values(node, &[value]);
            return;
        }
        if let Some(element) = self.element_mut(node) {
            element.value = Some(value.to_owned());
        }
    }

    /// Values of the selected options of a `select`, in document order.
    pub fn selected_values(&self, select: NodeId) -> Vec<String> {
        let options = self.find_all(select, |element| element.is("option"));
        let selected: Vec<NodeId> = options
            .iter()
            .copied()
            .filter(|option| self.option_selected(*option))
            .collect();
        let multiple = self.attribute(select, "multiple").is_some();
        let chosen = if selected.is_empty() {
            // A single select with nothing marked shows its first option.
            if multiple { Vec::new() } else { options.into_iter().take(1).collect() }
        } else if multiple {
            selected
        } else {
            selected.into_iter().take(1).collect()
        };
        chosen
            .into_iter()
            .map(|option| {
                self.attribute(option, "value")
                    .map_or_else(|| self.text_content(option), str::to_owned)
            })
            .collect()
    }

    fn option_selected(&self, option: NodeId) -> bool {
        self.element(option).is_some_and(|element| {
            element
                .checked
                .unwrap_or_else(|| element.has_attribute("selected"))
        })
    }

    /// Mark exactly the options whose value is in `values` as selected.
    ///
    /// Only the live selectedness changes; the `selected` attributes stay as
    /// the defaults a form reset returns to.
    pub fn select_values(&mut self, select: NodeId, values: &[&str]) {
        for option in self.find_all(select, |element| element.is("option")) {
            let option_value = self
                .attribute(option, "value")
                .map_or_else(|| self.text_content(option), str::to_owned);
            let selected = values.contains(&option_value.as_str());
            if let Some(element) = self.element_mut(option) {
                element.checked = Some(selected);
            }
        }
    }

    pub fn checked(&self, node: NodeId) -> bool {
        self.element(node)
            .is_some_and(|element| element.checked.unwrap_or_else(|| element.has_attribute("checked")))
    }

    pub fn set_checked(&mut self, node: NodeId, checked: bool) {
        if let Some(element) = self.element_mut(node) {
            element.checked = Some(checked);
        }
    }

    pub fn custom_validity(&self, node: NodeId) -> &str {
        self.element(node)
            .map_or("", |element| element.custom_validity.as_str())
    }

    pub fn set_custom_validity(&mut self, node: NodeId, message: &str) {
        if let Some(element) = self.element_mut(node) {
            message.clone_into(&mut element.custom_validity);
        }
    }

    /// Restore every control inside `form` to its markup default.
    pub fn reset_form(&mut self, form: NodeId) {
        for control in self.find_all(form, |element| {
            matches!(element.tag_name.as_str(), "input" | "textarea" | "select" | "option")
        }) {
            if let Some(element) = self.element_mut(control) {
                element.value = None;
                element.checked = None;
                element.custom_validity.clear();
            }
        }
    }
}
