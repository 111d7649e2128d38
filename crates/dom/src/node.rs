//! Node payloads stored in the document arena.

use smallvec::SmallVec;

/// Data stored for each DOM node.
#[derive(Debug, Clone, Default)]
pub enum NodeData {
    #[default]
    Document,
    Element(ElementData),
    Text(String),
    Comment(String),
}

impl NodeData {
    /// Borrow the element payload, if this is an element.
    pub fn as_element(&self) -> Option<&ElementData> {
        match self {
            Self::Element(element) => Some(element),
            _ => None,
        }
    }

    /// Mutably borrow the element payload, if this is an element.
    pub fn as_element_mut(&mut self) -> Option<&mut ElementData> {
        match self {
            Self::Element(element) => Some(element),
            _ => None,
        }
    }
}

/// Data for an element node.
///
/// Form controls carry live state (`value`, `checked`, `custom_validity`) next to
/// their markup attributes, the same split a browser keeps between the `value`
/// attribute and the `value` property.
#[derive(Debug, Clone, Default)]
pub struct ElementData {
    pub tag_name: String,
    pub attributes: SmallVec<[(String, String); 4]>,
    /// Live value of an `input`/`textarea`; `None` until the user edits it.
    pub value: Option<String>,
    /// Live checkedness of a checkbox/radio, or selectedness of an option;
    /// `None` until changed.
    pub checked: Option<bool>,
    /// Message set through `set_custom_validity`; empty means valid.
    pub custom_validity: String,
}

impl ElementData {
    pub fn new(tag_name: impl Into<String>) -> Self {
        Self {
            tag_name: tag_name.into().to_ascii_lowercase(),
            ..Self::default()
        }
    }

    /// Case-sensitive attribute lookup (html5ever lowercases names for us).
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn has_attribute(&self, name: &str) -> bool {
        self.attributes.iter().any(|(key, _)| key == name)
    }

    pub fn set_attribute(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        if let Some(slot) = self.attributes.iter_mut().find(|(key, _)| *key == name) {
            slot.1 = value;
        } else {
            self.attributes.push((name, value));
        }
    }

    pub fn remove_attribute(&mut self, name: &str) {
        self.attributes.retain(|(key, _)| key != name);
    }

    /// Whitespace-separated tokens of the `class` attribute.
    pub fn classes(&self) -> impl Iterator<Item = &str> {
        self.attribute("class")
            .unwrap_or_default()
            .split_ascii_whitespace()
    }

    pub fn has_class(&self, class: &str) -> bool {
        self.classes().any(|token| token == class)
    }

    pub fn add_class(&mut self, class: &str) {
        if self.has_class(class) {
            return;
        }
        let joined = match self.attribute("class") {
            Some(existing) if !existing.trim().is_empty() => format!("{} {class}", existing.trim()),
            _ => class.to_owned(),
        };
        self.set_attribute("class", joined);
    }

    pub fn remove_class(&mut self, class: &str) {
        if !self.has_class(class) {
            return;
        }
        let remaining: Vec<&str> = self.classes().filter(|token| *token != class).collect();
        let joined = remaining.join(" ");
        self.set_attribute("class", joined);
    }

    /// The `type` attribute of an input, lowercased; `text` when absent.
    pub fn input_type(&self) -> String {
        self.attribute("type")
            .map_or_else(|| String::from("text"), str::to_ascii_lowercase)
    }

    pub fn is(&self, tag: &str) -> bool {
        self.tag_name == tag
    }
}

#[cfg(test)]
mod tests {
    use super::ElementData;

    #[test]
    fn class_list_round_trips_through_attribute() {
        let mut element = ElementData::new("DIV");
        assert_eq!(element.tag_name, "div");

        element.add_class("iommi_query_error");
        element.add_class("hidden");
        element.add_class("hidden");
        assert_eq!(element.attribute("class"), Some("iommi_query_error hidden"));

        element.remove_class("hidden");
        assert!(element.has_class("iommi_query_error"));
        assert!(!element.has_class("hidden"));
    }

    #[test]
    fn set_attribute_replaces_existing_value() {
        let mut element = ElementData::new("input");
        element.set_attribute("value", "a");
        element.set_attribute("value", "b");
        assert_eq!(element.attributes.len(), 1);
        assert_eq!(element.attribute("value"), Some("b"));
        assert_eq!(element.input_type(), "text");

        element.remove_attribute("value");
        assert!(!element.has_attribute("value"));
    }
}
