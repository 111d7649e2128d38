//! Filter forms: reading their declared fields and current values out of the
//! document, and building request URLs for them.

use crate::query::Query;
use anyhow::{Error, anyhow};
use dom::{Document, NodeId};
use std::sync::Arc;
use url::Url;

pub const FILTER_FORM_CLASS: &str = "iommi_filter";
pub const TABLE_CONTAINER_CLASS: &str = "iommi-table-container";
pub const ERROR_REGION_CLASS: &str = "iommi_query_error";
pub const DEFAULT_PAGE_KEY: &str = "page";
pub const PAGE_PARAMETER_ATTRIBUTE: &str = "data-iommi-page-parameter";

/// A single submitted control value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    Text(String),
    /// File inputs only contribute their file name and never reach a query.
    File(String),
}

impl FieldValue {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Text(text) | Self::File(text) => text,
        }
    }
}

/// Form data as the browser would submit it, in document order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FormSnapshot {
    entries: Vec<(String, FieldValue)>,
}

impl FormSnapshot {
    pub fn from_entries(entries: Vec<(String, FieldValue)>) -> Self {
        Self { entries }
    }

    /// Collect the successful controls of `form`.
    ///
    /// Disabled and unnamed controls are skipped, unchecked checkboxes and
    /// radios contribute nothing, and buttons are never part of the data.
    pub fn read(document: &Document, form: NodeId) -> Self {
        let mut entries = Vec::new();
        for control in named_controls(document, form) {
            let Some(element) = document.element(control) else {
                continue;
            };
            if element.has_attribute("disabled") {
                continue;
            }
            let Some(name) = element.attribute("name").map(str::to_owned) else {
                continue;
            };
            match element.tag_name.as_str() {
                "select" => {
                    for value in document.selected_values(control) {
                        entries.push((name.clone(), FieldValue::Text(value)));
                    }
                }
                "textarea" => entries.push((name, FieldValue::Text(document.value(control)))),
                _ => match element.input_type().as_str() {
                    "submit" | "button" | "reset" | "image" => {}
                    "checkbox" | "radio" => {
                        if document.checked(control) {
                            let value = element.attribute("value").unwrap_or("on").to_owned();
                            entries.push((name, FieldValue::Text(value)));
                        }
                    }
                    "file" => entries.push((name, FieldValue::File(document.value(control)))),
                    _ => entries.push((name, FieldValue::Text(document.value(control)))),
                },
            }
        }
        Self { entries }
    }

    pub fn entries(&self) -> &[(String, FieldValue)] {
        &self.entries
    }

    /// Name/value pairs with files rendered as their file name.
    pub fn pairs(&self) -> Vec<(String, String)> {
        self.entries
            .iter()
            .map(|(name, value)| (name.clone(), value.as_str().to_owned()))
            .collect()
    }
}

fn named_controls(document: &Document, form: NodeId) -> Vec<NodeId> {
    document.find_all(form, |element| {
        matches!(element.tag_name.as_str(), "input" | "select" | "textarea")
            && element.has_attribute("name")
    })
}

/// Builds the URL a request is sent to from the page URL, the query and the
/// endpoint marker.
pub trait UrlBuilder: Send + Sync {
    /// # Errors
    /// Returns an error if the resulting URL is not valid.
    fn build(&self, base: &Url, query: &Query, endpoint: &str) -> Result<Url, Error>;
}

/// `{page_path}?{query}&{endpoint}`, or `{page_path}?{endpoint}` for an empty query.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultUrlBuilder;

impl UrlBuilder for DefaultUrlBuilder {
    fn build(&self, base: &Url, query: &Query, endpoint: &str) -> Result<Url, Error> {
        let serialized = query.serialize();
        let search = match (serialized.is_empty(), endpoint.is_empty()) {
            (true, _) => format!("?{endpoint}"),
            (false, true) => format!("?{serialized}"),
            (false, false) => format!("?{serialized}&{endpoint}"),
        };
        base.join(&format!("{}{search}", base.path()))
            .map_err(|err| anyhow!("cannot build request URL for {endpoint:?}: {err}"))
    }
}

/// An enhanced `<form class="iommi_filter">`.
#[derive(Clone)]
pub struct FilterForm {
    pub node: NodeId,
    pub url_builder: Arc<dyn UrlBuilder>,
}

impl FilterForm {
    pub fn new(node: NodeId) -> Self {
        Self {
            node,
            url_builder: Arc::new(DefaultUrlBuilder),
        }
    }

    #[must_use]
    pub fn with_url_builder(mut self, url_builder: Arc<dyn UrlBuilder>) -> Self {
        self.url_builder = url_builder;
        self
    }

    /// Every filter form in the document, in document order.
    pub fn discover(document: &Document) -> Vec<NodeId> {
        document.find_all(document.root(), |element| {
            element.is("form") && element.has_class(FILTER_FORM_CLASS)
        })
    }

    pub fn table_id<'doc>(&self, document: &'doc Document) -> Option<&'doc str> {
        document.attribute(self.node, "data-iommi-id-of-table")
    }

    /// The table this form filters, looked up by `data-iommi-id`.
    pub fn table(&self, document: &Document) -> Option<NodeId> {
        let id = self.table_id(document)?;
        document.find_by_attribute_value(document.root(), "data-iommi-id", id)
    }

    pub fn container(&self, document: &Document) -> Option<NodeId> {
        let table = self.table(document)?;
        document.closest_with_class(table, TABLE_CONTAINER_CLASS)
    }

    /// Names of every control the form declares, duplicates included.
    pub fn declared_fields(&self, document: &Document) -> Vec<String> {
        named_controls(document, self.node)
            .into_iter()
            .filter_map(|control| document.attribute(control, "name").map(str::to_owned))
            .collect()
    }

    pub fn snapshot(&self, document: &Document) -> FormSnapshot {
        FormSnapshot::read(document, self.node)
    }

    /// Validation endpoint marker, always with a leading `/`.
    pub fn validation_endpoint(&self, document: &Document) -> Option<String> {
        let endpoint = document.attribute(self.node, "data-iommi-errors")?;
        if endpoint.starts_with('/') {
            Some(endpoint.to_owned())
        } else {
            Some(format!("/{endpoint}"))
        }
    }

    /// Query key holding the page position of the associated table, as
    /// announced by the paginator inside its container.
    pub fn page_key(&self, document: &Document) -> String {
        self.container(document)
            .and_then(|container| {
                document.find_first(container, |element| {
                    element.has_attribute(PAGE_PARAMETER_ATTRIBUTE)
                })
            })
            .and_then(|paginator| document.attribute(paginator, PAGE_PARAMETER_ATTRIBUTE))
            .filter(|key| !key.is_empty())
            .unwrap_or(DEFAULT_PAGE_KEY)
            .to_owned()
    }

    /// The `.iommi_query_error` element next to the form.
    pub fn error_region(&self, document: &Document) -> Option<NodeId> {
        let scope = document.parent(self.node).unwrap_or(self.node);
        document.find_by_class(scope, ERROR_REGION_CLASS).into_iter().next()
    }

    pub fn field(&self, document: &Document, name: &str) -> Option<NodeId> {
        named_controls(document, self.node)
            .into_iter()
            .find(|control| document.attribute(*control, "name") == Some(name))
    }
}
