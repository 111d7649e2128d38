//! Re-attaching auxiliary widgets to freshly inserted markup.
//!
//! Refreshes throw away every node inside a container, so widgets bound to
//! the old nodes are gone with them. After each insertion the affected
//! subtree is scanned again and every widget host is re-initialized.

use crate::form::FormSnapshot;
use crate::query::Query;
use anyhow::Error;
use dom::{Document, ElementData, NodeId};
use log::{trace, warn};
use serde_json::Value;
use std::sync::Arc;
use tracing::info_span;

pub const MULTI_SELECT_CLASS: &str = "select2_enhance";
pub const REORDERABLE_ATTRIBUTE: &str = "data-iommi-reorderable";
pub const REORDER_FIELD_SELECTOR_ATTRIBUTE: &str = "data-iommi-reorderable-field-selector";
pub const REORDER_HANDLE_SELECTOR_ATTRIBUTE: &str = "data-iommi-reorderable-handle-selector";
pub const DEFAULT_REORDER_FIELD_ATTRIBUTE: &str = "data-reordering-value";

/// Options handed to the multi-select widget for one element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MultiSelectOptions {
    pub placeholder: Option<String>,
    pub allow_clear: bool,
    pub multiple: bool,
    /// Query key the search term is sent under when choices are loaded remotely.
    pub choices_endpoint: Option<String>,
}

impl MultiSelectOptions {
    pub fn from_element(document: &Document, element: NodeId) -> Self {
        Self {
            placeholder: document.attribute(element, "data-placeholder").map(str::to_owned),
            allow_clear: true,
            multiple: document.attribute(element, "multiple").is_some(),
            choices_endpoint: document
                .attribute(element, "data-choices-endpoint")
                .filter(|endpoint| !endpoint.is_empty())
                .map(str::to_owned),
        }
    }
}

/// Query for a remote choices lookup of `element`.
///
/// The enclosing form's state is included unless the form opts out with
/// `data-select2-full-state` set to anything but `true`; a field can narrow
/// it to a JSON list of names with `data-select2-partial-state`.
pub fn choices_request_query(document: &Document, element: NodeId, term: &str, page: u32) -> Option<Query> {
    let endpoint = MultiSelectOptions::from_element(document, element).choices_endpoint?;
    let form = document.closest(element, |candidate| candidate.is("form"));

    let mut query = Query::new();
    if let Some(form) = form {
        let snapshot = FormSnapshot::read(document, form);
        let partial = document
            .attribute(element, "data-select2-partial-state")
            .and_then(|raw| match serde_json::from_str::<Vec<String>>(raw) {
                Ok(names) => Some(names),
                Err(err) => {
                    warn!("ignoring malformed data-select2-partial-state {raw:?}: {err}");
                    None
                }
            })
            .filter(|names| !names.is_empty());
        let full_state = document
            .attribute(form, "data-select2-full-state")
            .unwrap_or("true")
            == "true";
        for (name, value) in snapshot.pairs() {
            let included = partial
                .as_ref()
                .map_or(full_state, |names| names.contains(&name));
            if included {
                query.append(name, value);
            }
        }
    }
    query.append("page", page.max(1).to_string());
    query.append(endpoint, term);
    Some(query)
}

/// An attribute selector, `[name]` or `[name="value"]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeSelector {
    pub name: String,
    pub value: Option<String>,
}

impl AttributeSelector {
    pub fn present(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            value: None,
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        let inner = raw.trim().strip_prefix('[')?.strip_suffix(']')?;
        let (name, value) = match inner.split_once('=') {
            Some((name, value)) => {
                let value = value.trim();
                let unquoted = value
                    .strip_prefix('"')
                    .and_then(|rest| rest.strip_suffix('"'))
                    .or_else(|| value.strip_prefix('\'').and_then(|rest| rest.strip_suffix('\'')))
                    .unwrap_or(value);
                (name.trim(), Some(unquoted.to_owned()))
            }
            None => (inner.trim(), None),
        };
        if name.is_empty() || name.contains(char::is_whitespace) {
            return None;
        }
        Some(Self {
            name: name.to_ascii_lowercase(),
            value,
        })
    }

    pub fn matches(&self, element: &ElementData) -> bool {
        match (element.attribute(&self.name), &self.value) {
            (None, _) => false,
            (Some(_), None) => true,
            (Some(actual), Some(expected)) => actual == expected,
        }
    }
}

/// Options of one drag-reorder host, read from its attributes.
#[derive(Debug, Clone, PartialEq)]
pub struct ReorderOptions {
    /// Widget options rendered as the JSON value of `data-iommi-reorderable`.
    pub sortable: Option<Value>,
    pub handle_selector: Option<String>,
    /// Hidden fields carrying each row's position.
    pub field_selector: AttributeSelector,
}

impl ReorderOptions {
    pub fn from_element(document: &Document, element: NodeId) -> Self {
        let sortable = document
            .attribute(element, REORDERABLE_ATTRIBUTE)
            .filter(|raw| !raw.trim().is_empty())
            .and_then(|raw| match serde_json::from_str(raw) {
                Ok(options) => Some(options),
                Err(err) => {
                    warn!("ignoring malformed {REORDERABLE_ATTRIBUTE} options {raw:?}: {err}");
                    None
                }
            });
        let field_selector = document
            .attribute(element, REORDER_FIELD_SELECTOR_ATTRIBUTE)
            .and_then(|raw| {
                let parsed = AttributeSelector::parse(raw);
                if parsed.is_none() {
                    warn!("unsupported {REORDER_FIELD_SELECTOR_ATTRIBUTE} {raw:?}, using the default");
                }
                parsed
            })
            .unwrap_or_else(|| AttributeSelector::present(DEFAULT_REORDER_FIELD_ATTRIBUTE));
        Self {
            sortable,
            handle_selector: document
                .attribute(element, REORDER_HANDLE_SELECTOR_ATTRIBUTE)
                .filter(|selector| !selector.is_empty())
                .map(str::to_owned),
            field_selector,
        }
    }
}

/// A multi-select enhancement library.
///
/// Initialization must be idempotent: hosts are initialized twice per scan.
pub trait MultiSelectWidget: Send + Sync {
    fn init(&self, document: &mut Document, element: NodeId, options: &MultiSelectOptions);
}

/// A drag-and-drop row reordering library.
pub trait ReorderWidget: Send + Sync {
    fn bind(&self, document: &mut Document, element: NodeId, options: &ReorderOptions);
}

/// Widget implementation that does nothing, for headless hosts.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopWidget;

impl MultiSelectWidget for NoopWidget {
    fn init(&self, _document: &mut Document, _element: NodeId, _options: &MultiSelectOptions) {}
}

impl ReorderWidget for NoopWidget {
    fn bind(&self, _document: &mut Document, _element: NodeId, _options: &ReorderOptions) {}
}

/// How many widget initializations one scan performed.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RebindReport {
    pub multi_select_inits: usize,
    pub reorder_binds: usize,
}

#[derive(Clone)]
pub struct WidgetRebinder {
    multi_select: Arc<dyn MultiSelectWidget>,
    reorder: Arc<dyn ReorderWidget>,
}

impl Default for WidgetRebinder {
    fn default() -> Self {
        Self::new(Arc::new(NoopWidget), Arc::new(NoopWidget))
    }
}

impl WidgetRebinder {
    pub fn new(multi_select: Arc<dyn MultiSelectWidget>, reorder: Arc<dyn ReorderWidget>) -> Self {
        Self {
            multi_select,
            reorder,
        }
    }

    /// Initialize every widget host inside `scope` (inclusive).
    pub fn rebind(&self, document: &mut Document, scope: NodeId) -> RebindReport {
        let _span = info_span!("table_sync.rebind").entered();
        let mut report = RebindReport::default();

        let multi_selects = document.find_by_class(scope, MULTI_SELECT_CLASS);
        // Second pass lets the widget settle after the host resized on first activation.
        for _pass in 0..2 {
            for element in &multi_selects {
                let options = MultiSelectOptions::from_element(document, *element);
                self.multi_select.init(document, *element, &options);
                report.multi_select_inits += 1;
            }
        }

        for element in document.find_by_attribute(scope, REORDERABLE_ATTRIBUTE) {
            let options = ReorderOptions::from_element(document, element);
            self.reorder.bind(document, element, &options);
            renumber_host(document, element, &options.field_selector);
            report.reorder_binds += 1;
        }

        trace!(
            "rebound {} multi-select and {} reorder hosts",
            multi_selects.len(),
            report.reorder_binds
        );
        report
    }
}

/// Renumber the position fields of every reorder host around `scope`, in
/// document order starting at 0.
///
/// The host is the nearest inclusive ancestor marked reorderable, otherwise
/// every reorderable element inside `scope`.
pub fn recompute_order(document: &mut Document, scope: NodeId) -> usize {
    let hosts = document
        .closest(scope, |element| element.has_attribute(REORDERABLE_ATTRIBUTE))
        .map_or_else(|| document.find_by_attribute(scope, REORDERABLE_ATTRIBUTE), |host| vec![host]);
    hosts
        .into_iter()
        .map(|host| {
            let selector = ReorderOptions::from_element(document, host).field_selector;
            renumber_host(document, host, &selector)
        })
        .sum()
}

fn renumber_host(document: &mut Document, host: NodeId, selector: &AttributeSelector) -> usize {
    let fields = document.find_all(host, |element| selector.matches(element));
    for (position, field) in fields.iter().enumerate() {
        let index = position.to_string();
        document.set_attribute(*field, "value", &index);
        document.set_value(*field, &index);
    }
    fields.len()
}

/// Reorder `rows` to match the given order and renumber their indices.
///
/// Rows must share a parent; the parent's other children keep their place
/// ahead of the moved rows.
///
/// # Errors
/// Returns an error if a row is detached from the tree.
pub fn apply_reorder(document: &mut Document, rows: &[NodeId]) -> Result<usize, Error> {
    let Some(parent) = rows.first().and_then(|row| document.parent(*row)) else {
        return Ok(0);
    };
    for row in rows {
        document.move_to_end(*row)?;
    }
    let scope = if document
        .closest(parent, |element| element.has_attribute(REORDERABLE_ATTRIBUTE))
        .is_some()
    {
        parent
    } else {
        document
            .closest(parent, |element| element.is("table"))
            .unwrap_or(parent)
    };
    Ok(recompute_order(document, scope))
}
