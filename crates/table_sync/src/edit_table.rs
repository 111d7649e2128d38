//! Client-side row insertion for editable tables.
//!
//! New rows are rendered by the server from a template row whose primary key
//! is the literal `#sentinel#`. Each inserted row gets a fresh negative
//! "virtual" key so the server can tell new rows apart on submit.

use crate::cancel::RequestKind;
use crate::coordinator::Coordinator;
use crate::error::FetchError;
use crate::events::{ErrorAction, EventDetail, SyncEvent, Trigger};
use crate::form::{DefaultUrlBuilder, UrlBuilder as _};
use crate::rebind::recompute_order;
use crate::refresh::HtmlResponse;
use anyhow::{Error, anyhow};
use dashmap::DashMap;
use dom::{Document, NodeId};
use log::{debug, warn};
use tracing::{Instrument as _, info_span};

pub const SENTINEL: &str = "#sentinel#";
pub const NEW_ROW_ENDPOINT_ATTRIBUTE: &str = "data-new-row-endpoint";
pub const NEXT_VIRTUAL_PK_ATTRIBUTE: &str = "data-next-virtual-pk";

pub fn substitute_sentinel(html: &str, virtual_id: i64) -> String {
    html.replace(SENTINEL, &virtual_id.to_string())
}

/// Result of an add-row request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NewRowOutcome {
    Inserted { row: NodeId, virtual_id: i64 },
    Aborted,
    Failed,
    /// The table is not editable.
    Skipped,
}

/// Per-table counter of the last virtual key handed out.
#[derive(Default)]
pub struct VirtualRowIds {
    last_used: DashMap<NodeId, i64>,
}

impl VirtualRowIds {
    pub fn new() -> Self {
        Self::default()
    }

    /// The virtual key the next row of `table` would get: `-1`, `-2`, ...
    ///
    /// A table rendered with `data-next-virtual-pk` continues from there.
    pub fn peek(&self, document: &Document, table: NodeId) -> i64 {
        self.last_used
            .get(&table)
            .map_or_else(|| seed(document, table), |last| *last)
            .saturating_sub(1)
    }

    /// Record `id` as used and keep the table's attribute pointing at the following key.
    pub fn commit(&self, document: &mut Document, table: NodeId, id: i64) {
        self.last_used
            .entry(table)
            .and_modify(|last| *last = (*last).min(id))
            .or_insert(id);
        document.set_attribute(table, NEXT_VIRTUAL_PK_ATTRIBUTE, &id.saturating_sub(1).to_string());
    }
}

fn seed(document: &Document, table: NodeId) -> i64 {
    document
        .attribute(table, NEXT_VIRTUAL_PK_ATTRIBUTE)
        .and_then(|raw| raw.trim().parse::<i64>().ok())
        .map_or(0, |next| next.saturating_add(1))
        .min(0)
}

/// Append the rendered row(s) to the table body and tag the first row with its key.
///
/// # Errors
/// Returns an error if the table has no body or the markup yields no row.
pub fn insert_row(document: &mut Document, table: NodeId, html: &str, virtual_id: i64) -> Result<NodeId, Error> {
    let tbody = document
        .find_first(table, |element| element.is("tbody"))
        .ok_or_else(|| anyhow!("editable table {table:?} has no tbody"))?;
    let inserted = document.append_html(tbody, &substitute_sentinel(html, virtual_id))?;
    let row = inserted
        .iter()
        .copied()
        .find(|node| document.tag_name(*node) == Some("tr"))
        .ok_or_else(|| {
            for node in &inserted {
                document.remove(*node);
            }
            anyhow!("new row response for {table:?} contains no <tr>")
        })?;
    document.set_attribute(row, "data-pk", &virtual_id.to_string());
    Ok(row)
}

impl Coordinator {
    /// Fetch a blank row for the editable `table` and append it.
    pub async fn add_row(&self, table: NodeId) -> NewRowOutcome {
        let endpoint = {
            let document = self.inner.document.lock();
            document
                .attribute(table, NEW_ROW_ENDPOINT_ATTRIBUTE)
                .map(str::to_owned)
        };
        let Some(endpoint) = endpoint else {
            warn!("add_row on {table:?} without {NEW_ROW_ENDPOINT_ATTRIBUTE}");
            return NewRowOutcome::Skipped;
        };
        let detail = EventDetail {
            query: self.current_query(),
            endpoint: endpoint.clone(),
            trigger: Trigger::NewRow(table),
        };
        let span = info_span!("table_sync.new_row", endpoint = %endpoint);
        self.run_add_row(table, detail).instrument(span).await
    }

    async fn run_add_row(&self, table: NodeId, detail: EventDetail) -> NewRowOutcome {
        let inner = &self.inner;
        inner.events.emit(SyncEvent::LoadingStart {
            target: table,
            detail: detail.clone(),
        });

        let url = DefaultUrlBuilder.build(&self.current_url(), &detail.query, &detail.endpoint);
        let token = inner.canceller.begin(table, RequestKind::NewRow);
        let id = token.id();
        let result = match url {
            Ok(url) => token.run(inner.transport.get_json(&url)).await,
            Err(err) => Err(FetchError::Transport(err)),
        };
        let current = inner.canceller.is_current(table, RequestKind::NewRow, id);
        inner.canceller.finish(table, RequestKind::NewRow, id);

        let inserted = result.and_then(|value| {
            if !current {
                return Err(FetchError::Aborted);
            }
            let response = HtmlResponse::from_json(value)?;
            let mut document = inner.document.lock();
            let virtual_id = inner.virtual_rows.peek(&document, table);
            let row = insert_row(&mut document, table, &response.html, virtual_id)?;
            inner.virtual_rows.commit(&mut document, table, virtual_id);
            inner.widgets.rebind(&mut document, row);
            recompute_order(&mut document, table);
            Ok((row, virtual_id))
        });

        let outcome = match inserted {
            Ok((row, virtual_id)) => {
                debug!("inserted virtual row {virtual_id} into {table:?}");
                inner.events.emit(SyncEvent::RowInserted {
                    table,
                    row,
                    virtual_id,
                });
                NewRowOutcome::Inserted { row, virtual_id }
            }
            Err(FetchError::Aborted) => NewRowOutcome::Aborted,
            Err(FetchError::Transport(err)) => {
                warn!("new row for {table:?} failed: {err}");
                inner.events.emit(SyncEvent::Error {
                    target: table,
                    action: ErrorAction::NewRow,
                    error: err.to_string(),
                    detail: detail.clone(),
                });
                NewRowOutcome::Failed
            }
        };
        inner.events.emit(SyncEvent::LoadingEnd {
            target: table,
            detail,
        });
        outcome
    }

    /// Remove `row` from its table and renumber the remaining rows.
    pub fn remove_row(&self, row: NodeId) -> bool {
        let mut document = self.inner.document.lock();
        if !document.contains(row) {
            return false;
        }
        let table = document.closest(row, |element| element.is("table"));
        document.remove(row);
        if let Some(table) = table {
            recompute_order(&mut document, table);
        }
        true
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::expect_used, reason = "Test assertions")]

    use super::{VirtualRowIds, insert_row, substitute_sentinel};
    use dom::{Document, NodeId};

    fn allocate(ids: &VirtualRowIds, document: &mut Document, table: NodeId) -> i64 {
        let id = ids.peek(document, table);
        ids.commit(document, table, id);
        id
    }

    fn table_document(next_pk: Option<&str>) -> Document {
        let attribute = next_pk.map_or_else(String::new, |value| format!(r#" data-next-virtual-pk="{value}""#));
        Document::parse(&format!(
            r#"<table id="t" data-new-row-endpoint="/new"{attribute}><tbody></tbody></table>"#
        ))
        .expect("parses")
    }

    #[test]
    fn virtual_ids_count_down_from_minus_one() {
        let mut document = table_document(Some("-1"));
        let table = document
            .find_by_attribute_value(document.root(), "id", "t")
            .expect("table");
        let ids = VirtualRowIds::new();

        assert_eq!(allocate(&ids, &mut document, table), -1);
        assert_eq!(allocate(&ids, &mut document, table), -2);
        assert_eq!(document.attribute(table, "data-next-virtual-pk"), Some("-3"));
    }

    #[test]
    fn rendered_next_key_is_respected() {
        let mut document = table_document(Some("-5"));
        let table = document
            .find_by_attribute_value(document.root(), "id", "t")
            .expect("table");
        assert_eq!(allocate(&VirtualRowIds::new(), &mut document, table), -5);

        let mut bare = table_document(None);
        let bare_table = bare
            .find_by_attribute_value(bare.root(), "id", "t")
            .expect("table");
        assert_eq!(allocate(&VirtualRowIds::new(), &mut bare, bare_table), -1);
    }

    #[test]
    fn inserted_row_has_sentinel_replaced() {
        let mut document = table_document(None);
        let table = document
            .find_by_attribute_value(document.root(), "id", "t")
            .expect("table");
        let html = r#"<tr><td><input name="columns/#sentinel#/name"></td></tr>"#;

        let row = insert_row(&mut document, table, html, -1).expect("inserted");

        assert_eq!(document.attribute(row, "data-pk"), Some("-1"));
        assert!(
            document
                .find_by_attribute_value(row, "name", "columns/-1/name")
                .is_some()
        );
        assert_eq!(substitute_sentinel("#sentinel#-#sentinel#", -2), "-2--2");
    }

    #[test]
    fn rejected_markup_does_not_consume_a_key() {
        let mut document = table_document(Some("-1"));
        let table = document
            .find_by_attribute_value(document.root(), "id", "t")
            .expect("table");
        let ids = VirtualRowIds::new();

        let candidate = ids.peek(&document, table);
        assert!(insert_row(&mut document, table, "<p>no row here</p>", candidate).is_err());
        assert_eq!(ids.peek(&document, table), -1);
        assert_eq!(document.attribute(table, "data-next-virtual-pk"), Some("-1"));

        let row = insert_row(&mut document, table, "<tr><td></td></tr>", candidate).expect("inserted");
        ids.commit(&mut document, table, candidate);
        assert_eq!(document.attribute(row, "data-pk"), Some("-1"));
        assert_eq!(ids.peek(&document, table), -2);
        assert_eq!(document.attribute(table, "data-next-virtual-pk"), Some("-2"));
    }
}
