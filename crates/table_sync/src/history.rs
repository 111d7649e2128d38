//! Address bar, session history and in-table navigation links.

use crate::coordinator::{ChannelOutcome, Coordinator};
use crate::events::SyncEvent;
use crate::form::TABLE_CONTAINER_CLASS;
use crate::query::Query;
use crate::refresh::RefreshContext;
use core::sync::atomic::{AtomicBool, Ordering};
use dom::{Document, NodeId};
use log::{debug, trace, warn};
use url::Url;

pub const PAGE_LINK_CLASS: &str = "iommi_page_link";
pub const SORT_HEADER_CLASS: &str = "iommi_sort_header";

/// State object stored with a history entry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HistoryState {
    /// Returning to this entry requires a full reload, unless the entry was
    /// just pushed by the navigation adapter itself.
    pub reload_on_user_action: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryEntry {
    pub url: Url,
    pub state: Option<HistoryState>,
}

/// What a `popstate` delivers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PopState {
    pub url: Url,
    pub state: Option<HistoryState>,
}

/// Session history of one browsing context.
#[derive(Debug, Clone)]
pub struct History {
    entries: Vec<HistoryEntry>,
    index: usize,
}

impl History {
    pub fn new(url: Url) -> Self {
        Self {
            entries: vec![HistoryEntry { url, state: None }],
            index: 0,
        }
    }

    fn current(&self) -> &HistoryEntry {
        // `index` always points into `entries`, which is never empty.
        &self.entries[self.index]
    }

    pub fn current_url(&self) -> &Url {
        &self.current().url
    }

    pub fn current_state(&self) -> Option<HistoryState> {
        self.current().state
    }

    pub fn query(&self) -> Query {
        Query::from_url(self.current_url())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub const fn index(&self) -> usize {
        self.index
    }

    /// Replace the current entry.
    pub fn replace_state(&mut self, url: Url, state: Option<HistoryState>) {
        self.entries[self.index] = HistoryEntry { url, state };
    }

    /// Replace the current entry with `{path}?{query}`, dropping any fragment.
    pub fn replace_query(&mut self, query: &Query) {
        let mut url = self.current_url().clone();
        url.set_query(Some(&query.serialize()));
        url.set_fragment(None);
        self.replace_state(url, None);
    }

    /// Add an entry after the current one, discarding any forward entries.
    pub fn push_state(&mut self, url: Url, state: Option<HistoryState>) {
        self.entries.truncate(self.index + 1);
        self.entries.push(HistoryEntry { url, state });
        self.index = self.entries.len() - 1;
    }

    pub fn back(&mut self) -> Option<PopState> {
        self.go(-1)
    }

    pub fn forward(&mut self) -> Option<PopState> {
        self.go(1)
    }

    /// Move `delta` entries; `None` if that leaves the history.
    pub fn go(&mut self, delta: isize) -> Option<PopState> {
        let target = self.index.checked_add_signed(delta)?;
        if delta == 0 || target >= self.entries.len() {
            return None;
        }
        self.index = target;
        let entry = self.current();
        Some(PopState {
            url: entry.url.clone(),
            state: entry.state,
        })
    }
}

/// Reaction to a `popstate`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PopstateAction {
    Reload,
    Ignore,
}

/// Tracks whether the latest history entry was pushed by the adapter itself.
#[derive(Debug)]
pub struct NavigationAdapter {
    pushed_by_user: AtomicBool,
}

impl Default for NavigationAdapter {
    fn default() -> Self {
        Self {
            pushed_by_user: AtomicBool::new(true),
        }
    }
}

impl NavigationAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn note_self_push(&self) {
        self.pushed_by_user.store(false, Ordering::SeqCst);
    }

    pub fn pushed_by_user(&self) -> bool {
        self.pushed_by_user.load(Ordering::SeqCst)
    }

    /// Marked entries force a reload, except for the first `popstate` after
    /// the adapter's own push, which only re-arms the flag.
    pub fn on_popstate(&self, state: Option<HistoryState>) -> PopstateAction {
        if !state.is_some_and(|state| state.reload_on_user_action) {
            return PopstateAction::Ignore;
        }
        if self.pushed_by_user.swap(true, Ordering::SeqCst) {
            PopstateAction::Reload
        } else {
            PopstateAction::Ignore
        }
    }
}

/// The pagination or sort link containing `clicked`, and its table container.
pub fn navigation_target(document: &Document, clicked: NodeId) -> Option<(NodeId, NodeId)> {
    let link = document.closest(clicked, |element| element.has_class(PAGE_LINK_CLASS)).or_else(|| {
        document
            .closest(clicked, |element| element.is("a"))
            .filter(|anchor| {
                document
                    .parent(*anchor)
                    .and_then(|parent| document.closest_with_class(parent, SORT_HEADER_CLASS))
                    .is_some()
            })
    })?;
    let container = document.closest_with_class(link, TABLE_CONTAINER_CLASS)?;
    Some((link, container))
}

/// Result of a click on a possibly navigational element.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkOutcome {
    /// Not a table link; default navigation should go ahead.
    NotHandled,
    /// Default navigation was prevented and the table refreshed in place.
    Handled(ChannelOutcome),
}

impl Coordinator {
    /// Handle a click on `clicked`.
    ///
    /// Pagination and sort links inside a table container push a history
    /// entry and refresh only that container with the link's query.
    pub async fn on_link_click(&self, clicked: NodeId) -> LinkOutcome {
        let target = {
            let document = self.inner.document.lock();
            navigation_target(&document, clicked).map(|(link, container)| {
                let href = document.attribute(link, "href").unwrap_or_default().to_owned();
                (link, container, href)
            })
        };
        let Some((link, container, href)) = target else {
            trace!("click on {clicked:?} is not a table link");
            return LinkOutcome::NotHandled;
        };

        let query = Query::from_href(&href);
        {
            let mut history = self.inner.history.lock();
            match history.current_url().join(&href) {
                Ok(url) => {
                    self.inner.navigation.note_self_push();
                    history.push_state(
                        url,
                        Some(HistoryState {
                            reload_on_user_action: true,
                        }),
                    );
                }
                Err(err) => warn!("cannot push history entry for {href:?}: {err}"),
            }
        }
        debug!("following table link {href:?}");
        let outcome = self
            .update_table_container(container, &query, RefreshContext::PageLink(link))
            .await;
        LinkOutcome::Handled(outcome)
    }

    /// React to the browser restoring a history entry.
    pub fn on_popstate(&self, state: Option<HistoryState>) -> PopstateAction {
        let action = self.inner.navigation.on_popstate(state);
        if action == PopstateAction::Reload {
            self.inner.events.emit(SyncEvent::ReloadRequested);
        }
        action
    }

    /// Step back in history and dispatch the resulting `popstate`.
    pub fn history_back(&self) -> Option<PopstateAction> {
        let popped = self.inner.history.lock().back()?;
        Some(self.on_popstate(popped.state))
    }

    /// Step forward in history and dispatch the resulting `popstate`.
    pub fn history_forward(&self) -> Option<PopstateAction> {
        let popped = self.inner.history.lock().forward()?;
        Some(self.on_popstate(popped.state))
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::expect_used, reason = "Test assertions")]

    use super::{History, HistoryState, NavigationAdapter, PopstateAction, navigation_target};
    use crate::query::Query;
    use dom::Document;
    use url::Url;

    fn marked() -> Option<HistoryState> {
        Some(HistoryState {
            reload_on_user_action: true,
        })
    }

    #[test]
    fn replace_query_keeps_entry_count() {
        let mut history = History::new(Url::parse("https://example.com/items/?a=1#top").expect("url"));
        history.replace_query(&Query::parse("q=bar"));
        assert_eq!(history.len(), 1);
        assert_eq!(history.current_url().as_str(), "https://example.com/items/?q=bar");
    }

    #[test]
    fn push_discards_forward_entries() {
        let mut history = History::new(Url::parse("https://example.com/").expect("url"));
        history.push_state(Url::parse("https://example.com/?page=2").expect("url"), marked());
        history.push_state(Url::parse("https://example.com/?page=3").expect("url"), marked());
        assert!(history.back().is_some());
        history.push_state(Url::parse("https://example.com/?page=9").expect("url"), marked());

        assert_eq!(history.len(), 3);
        assert!(history.forward().is_none());
        assert_eq!(history.query().get("page"), Some("9"));
    }

    #[test]
    fn popstate_after_own_push_only_rearms() {
        let adapter = NavigationAdapter::new();
        assert_eq!(adapter.on_popstate(marked()), PopstateAction::Reload);

        adapter.note_self_push();
        assert_eq!(adapter.on_popstate(None), PopstateAction::Ignore);
        assert!(!adapter.pushed_by_user());
        assert_eq!(adapter.on_popstate(marked()), PopstateAction::Ignore);
        assert_eq!(adapter.on_popstate(marked()), PopstateAction::Reload);
    }

    #[test]
    fn only_links_inside_containers_navigate() {
        let document = Document::parse(
            r#"<div class="iommi-table-container" id="c">
                <table><thead><tr><th class="iommi_sort_header"><a id="sort" href="?order=name">Name</a></th></tr></thead></table>
                <nav><a class="iommi_page_link" id="next" href="?page=2"><span id="inner">next</span></a></nav>
            </div>
            <a class="iommi_page_link" id="outside" href="?page=2">x</a>
            <a id="plain" href="/elsewhere">y</a>"#,
        )
        .expect("parses");
        let by_id = |id: &str| {
            document
                .find_by_attribute_value(document.root(), "id", id)
                .expect("element")
        };

        let (link, container) = navigation_target(&document, by_id("inner")).expect("page link");
        assert_eq!(link, by_id("next"));
        assert_eq!(container, by_id("c"));
        assert!(navigation_target(&document, by_id("sort")).is_some());
        assert!(navigation_target(&document, by_id("outside")).is_none());
        assert!(navigation_target(&document, by_id("plain")).is_none());
    }
}
