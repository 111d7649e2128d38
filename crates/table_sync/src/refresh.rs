//! Replacing a table container's content with freshly rendered markup.

use crate::cancel::RequestKind;
use crate::coordinator::{ChannelOutcome, Coordinator};
use crate::error::FetchError;
use crate::events::{ErrorAction, EventDetail, SyncEvent, Trigger};
use crate::form::{DefaultUrlBuilder, FilterForm, UrlBuilder};
use crate::query::Query;
use anyhow::{Error, anyhow};
use dom::{Document, NodeId};
use log::{debug, warn};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{Instrument as _, info_span};

/// What asked for a refresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshContext {
    /// The filter form owning the container submitted new values.
    FilterForm(NodeId),
    /// A pagination or sort link inside the container was followed.
    PageLink(NodeId),
    /// The host asked for the current address-bar state to be re-rendered.
    Reload,
}

impl RefreshContext {
    pub const fn trigger(self) -> Trigger {
        match self {
            Self::FilterForm(form) => Trigger::FilterForm(form),
            Self::PageLink(link) => Trigger::PageLink(link),
            Self::Reload => Trigger::Reload,
        }
    }
}

/// Body of a refresh or new-row response.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct HtmlResponse {
    pub html: String,
}

impl HtmlResponse {
    /// # Errors
    /// Returns an error when the body has no `html` string.
    pub fn from_json(value: serde_json::Value) -> Result<Self, Error> {
        serde_json::from_value(value).map_err(|err| anyhow!("invalid html response: {err}"))
    }
}

/// Refresh endpoint of `container`: the first descendant carrying `data-endpoint`.
pub fn container_endpoint(document: &Document, container: NodeId) -> Option<String> {
    document
        .find_by_attribute(container, "data-endpoint")
        .into_iter()
        .find(|node| *node != container)
        .and_then(|node| document.attribute(node, "data-endpoint"))
        .map(str::to_owned)
}

/// Replace every child of `container` with `html`.
///
/// # Errors
/// Returns an error if the fragment cannot be parsed; the old content is kept.
pub fn apply_refresh(document: &mut Document, container: NodeId, html: &str) -> Result<usize, Error> {
    document
        .replace_children(container, html)
        .map(|inserted| inserted.len())
}

/// Show a refresh failure in the form's error region.
pub fn write_form_error(document: &mut Document, form: &FilterForm, message: &str) {
    if let Some(region) = form.error_region(document) {
        document.set_text_content(region, message);
        document.remove_class(region, "hidden");
    }
}

impl Coordinator {
    /// Re-render the current address-bar state into `container`.
    pub async fn reload(&self, container: NodeId) -> ChannelOutcome {
        let query = self.current_query();
        self.update_table_container(container, &query, RefreshContext::Reload)
            .await
    }

    /// Fetch new markup for `container` and swap it in.
    ///
    /// Loading start and end events bracket the request on every path; an
    /// aborted request changes nothing else.
    pub async fn update_table_container(
        &self,
        container: NodeId,
        query: &Query,
        context: RefreshContext,
    ) -> ChannelOutcome {
        let endpoint = {
            let document = self.inner.document.lock();
            container_endpoint(&document, container)
        };
        let Some(endpoint) = endpoint else {
            warn!("table container {container:?} has no data-endpoint");
            return ChannelOutcome::Skipped;
        };
        let builder: Arc<dyn UrlBuilder> = match context {
            RefreshContext::FilterForm(form) => self
                .filter_form(form)
                .map_or_else(|| Arc::new(DefaultUrlBuilder) as Arc<dyn UrlBuilder>, |form| form.url_builder),
            RefreshContext::PageLink(_) | RefreshContext::Reload => Arc::new(DefaultUrlBuilder),
        };
        let detail = EventDetail {
            query: query.clone(),
            endpoint: endpoint.clone(),
            trigger: context.trigger(),
        };
        let span = info_span!("table_sync.refresh", endpoint = %endpoint);
        self.run_refresh(container, builder, context, detail)
            .instrument(span)
            .await
    }

    async fn run_refresh(
        &self,
        container: NodeId,
        builder: Arc<dyn UrlBuilder>,
        context: RefreshContext,
        detail: EventDetail,
    ) -> ChannelOutcome {
        let inner = &self.inner;
        inner.events.emit(SyncEvent::LoadingStart {
            target: container,
            detail: detail.clone(),
        });

        let url = builder.build(&self.current_url(), &detail.query, &detail.endpoint);
        let token = inner.canceller.begin(container, RequestKind::Refresh);
        let id = token.id();
        let result = match url {
            Ok(url) => token.run(inner.transport.get_json(&url)).await,
            Err(err) => Err(FetchError::Transport(err)),
        };
        let current = inner.canceller.is_current(container, RequestKind::Refresh, id);
        inner.canceller.finish(container, RequestKind::Refresh, id);

        let applied = result.and_then(|value| {
            if !current {
                return Err(FetchError::Aborted);
            }
            let response = HtmlResponse::from_json(value)?;
            let mut document = inner.document.lock();
            let inserted = apply_refresh(&mut document, container, &response.html)?;
            debug!("container {container:?} populated with {inserted} nodes");
            Ok(())
        });

        let outcome = match applied {
            Ok(()) => {
                inner.events.emit(SyncEvent::Populated {
                    target: container,
                    detail: detail.clone(),
                });
                let mut document = inner.document.lock();
                inner.widgets.rebind(&mut document, container);
                ChannelOutcome::Applied
            }
            Err(FetchError::Aborted) => {
                if inner.config.debug {
                    debug!("refresh of {container:?} aborted");
                }
                ChannelOutcome::Aborted
            }
            Err(FetchError::Transport(err)) => {
                warn!("refresh of {container:?} from {:?} failed: {err}", detail.endpoint);
                if let RefreshContext::FilterForm(form) = context
                    && let Some(filter_form) = self.filter_form(form)
                {
                    let mut document = inner.document.lock();
                    write_form_error(&mut document, &filter_form, &err.to_string());
                }
                inner.events.emit(SyncEvent::Error {
                    target: container,
                    action: ErrorAction::TablePopulation,
                    error: err.to_string(),
                    detail: detail.clone(),
                });
                ChannelOutcome::Failed
            }
        };

        inner.events.emit(SyncEvent::LoadingEnd {
            target: container,
            detail,
        });
        outcome
    }
}
