//! The page-level coordinator tying forms, containers, history and requests together.

use crate::cancel::{RequestCanceller, RequestKind};
use crate::config::SyncConfig;
use crate::debounce::Debouncer;
use crate::edit_table::VirtualRowIds;
use crate::error::ConfigError;
use crate::events::{EventBus, SyncEvent};
use crate::form::{FilterForm, TABLE_CONTAINER_CLASS, UrlBuilder};
use crate::gate::ChangeGates;
use crate::history::{History, NavigationAdapter};
use crate::query::{Query, check_field_ownership, compute_next_query};
use crate::rebind::{MULTI_SELECT_CLASS, WidgetRebinder, apply_reorder};
use crate::refresh::RefreshContext;
use crate::transport::Transport;
use anyhow::Error;
use dashmap::DashMap;
use dom::{Document, NodeId};
use log::{debug, info, trace, warn};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::broadcast;
use url::Url;

/// How a validation or refresh request ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelOutcome {
    Applied,
    /// Superseded or timed out; nothing was changed or reported.
    Aborted,
    Failed,
    /// Nothing to request, e.g. no endpoint configured.
    Skipped,
}

/// Form-level DOM event that reached the coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputKind {
    Input,
    Change,
    SwitchMode,
    Reset,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputOutcome {
    /// Form data equals the last accepted snapshot.
    Unchanged,
    /// The event does not start a cycle.
    Ignored,
    /// A free-text edit was deferred behind the debounce period.
    Scheduled,
    Populated {
        validation: ChannelOutcome,
        refresh: ChannelOutcome,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ControlKind {
    FreeText,
    File,
    Discrete,
}

fn control_kind(document: &Document, target: NodeId) -> ControlKind {
    let Some(element) = document.element(target) else {
        return ControlKind::Discrete;
    };
    match element.tag_name.as_str() {
        "textarea" => ControlKind::FreeText,
        "input" => match element.input_type().as_str() {
            "text" | "search" => ControlKind::FreeText,
            "file" => ControlKind::File,
            _ => ControlKind::Discrete,
        },
        _ => ControlKind::Discrete,
    }
}

pub(crate) struct Inner {
    pub(crate) config: SyncConfig,
    pub(crate) document: Mutex<Document>,
    pub(crate) history: Mutex<History>,
    pub(crate) navigation: NavigationAdapter,
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) canceller: RequestCanceller,
    pub(crate) events: EventBus,
    pub(crate) forms: DashMap<NodeId, FilterForm>,
    pub(crate) gates: ChangeGates,
    pub(crate) debouncers: DashMap<NodeId, Arc<Debouncer>>,
    pub(crate) widgets: WidgetRebinder,
    pub(crate) virtual_rows: VirtualRowIds,
}

/// Keeps the tables of one page in sync with the server.
///
/// Cloning is cheap and every clone drives the same page.
#[derive(Clone)]
pub struct Coordinator {
    pub(crate) inner: Arc<Inner>,
}

impl Coordinator {
    pub fn new(document: Document, page_url: Url, transport: Arc<dyn Transport>, config: SyncConfig) -> Self {
        Self::with_widgets(document, page_url, transport, config, WidgetRebinder::default())
    }

    pub fn with_widgets(
        document: Document,
        page_url: Url,
        transport: Arc<dyn Transport>,
        config: SyncConfig,
        widgets: WidgetRebinder,
    ) -> Self {
        let canceller = RequestCanceller::new(config.request_timeout());
        let events = EventBus::with_capacity(config.event_capacity.max(1));
        Self {
            inner: Arc::new(Inner {
                config,
                document: Mutex::new(document),
                history: Mutex::new(History::new(page_url)),
                navigation: NavigationAdapter::new(),
                transport,
                canceller,
                events,
                forms: DashMap::new(),
                gates: ChangeGates::new(),
                debouncers: DashMap::new(),
                widgets,
                virtual_rows: VirtualRowIds::new(),
            }),
        }
    }

    /// Enhance every filter form and table container on the page.
    ///
    /// # Errors
    /// Returns [`ConfigError::OverlappingFieldNames`] when two filter forms
    /// declare the same field; the page is left untouched in that case.
    pub fn init(&self) -> Result<(), ConfigError> {
        let mut document = self.inner.document.lock();
        let forms: Vec<FilterForm> = FilterForm::discover(&document)
            .into_iter()
            .map(FilterForm::new)
            .collect();
        let declared: Vec<(String, Vec<String>)> = forms
            .iter()
            .map(|form| {
                let label = form
                    .table_id(&document)
                    .map_or_else(|| format!("{:?}", form.node), str::to_owned);
                (label, form.declared_fields(&document))
            })
            .collect();
        check_field_ownership(
            declared
                .iter()
                .map(|(label, fields)| (label.as_str(), fields.as_slice())),
        )
        .inspect_err(|err| warn!("refusing to enhance page: {err}"))?;

        self.inner.events.emit(SyncEvent::InitStart);
        let form_count = forms.len();
        for form in forms {
            self.enhance_filter_form(&mut document, form);
        }
        let root = document.root();
        let containers = document.find_by_class(root, TABLE_CONTAINER_CLASS);
        self.inner.widgets.rebind(&mut document, root);
        drop(document);
        info!(
            "enhanced {form_count} filter forms and {} table containers",
            containers.len()
        );
        self.inner.events.emit(SyncEvent::InitEnd);
        Ok(())
    }

    fn enhance_filter_form(&self, document: &mut Document, form: FilterForm) {
        let node = form.node;
        document.set_attribute(node, "autocomplete", "off");
        for button in document.find_by_attribute(node, "data-iommi-filter-button") {
            document.remove(button);
        }
        if form.container(document).is_none() {
            warn!(
                "filter form {node:?} targets table {:?} which is not inside a table container",
                form.table_id(document)
            );
        }
        self.inner.gates.prime(node, form.snapshot(document).pairs());
        self.inner
            .debouncers
            .entry(node)
            .or_insert_with(|| Arc::new(Debouncer::new(self.inner.config.debounce())));
        self.inner.forms.entry(node).or_insert(form);
        trace!("enhanced filter form {node:?}");
    }

    /// Replace the URL builder used for `form`'s validation and refresh requests.
    pub fn set_url_builder(&self, form: NodeId, builder: Arc<dyn UrlBuilder>) -> bool {
        if let Some(mut entry) = self.inner.forms.get_mut(&form) {
            entry.url_builder = builder;
            true
        } else {
            false
        }
    }

    /// Event stream from now on; see [`EventBus::subscribe`] for what happens to
    /// a receiver that falls more than `SyncConfig::event_capacity` behind.
    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.inner.events.subscribe()
    }

    pub fn config(&self) -> &SyncConfig {
        &self.inner.config
    }

    /// Run `action` with exclusive access to the page document.
    pub fn with_document<R>(&self, action: impl FnOnce(&mut Document) -> R) -> R {
        let mut document = self.inner.document.lock();
        action(&mut *document)
    }

    pub fn current_url(&self) -> Url {
        self.inner.history.lock().current_url().clone()
    }

    pub fn current_query(&self) -> Query {
        self.inner.history.lock().query()
    }

    pub fn history_len(&self) -> usize {
        self.inner.history.lock().len()
    }

    /// Enhanced filter forms.
    pub fn filter_forms(&self) -> Vec<NodeId> {
        self.inner.forms.iter().map(|entry| *entry.key()).collect()
    }

    pub(crate) fn filter_form(&self, form: NodeId) -> Option<FilterForm> {
        self.inner.forms.get(&form).map(|entry| entry.value().clone())
    }

    pub fn is_request_active(&self, element: NodeId, kind: RequestKind) -> bool {
        self.inner.canceller.is_active(element, kind)
    }

    /// Entry point for `input`, `change`, `switch-mode` and `reset` events on a filter form.
    ///
    /// Free-text edits are debounced and their `change` events ignored;
    /// every other control starts a cycle right away.
    pub async fn on_form_input(&self, form: NodeId, target: NodeId, kind: InputKind) -> InputOutcome {
        let Some(filter_form) = self.filter_form(form) else {
            warn!("input on {form:?}, which is not an enhanced filter form");
            return InputOutcome::Ignored;
        };
        let (snapshot, control, is_get) = {
            let document = self.inner.document.lock();
            let method = document.attribute(form, "method").unwrap_or("get");
            (
                filter_form.snapshot(&document).pairs(),
                control_kind(&document, target),
                method.eq_ignore_ascii_case("get"),
            )
        };
        if !self.inner.gates.admit(form, snapshot) {
            return InputOutcome::Unchanged;
        }

        match (kind, control) {
            (InputKind::Reset | InputKind::SwitchMode, _) | (_, ControlKind::Discrete) => {
                let (validation, refresh) = self.query_populate(form).await;
                InputOutcome::Populated {
                    validation,
                    refresh,
                }
            }
            (_, ControlKind::File) if is_get => {
                trace!("file input changed on GET form {form:?}; not submitting");
                InputOutcome::Ignored
            }
            (_, ControlKind::File) => {
                let (validation, refresh) = self.query_populate(form).await;
                InputOutcome::Populated {
                    validation,
                    refresh,
                }
            }
            (InputKind::Change, ControlKind::FreeText) => InputOutcome::Ignored,
            (InputKind::Input, ControlKind::FreeText) => {
                self.schedule_populate(form);
                InputOutcome::Scheduled
            }
        }
    }

    fn schedule_populate(&self, form: NodeId) {
        let debouncer = Arc::clone(
            self.inner
                .debouncers
                .entry(form)
                .or_insert_with(|| Arc::new(Debouncer::new(self.inner.config.debounce())))
                .value(),
        );
        let this = self.clone();
        debouncer.trigger(async move {
            this.query_populate(form).await;
        });
    }

    /// Handle a form reset once the browser has restored the defaults.
    pub async fn on_form_reset(&self, form: NodeId) -> InputOutcome {
        {
            let mut document = self.inner.document.lock();
            document.reset_form(form);
            for select in document.find_by_class(form, MULTI_SELECT_CLASS) {
                document.select_values(select, &[]);
            }
        }
        self.on_form_input(form, form, InputKind::Reset).await
    }

    /// Handle the simple/advanced filter mode toggle.
    pub async fn on_toggle_mode(&self, form: NodeId) -> InputOutcome {
        self.on_form_input(form, form, InputKind::SwitchMode).await
    }

    /// Reconcile the address bar with `form`, then validate and refresh concurrently.
    pub async fn query_populate(&self, form: NodeId) -> (ChannelOutcome, ChannelOutcome) {
        let Some(filter_form) = self.filter_form(form) else {
            warn!("query_populate on unknown form {form:?}");
            return (ChannelOutcome::Skipped, ChannelOutcome::Skipped);
        };
        let (declared, snapshot, page_key, container) = {
            let document = self.inner.document.lock();
            (
                filter_form.declared_fields(&document),
                filter_form.snapshot(&document),
                filter_form.page_key(&document),
                filter_form.container(&document),
            )
        };
        let next = {
            let mut history = self.inner.history.lock();
            let next = compute_next_query(&history.query(), &declared, &snapshot, Some(&page_key));
            history.replace_query(&next);
            next
        };
        debug!("filter form {form:?} submitted {next}");

        let refresh = async {
            match container {
                Some(container) => {
                    self.update_table_container(container, &next, RefreshContext::FilterForm(form))
                        .await
                }
                None => ChannelOutcome::Skipped,
            }
        };
        tokio::join!(self.validate_form(&next, form), refresh)
    }

    /// Apply a drag-reorder result: `rows` in their new order.
    ///
    /// # Errors
    /// Returns an error if a row is no longer attached to the document.
    pub fn reorder_rows(&self, rows: &[NodeId]) -> Result<usize, Error> {
        apply_reorder(&mut self.inner.document.lock(), rows)
    }
}
