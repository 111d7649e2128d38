//! Asynchronous form validation.
//!
//! The server answers a validation request with form-level messages, shown in
//! the form's error region, and per-field messages, stored as each control's
//! custom validity.

use crate::cancel::RequestKind;
use crate::coordinator::{ChannelOutcome, Coordinator};
use crate::error::FetchError;
use crate::events::{ErrorAction, EventDetail, SyncEvent, Trigger};
use crate::form::FilterForm;
use crate::query::Query;
use anyhow::anyhow;
use dom::{Document, NodeId};
use log::{debug, trace, warn};
use serde::Deserialize;
use std::collections::BTreeMap;
use tracing::{Instrument as _, info_span};

const HIDDEN_CLASS: &str = "hidden";

/// Body of a validation response. Both parts are optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ValidationReport {
    pub global: Option<Vec<String>>,
    pub fields: Option<BTreeMap<String, Vec<String>>>,
}

impl ValidationReport {
    pub fn global_message(&self) -> Option<String> {
        self.global
            .as_ref()
            .filter(|messages| !messages.is_empty())
            .map(|messages| messages.join(", "))
    }
}

/// Reflect `report` into the document and return the resulting `Invalid` events.
///
/// Controls the report does not mention have their custom validity cleared,
/// so a fixed field stops being flagged.
pub fn apply_report(
    document: &mut Document,
    form: &FilterForm,
    report: &ValidationReport,
) -> Vec<SyncEvent> {
    if let Some(region) = form.error_region(document) {
        match report.global_message() {
            Some(message) => {
                let slot = document
                    .find_first(region, |element| element.is("span"))
                    .unwrap_or(region);
                document.set_text_content(slot, &message);
                document.remove_class(region, HIDDEN_CLASS);
            }
            None => document.add_class(region, HIDDEN_CLASS),
        }
    }

    for name in form.declared_fields(document) {
        if let Some(control) = form.field(document, &name) {
            document.set_custom_validity(control, "");
        }
    }

    let mut events = Vec::new();
    for (name, messages) in report.fields.iter().flatten() {
        let Some(control) = form.field(document, name) else {
            trace!("validation message for unknown field {name:?}");
            continue;
        };
        let message = messages.join(", ");
        document.set_custom_validity(control, &message);
        if !message.is_empty() {
            events.push(SyncEvent::Invalid {
                target: control,
                field: name.clone(),
                message,
            });
        }
    }
    events
}

impl Coordinator {
    /// Ask the server whether `query` is valid for `form` and show the answer.
    ///
    /// Failures are reported through events only and never stop a refresh.
    pub async fn validate_form(&self, query: &Query, form: NodeId) -> ChannelOutcome {
        let Some(filter_form) = self.filter_form(form) else {
            warn!("validate_form called for unknown form {form:?}");
            return ChannelOutcome::Skipped;
        };
        let prepared = {
            let document = self.inner.document.lock();
            filter_form.validation_endpoint(&document)
        };
        let Some(endpoint) = prepared else {
            trace!("form {form:?} has no validation endpoint");
            return ChannelOutcome::Skipped;
        };
        let detail = EventDetail {
            query: query.clone(),
            endpoint: endpoint.clone(),
            trigger: Trigger::FilterForm(form),
        };
        let span = info_span!("table_sync.validate", endpoint = %endpoint);
        self.run_validation(filter_form, detail).instrument(span).await
    }

    async fn run_validation(&self, form: FilterForm, detail: EventDetail) -> ChannelOutcome {
        let inner = &self.inner;
        inner.events.emit(SyncEvent::LoadingStart {
            target: form.node,
            detail: detail.clone(),
        });

        let url = form
            .url_builder
            .build(&self.current_url(), &detail.query, &detail.endpoint);
        let token = inner.canceller.begin(form.node, RequestKind::Validation);
        let id = token.id();
        let result = match url {
            Ok(url) => token.run(inner.transport.get_json(&url)).await,
            Err(err) => Err(FetchError::Transport(err)),
        };
        let current = inner.canceller.is_current(form.node, RequestKind::Validation, id);
        inner.canceller.finish(form.node, RequestKind::Validation, id);

        let result = result.and_then(|value| {
            if !current {
                return Err(FetchError::Aborted);
            }
            serde_json::from_value::<ValidationReport>(value)
                .map_err(|err| FetchError::Transport(anyhow!("invalid validation response: {err}")))
        });

        match result {
            Ok(report) => {
                let invalid = {
                    let mut document = inner.document.lock();
                    apply_report(&mut document, &form, &report)
                };
                for event in invalid {
                    inner.events.emit(event);
                }
                inner.events.emit(SyncEvent::LoadingEnd {
                    target: form.node,
                    detail,
                });
                ChannelOutcome::Applied
            }
            Err(FetchError::Aborted) => {
                if inner.config.debug {
                    debug!("validation for {:?} aborted", detail.endpoint);
                }
                inner.events.emit(SyncEvent::LoadingEnd {
                    target: form.node,
                    detail,
                });
                ChannelOutcome::Aborted
            }
            Err(FetchError::Transport(err)) => {
                warn!("validation request {:?} failed: {err}", detail.endpoint);
                inner.events.emit(SyncEvent::LoadingEnd {
                    target: form.node,
                    detail: detail.clone(),
                });
                inner.events.emit(SyncEvent::Error {
                    target: form.node,
                    action: ErrorAction::FormValidation,
                    error: err.to_string(),
                    detail,
                });
                ChannelOutcome::Failed
            }
        }
    }
}
