//! Keeps server-rendered tables, their filter forms and the address bar in
//! sync over asynchronous requests.
//!
//! A [`Coordinator`] owns one page: its [`dom::Document`], its session
//! [`history::History`] and every in-flight request. Hosts feed it user
//! interaction (form input, link clicks, history navigation) and observe the
//! outcome through [`SyncEvent`]s.

#![allow(
    clippy::missing_docs_in_private_items,
    reason = "Internal implementation details don't need public documentation"
)]
#![allow(
    clippy::missing_inline_in_public_items,
    reason = "Inlining decisions left to compiler for this crate"
)]
#![allow(
    clippy::missing_errors_doc,
    reason = "Channel failures are reported through events, not return values"
)]

pub mod cancel;
pub mod config;
pub mod coordinator;
pub mod debounce;
pub mod edit_table;
pub mod error;
pub mod events;
pub mod form;
pub mod gate;
pub mod history;
pub mod query;
pub mod rebind;
pub mod refresh;
pub mod transport;
pub mod validation;

pub use cancel::{RequestCanceller, RequestKind, RequestToken};
pub use config::SyncConfig;
pub use coordinator::{ChannelOutcome, Coordinator, InputKind, InputOutcome};
pub use debounce::{Debounced, Debouncer, schedule};
pub use edit_table::NewRowOutcome;
pub use error::{ConfigError, FetchError};
pub use events::{ErrorAction, EventBus, EventDetail, SyncEvent, Trigger};
pub use form::{DefaultUrlBuilder, FieldValue, FilterForm, FormSnapshot, UrlBuilder};
pub use gate::unchanged;
pub use history::{History, HistoryState, LinkOutcome, PopstateAction};
pub use query::{Query, compute_next_query};
pub use rebind::{
    AttributeSelector, MultiSelectOptions, MultiSelectWidget, NoopWidget, ReorderOptions, ReorderWidget,
    WidgetRebinder,
};
pub use refresh::RefreshContext;
pub use transport::{HttpTransport, Transport};
pub use validation::ValidationReport;
