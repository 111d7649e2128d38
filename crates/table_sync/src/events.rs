//! Observable lifecycle notifications.
//!
//! Every event names the element it is dispatched on; observers treat them as
//! bubbling from there, so a listener on a container sees events of its table
//! and form.

use crate::config::DEFAULT_EVENT_CAPACITY;
use crate::query::Query;
use dom::NodeId;
use log::trace;
use tokio::sync::broadcast;


/// What started a request cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    FilterForm(NodeId),
    PageLink(NodeId),
    Reload,
    NewRow(NodeId),
}

/// Context attached to loading and error events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventDetail {
    pub query: Query,
    pub endpoint: String,
    pub trigger: Trigger,
}

/// Operation that failed, as reported in [`SyncEvent::Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorAction {
    FormValidation,
    TablePopulation,
    NewRow,
}

impl ErrorAction {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::FormValidation => "form.validation",
            Self::TablePopulation => "table.population",
            Self::NewRow => "edit_table.new_row",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncEvent {
    InitStart,
    InitEnd,
    LoadingStart {
        target: NodeId,
        detail: EventDetail,
    },
    LoadingEnd {
        target: NodeId,
        detail: EventDetail,
    },
    /// New content was inserted under `target`.
    Populated {
        target: NodeId,
        detail: EventDetail,
    },
    Error {
        target: NodeId,
        action: ErrorAction,
        error: String,
        detail: EventDetail,
    },
    /// A field was given a non-empty validation message.
    Invalid {
        target: NodeId,
        field: String,
        message: String,
    },
    RowInserted {
        table: NodeId,
        row: NodeId,
        virtual_id: i64,
    },
    /// The host should perform a full page reload.
    ReloadRequested,
}

impl SyncEvent {
    pub const fn target(&self) -> Option<NodeId> {
        match self {
            Self::LoadingStart { target, .. }
            | Self::LoadingEnd { target, .. }
            | Self::Populated { target, .. }
            | Self::Error { target, .. }
            | Self::Invalid { target, .. } => Some(*target),
            Self::RowInserted { table, .. } => Some(*table),
            Self::InitStart | Self::InitEnd | Self::ReloadRequested => None,
        }
    }
}

/// Broadcast channel for [`SyncEvent`]s.
pub struct EventBus {
    sender: broadcast::Sender<SyncEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_EVENT_CAPACITY)
    }

    /// A bus buffering up to `capacity` undelivered events per subscriber.
    ///
    /// # Panics
    /// Panics if `capacity` is zero.
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish `event`; having no subscribers is not an error.
    pub fn emit(&self, event: SyncEvent) {
        trace!("event {event:?}");
        drop(self.sender.send(event));
    }

    /// Receive every event emitted from now on.
    ///
    /// A receiver that falls more than the bus capacity behind loses the
    /// oldest events: its next `recv` returns `RecvError::Lagged(n)` with the
    /// number skipped, then resumes with the oldest event still buffered.
    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.sender.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::{ErrorAction, EventBus, SyncEvent};
    use tokio::sync::broadcast::error::TryRecvError;

    #[test]
    fn subscribers_see_events_in_order() {
        let bus = EventBus::new();
        bus.emit(SyncEvent::InitStart);
        let mut receiver = bus.subscribe();
        bus.emit(SyncEvent::InitEnd);
        bus.emit(SyncEvent::ReloadRequested);

        assert_eq!(receiver.try_recv().ok(), Some(SyncEvent::InitEnd));
        assert_eq!(receiver.try_recv().ok(), Some(SyncEvent::ReloadRequested));
        assert!(receiver.try_recv().is_err());
        assert_eq!(ErrorAction::TablePopulation.as_str(), "table.population");
    }

    #[test]
    fn slow_subscriber_lags_past_capacity() {
        let bus = EventBus::with_capacity(2);
        let mut receiver = bus.subscribe();
        bus.emit(SyncEvent::InitStart);
        bus.emit(SyncEvent::InitEnd);
        bus.emit(SyncEvent::ReloadRequested);

        assert_eq!(receiver.try_recv(), Err(TryRecvError::Lagged(1)));
        assert_eq!(receiver.try_recv().ok(), Some(SyncEvent::InitEnd));
        assert_eq!(receiver.try_recv().ok(), Some(SyncEvent::ReloadRequested));
    }
}
