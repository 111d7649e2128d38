//! Per-(element, kind) request cancellation.
//!
//! Every outgoing request is wrapped in a [`RequestToken`]. Starting a new
//! request for the same element and kind aborts the previous one; requests for
//! other pairs are never touched. Tokens also carry the request deadline, so a
//! timed-out request settles the same way a superseded one does.

use crate::error::FetchError;
use anyhow::Error;
use core::future::Future;
use core::sync::atomic::{AtomicU64, Ordering};
use core::time::Duration;
use dashmap::DashMap;
use dom::NodeId;
use futures::future::{AbortHandle, AbortRegistration, Abortable};
use log::debug;
use tokio::time::{Instant, timeout_at};

/// Which channel a request belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestKind {
    Validation,
    Refresh,
    NewRow,
}

/// Handle for one in-flight request.
#[derive(Debug)]
pub struct RequestToken {
    id: u64,
    registration: AbortRegistration,
    deadline: Option<Instant>,
}

impl RequestToken {
    pub const fn id(&self) -> u64 {
        self.id
    }

    /// Drive `request` until it settles, is superseded or runs past its deadline.
    ///
    /// # Errors
    /// [`FetchError::Aborted`] when superseded or timed out, otherwise the
    /// request's own failure as [`FetchError::Transport`].
    pub async fn run<F, T>(self, request: F) -> Result<T, FetchError>
    where
        F: Future<Output = Result<T, Error>>,
    {
        let Self {
            registration,
            deadline,
            ..
        } = self;
        let bounded = async move {
            match deadline {
                Some(deadline) => match timeout_at(deadline, request).await {
                    Ok(result) => result.map_err(FetchError::from),
                    Err(_elapsed) => Err(FetchError::Aborted),
                },
                None => request.await.map_err(FetchError::from),
            }
        };
        Abortable::new(bounded, registration)
            .await
            .unwrap_or(Err(FetchError::Aborted))
    }
}

struct ActiveRequest {
    id: u64,
    handle: AbortHandle,
}

/// Side-table of the active request per (element, kind).
pub struct RequestCanceller {
    active: DashMap<(NodeId, RequestKind), ActiveRequest>,
    next_id: AtomicU64,
    timeout: Option<Duration>,
}

impl RequestCanceller {
    pub fn new(timeout: Option<Duration>) -> Self {
        Self {
            active: DashMap::new(),
            next_id: AtomicU64::new(1),
            timeout,
        }
    }

    /// Abort the previous request for the pair and register a new one.
    pub fn begin(&self, element: NodeId, kind: RequestKind) -> RequestToken {
        let (handle, registration) = AbortHandle::new_pair();
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        if let Some(previous) = self.active.insert((element, kind), ActiveRequest { id, handle }) {
            debug!("{kind:?} request {} for {element:?} superseded by {id}", previous.id);
            previous.handle.abort();
        }
        RequestToken {
            id,
            registration,
            deadline: self.timeout.map(|timeout| Instant::now() + timeout),
        }
    }

    /// Abort the active request for the pair without starting another.
    pub fn cancel(&self, element: NodeId, kind: RequestKind) -> bool {
        self.active
            .remove(&(element, kind))
            .map(|(_, active)| active.handle.abort())
            .is_some()
    }

    /// Clear the pair once request `id` has settled, unless it was already replaced.
    pub fn finish(&self, element: NodeId, kind: RequestKind, id: u64) {
        self.active
            .remove_if(&(element, kind), |_, active| active.id == id);
    }

    /// Whether `id` is still the newest request for the pair.
    pub fn is_current(&self, element: NodeId, kind: RequestKind, id: u64) -> bool {
        self.active
            .get(&(element, kind))
            .is_some_and(|active| active.id == id)
    }

    pub fn is_active(&self, element: NodeId, kind: RequestKind) -> bool {
        self.active.contains_key(&(element, kind))
    }
}

#[cfg(test)]
mod tests {
    use super::{RequestCanceller, RequestKind};
    use crate::error::FetchError;
    use anyhow::Error;
    use core::time::Duration;
    use dom::Document;
    use futures::future::pending;
    use tokio::sync::oneshot;
    use tokio::task::yield_now;

    #[tokio::test]
    async fn newer_request_aborts_older_one_for_same_pair() {
        let mut document = Document::new();
        let form = document.create_element("form");
        let canceller = RequestCanceller::new(None);

        let first = canceller.begin(form, RequestKind::Validation);
        let (release, gate) = oneshot::channel::<u32>();
        let first_run = tokio::spawn(first.run(async move { gate.await.map_err(Error::from) }));
        yield_now().await;

        let second = canceller.begin(form, RequestKind::Validation);
        let second_id = second.id();
        let second_result = second.run(async { Ok(2_u32) }).await;
        drop(release);

        let first_result = first_run.await;
        assert!(matches!(first_result, Ok(Err(FetchError::Aborted))));
        assert!(matches!(second_result, Ok(2)));
        assert!(canceller.is_current(form, RequestKind::Validation, second_id));
        canceller.finish(form, RequestKind::Validation, second_id);
        assert!(!canceller.is_active(form, RequestKind::Validation));
    }

    #[tokio::test]
    async fn different_kinds_do_not_interfere() {
        let mut document = Document::new();
        let form = document.create_element("form");
        let canceller = RequestCanceller::new(None);

        let validation = canceller.begin(form, RequestKind::Validation);
        let _refresh = canceller.begin(form, RequestKind::Refresh);

        let result = validation.run(async { Ok("ok") }).await;
        assert!(matches!(result, Ok("ok")));
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_turns_into_abort() {
        let mut document = Document::new();
        let container = document.create_element("div");
        let canceller = RequestCanceller::new(Some(Duration::from_millis(50)));

        let token = canceller.begin(container, RequestKind::Refresh);
        let result: Result<(), FetchError> = token.run(pending()).await;
        assert!(result.is_err_and(|err| err.is_abort()));
    }

    #[tokio::test]
    async fn finish_keeps_newer_registration() {
        let mut document = Document::new();
        let container = document.create_element("div");
        let canceller = RequestCanceller::new(None);

        let old = canceller.begin(container, RequestKind::Refresh);
        let new = canceller.begin(container, RequestKind::Refresh);
        canceller.finish(container, RequestKind::Refresh, old.id());
        assert!(canceller.is_current(container, RequestKind::Refresh, new.id()));
        assert!(canceller.cancel(container, RequestKind::Refresh));
        assert!(!canceller.cancel(container, RequestKind::Refresh));
    }
}
