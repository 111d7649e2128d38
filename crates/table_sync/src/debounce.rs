//! Last-write-wins delay for free-text filter inputs.

use core::future::Future;
use core::time::Duration;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::sleep;

/// Runs at most one deferred action, `delay` after the most recent trigger.
///
/// Triggering again before the delay has elapsed drops the pending action.
/// Once an action has started it runs to completion on its own task.
pub struct Debouncer {
    delay: Duration,
    pending: Mutex<Option<JoinHandle<()>>>,
}

impl Debouncer {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            pending: Mutex::new(None),
        }
    }

    pub const fn delay(&self) -> Duration {
        self.delay
    }

    /// Replace any pending action with `action`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn trigger<F>(&self, action: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let delay = self.delay;
        let timer = tokio::spawn(async move {
            sleep(delay).await;
            drop(tokio::spawn(action));
        });
        if let Some(previous) = self.pending.lock().replace(timer) {
            previous.abort();
        }
    }

    /// Drop the pending action, if any. Returns whether one was still waiting.
    pub fn cancel(&self) -> bool {
        self.pending.lock().take().is_some_and(|timer| {
            let waiting = !timer.is_finished();
            timer.abort();
            waiting
        })
    }

    pub fn is_pending(&self) -> bool {
        self.pending
            .lock()
            .as_ref()
            .is_some_and(|timer| !timer.is_finished())
    }
}

/// A debounced action bound to its trigger.
pub struct Debounced<F> {
    action: F,
    debouncer: Debouncer,
}

impl<F, Fut> Debounced<F>
where
    F: Fn() -> Fut,
    Fut: Future<Output = ()> + Send + 'static,
{
    pub fn trigger(&self) {
        self.debouncer.trigger((self.action)());
    }

    pub fn cancel(&self) -> bool {
        self.debouncer.cancel()
    }

    pub fn is_pending(&self) -> bool {
        self.debouncer.is_pending()
    }
}

/// Wrap `action` so that bursts of triggers collapse into one run `delay`
/// after the last trigger.
pub fn schedule<F>(action: F, delay: Duration) -> Debounced<F> {
    Debounced {
        action,
        debouncer: Debouncer::new(delay),
    }
}
