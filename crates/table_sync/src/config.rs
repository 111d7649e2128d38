//! Configuration settings for the table synchronization engine.
//!
//! Configuration can be loaded from environment variables or constructed
//! programmatically.

use core::time::Duration;
use std::env;

/// Default time a request may stay in flight before it is cancelled.
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 5000;
/// Default quiet period before a free-text filter edit is submitted.
pub const DEFAULT_DEBOUNCE_MS: u64 = 400;
/// Default number of events a subscriber may fall behind before it lags.
pub const DEFAULT_EVENT_CAPACITY: usize = 256;

/// Runtime configuration for a page coordinator.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SyncConfig {
    /// Request timeout in milliseconds; `None` disables automatic cancellation
    pub request_timeout_ms: Option<u64>,
    /// Debounce period for free-text inputs in milliseconds
    pub debounce_ms: u64,
    /// Whether to log suppressed (aborted) requests at debug level
    pub debug: bool,
    /// Events buffered per subscriber before the oldest are dropped
    pub event_capacity: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self::new(Some(DEFAULT_REQUEST_TIMEOUT_MS), DEFAULT_DEBOUNCE_MS, false)
    }
}

impl SyncConfig {
    /// Construct a new `SyncConfig` with explicit values.
    ///
    /// # Arguments
    ///
    /// * `request_timeout_ms` - Per-request timeout, `None` (or zero) to disable
    /// * `debounce_ms` - Debounce period for free-text inputs
    /// * `debug` - Whether to log suppressed requests
    #[inline]
    #[must_use]
    pub const fn new(request_timeout_ms: Option<u64>, debounce_ms: u64, debug: bool) -> Self {
        let request_timeout_ms = match request_timeout_ms {
            Some(0) | None => None,
            Some(millis) => Some(millis),
        };
        Self {
            request_timeout_ms,
            debounce_ms,
            debug,
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }

    /// Replace the event buffer size; zero is raised to one.
    #[inline]
    #[must_use]
    pub const fn with_event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = if capacity == 0 { 1 } else { capacity };
        self
    }

    /// Load configuration from environment variables.
    ///
    /// Reads the following environment variables:
    /// - `TABLE_SYNC_TIMEOUT_MS`: Request timeout in milliseconds, `0` disables (default: 5000)
    /// - `TABLE_SYNC_DEBOUNCE_MS`: Free-text debounce in milliseconds (default: 400)
    /// - `TABLE_SYNC_DEBUG`: Set to "1" to log suppressed requests (default: disabled)
    /// - `TABLE_SYNC_EVENT_CAPACITY`: Events buffered per subscriber (default: 256)
    #[inline]
    #[must_use]
    pub fn from_env() -> Self {
        let request_timeout_ms = env::var("TABLE_SYNC_TIMEOUT_MS")
            .ok()
            .and_then(|val| val.parse::<u64>().ok())
            .map_or(Some(DEFAULT_REQUEST_TIMEOUT_MS), |millis| {
                (millis > 0).then_some(millis)
            });
        let debounce_ms = env::var("TABLE_SYNC_DEBOUNCE_MS")
            .ok()
            .and_then(|val| val.parse::<u64>().ok())
            .unwrap_or(DEFAULT_DEBOUNCE_MS);
        let debug = env::var("TABLE_SYNC_DEBUG").ok().as_deref() == Some("1");
        let event_capacity = env::var("TABLE_SYNC_EVENT_CAPACITY")
            .ok()
            .and_then(|val| val.parse::<usize>().ok())
            .filter(|capacity| *capacity > 0)
            .unwrap_or(DEFAULT_EVENT_CAPACITY);
        Self {
            request_timeout_ms,
            debounce_ms,
            debug,
            event_capacity,
        }
    }

    /// Get the request timeout as an optional `Duration`.
    #[inline]
    #[must_use]
    pub const fn request_timeout(&self) -> Option<Duration> {
        if let Some(millis) = self.request_timeout_ms {
            Some(Duration::from_millis(millis))
        } else {
            None
        }
    }

    /// Get the free-text debounce period as a `Duration`.
    #[inline]
    #[must_use]
    pub const fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::SyncConfig;
    use core::time::Duration;

    #[test]
    fn zero_timeout_disables_cancellation() {
        let config = SyncConfig::new(Some(0), 250, false);
        assert_eq!(config.request_timeout(), None);
        assert_eq!(config.debounce(), Duration::from_millis(250));
    }

    #[test]
    fn defaults_match_browser_behaviour() {
        let config = SyncConfig::default();
        assert_eq!(config.request_timeout(), Some(Duration::from_millis(5000)));
        assert_eq!(config.debounce(), Duration::from_millis(400));
        assert!(!config.debug);
        assert_eq!(config.event_capacity, 256);
    }

    #[test]
    fn event_capacity_is_at_least_one() {
        assert_eq!(SyncConfig::default().with_event_capacity(0).event_capacity, 1);
        assert_eq!(SyncConfig::default().with_event_capacity(8).event_capacity, 8);
    }
}
