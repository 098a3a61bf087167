use std::time::Duration;

use super::RetryPolicy;

/// Freshness window applied when a query does not override it
pub const DEFAULT_STALE_TIME: Duration = Duration::from_secs(5 * 60);

/// How long an unsubscribed entry is retained before garbage collection
pub const DEFAULT_GC_TIME: Duration = Duration::from_secs(10 * 60);

/// Tuning for a [`QueryClient`](super::QueryClient).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryConfig {
    /// Data younger than this is served without a network call.
    pub stale_time: Duration,
    /// Retention window for entries without subscribers.
    pub gc_time: Duration,
    pub retry: RetryPolicy,
    pub mutation_retry: RetryPolicy,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            stale_time: DEFAULT_STALE_TIME,
            gc_time: DEFAULT_GC_TIME,
            retry: RetryPolicy::queries(),
            mutation_retry: RetryPolicy::mutations(),
        }
    }
}

impl QueryConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_stale_time(mut self, stale_time: Duration) -> Self {
        self.stale_time = stale_time;
        self
    }

    pub fn with_gc_time(mut self, gc_time: Duration) -> Self {
        self.gc_time = gc_time;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_mutation_retry(mut self, retry: RetryPolicy) -> Self {
        self.mutation_retry = retry;
        self
    }
}

/// Per-query overrides.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryOptions {
    /// When false the query never fetches; cached data stays visible.
    pub enabled: bool,
    pub stale_time: Option<Duration>,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            enabled: true,
            stale_time: None,
        }
    }
}

impl QueryOptions {
    /// Gate a query on a required value, e.g. skip a detail fetch until its id is known.
    pub fn enabled(enabled: bool) -> Self {
        Self {
            enabled,
            ..Self::default()
        }
    }

    pub fn with_stale_time(mut self, stale_time: Duration) -> Self {
        self.stale_time = Some(stale_time);
        self
    }
}
