use std::time::Duration;

use crate::api::ApiError;

/// Default number of additional attempts for a failed query
pub const DEFAULT_QUERY_RETRIES: u32 = 2;

/// Default number of additional attempts for a failed mutation.
/// Writes are not idempotent by default, so they get a shorter budget.
pub const DEFAULT_MUTATION_RETRIES: u32 = 1;

/// Delay before the first retry; doubled for each further attempt
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(1000);

/// Upper bound for a single retry delay
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_millis(30_000);

/// Exponential-backoff retry policy.
///
/// Client errors (status 400-499) are never retried. Anything else is retried
/// up to `max_retries` additional times, waiting
/// `min(base_delay * 2^attempt, max_delay)` before each retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    pub fn queries() -> Self {
        Self {
            max_retries: DEFAULT_QUERY_RETRIES,
            base_delay: DEFAULT_BASE_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
        }
    }

    pub fn mutations() -> Self {
        Self {
            max_retries: DEFAULT_MUTATION_RETRIES,
            ..Self::queries()
        }
    }

    pub fn never() -> Self {
        Self {
            max_retries: 0,
            ..Self::queries()
        }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Whether another attempt should follow `failures` failed ones, the
    /// latest of which produced `error`.
    pub fn should_retry(&self, failures: u32, error: &ApiError) -> bool {
        error.is_retryable() && failures < self.max_retries
    }

    /// Delay before retry number `attempt` (zero-based).
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::queries()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles_then_caps() {
        let policy = RetryPolicy::queries();
        assert_eq!(policy.delay(0), Duration::from_millis(1000));
        assert_eq!(policy.delay(1), Duration::from_millis(2000));
        assert_eq!(policy.delay(4), Duration::from_millis(16_000));
        assert_eq!(policy.delay(5), Duration::from_millis(30_000));
        assert_eq!(policy.delay(40), Duration::from_millis(30_000));
    }

    #[test]
    fn test_client_errors_never_retried() {
        let policy = RetryPolicy::queries();
        let not_found = ApiError::from_status(404, "");
        assert!(!policy.should_retry(0, &not_found));
    }

    #[test]
    fn test_server_errors_retried_within_budget() {
        let unavailable = ApiError::from_status(503, "");

        let queries = RetryPolicy::queries();
        assert!(queries.should_retry(0, &unavailable));
        assert!(queries.should_retry(1, &unavailable));
        assert!(!queries.should_retry(2, &unavailable));

        let mutations = RetryPolicy::mutations();
        assert!(mutations.should_retry(0, &unavailable));
        assert!(!mutations.should_retry(1, &unavailable));
    }

    #[test]
    fn test_network_errors_retried() {
        let policy = RetryPolicy::queries();
        assert!(policy.should_retry(0, &ApiError::network("connection reset")));
        assert!(!RetryPolicy::never().should_retry(0, &ApiError::network("connection reset")));
    }
}
