use std::sync::Arc;

use tokio::time::Instant;

use crate::api::ApiError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryStatus {
    /// Entry exists but nothing has been fetched (disabled or cancelled)
    Idle,
    /// First fetch in flight, no data yet
    Loading,
    Success,
    Error,
}

/// Snapshot of one query as seen by a consumer.
#[derive(Debug)]
pub struct QueryState<T> {
    pub data: Option<Arc<T>>,
    pub status: QueryStatus,
    pub error: Option<ApiError>,
    pub fetched_at: Option<Instant>,
    /// A fetch (initial or background) is in flight
    pub is_fetching: bool,
    pub is_stale: bool,
}

impl<T> QueryState<T> {
    pub(crate) fn idle() -> Self {
        Self {
            data: None,
            status: QueryStatus::Idle,
            error: None,
            fetched_at: None,
            is_fetching: false,
            is_stale: true,
        }
    }

    pub fn is_loading(&self) -> bool {
        self.status == QueryStatus::Loading
    }

    pub fn is_error(&self) -> bool {
        self.status == QueryStatus::Error
    }

    pub fn is_success(&self) -> bool {
        self.status == QueryStatus::Success
    }
}

impl<T> Clone for QueryState<T> {
    fn clone(&self) -> Self {
        Self {
            data: self.data.clone(),
            status: self.status,
            error: self.error.clone(),
            fetched_at: self.fetched_at,
            is_fetching: self.is_fetching,
            is_stale: self.is_stale,
        }
    }
}
