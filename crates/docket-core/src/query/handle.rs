use std::any::Any;
use std::marker::PhantomData;
use std::sync::Arc;

use tokio::sync::watch;

use super::{QueryClient, QueryKey, QueryState};

/// A live subscription to one query.
///
/// Holding a handle keeps the entry out of garbage collection; dropping it
/// starts the entry's retention window.
pub struct QueryHandle<T> {
    client: QueryClient,
    key: QueryKey,
    generation: u64,
    receiver: watch::Receiver<u64>,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Any + Send + Sync> QueryHandle<T> {
    pub(crate) fn new(
        client: QueryClient,
        key: QueryKey,
        generation: u64,
        receiver: watch::Receiver<u64>,
    ) -> Self {
        Self {
            client,
            key,
            generation,
            receiver,
            _marker: PhantomData,
        }
    }

    pub fn key(&self) -> &QueryKey {
        &self.key
    }

    pub fn state(&self) -> QueryState<T> {
        self.client.state(&self.key)
    }

    pub fn data(&self) -> Option<Arc<T>> {
        self.state().data
    }

    /// Wait for the next change to this entry. Returns false once the entry
    /// has been removed from the cache.
    pub async fn changed(&mut self) -> bool {
        self.receiver.changed().await.is_ok()
    }

    /// Wait until no fetch is in flight and return the resulting state.
    pub async fn settled(&mut self) -> QueryState<T> {
        loop {
            self.receiver.borrow_and_update();
            let state = self.state();
            if !state.is_fetching {
                return state;
            }
            if self.receiver.changed().await.is_err() {
                return self.state();
            }
        }
    }

    /// Force a new fetch, superseding any in flight.
    pub fn refetch(&self) -> bool {
        self.client.refetch(&self.key)
    }
}

impl<T> Drop for QueryHandle<T> {
    fn drop(&mut self) {
        self.client.unsubscribe(&self.key, self.generation);
    }
}
