//! The query cache: keyed snapshots of server data with staleness tracking,
//! request coalescing, retries and garbage collection.
//!
//! All entry state lives behind one mutex that is never held across an
//! await. Fetches run as spawned tasks; each attempt is tagged with the
//! entry's sequence number at dispatch and its result is applied only if the
//! tag still matches when it settles.

use std::any::{type_name, Any};
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, warn};

use super::{QueryConfig, QueryHandle, QueryKey, QueryOptions, QueryState, QueryStatus, RetryPolicy};
use crate::api::ApiError;
use crate::cache::MIN_SWEEP_INTERVAL;

/// Type-erased cached value; each key is read back as one concrete type.
pub(crate) type AnyData = Arc<dyn Any + Send + Sync>;

type Fetcher = Arc<dyn Fn() -> BoxFuture<'static, Result<AnyData, ApiError>> + Send + Sync>;

/// Identifies one dispatched fetch: the entry it belongs to and the entry's
/// sequence number at dispatch.
#[derive(Debug, Clone, Copy)]
struct FetchTag {
    generation: u64,
    seq: u64,
}

pub(crate) struct Entry {
    pub(crate) data: Option<AnyData>,
    pub(crate) status: QueryStatus,
    pub(crate) fetched_at: Option<Instant>,
    pub(crate) stale_after: Instant,
    pub(crate) retain_until: Instant,
    pub(crate) error: Option<ApiError>,
    pub(crate) subscriber_count: usize,
    /// Identifies this entry among every entry ever created for its key
    generation: u64,
    /// Forced stale by invalidation or a mutation; cleared by the next success
    invalidated: bool,
    stale_time: Duration,
    seq: u64,
    fetching: bool,
    fetcher: Option<Fetcher>,
    notify: watch::Sender<u64>,
}

impl Entry {
    fn new(now: Instant, config: &QueryConfig, generation: u64) -> Self {
        let (notify, _) = watch::channel(0);
        Self {
            data: None,
            status: QueryStatus::Idle,
            fetched_at: None,
            stale_after: now,
            retain_until: now + config.gc_time,
            error: None,
            subscriber_count: 0,
            generation,
            invalidated: false,
            stale_time: config.stale_time,
            seq: 0,
            fetching: false,
            fetcher: None,
            notify,
        }
    }

    /// Whether a fetch dispatched with `tag` is still the one this entry
    /// waits for.
    fn is_current(&self, tag: FetchTag) -> bool {
        self.fetching && self.generation == tag.generation && self.seq == tag.seq
    }

    fn is_stale(&self, now: Instant) -> bool {
        self.invalidated || now >= self.stale_after
    }

    fn set_stale_time(&mut self, stale_time: Duration) {
        self.stale_time = stale_time;
        if let (Some(fetched_at), false) = (self.fetched_at, self.invalidated) {
            self.stale_after = fetched_at + stale_time;
        }
    }

    fn mark_stale(&mut self, now: Instant) {
        self.invalidated = true;
        self.stale_after = now;
    }

    pub(crate) fn notify(&self) {
        self.notify.send_modify(|version| *version = version.wrapping_add(1));
    }

    fn cancel(&mut self, key: &QueryKey) {
        self.seq += 1;
        self.fetching = false;
        if self.status == QueryStatus::Loading {
            self.status = QueryStatus::Idle;
        }
        debug!(key = %key, seq = self.seq, "Cancelled in-flight fetch");
        self.notify();
    }

    fn view<T: Any + Send + Sync>(&self, key: &QueryKey, now: Instant) -> QueryState<T> {
        let data = self.data.as_ref().and_then(|data| {
            match Arc::clone(data).downcast::<T>() {
                Ok(typed) => Some(typed),
                Err(_) => {
                    warn!(key = %key, expected = type_name::<T>(), "Cached value has a different type");
                    None
                }
            }
        });
        QueryState {
            data,
            status: self.status,
            error: self.error.clone(),
            fetched_at: self.fetched_at,
            is_fetching: self.fetching,
            is_stale: self.is_stale(now),
        }
    }
}

pub(crate) struct Shared {
    config: QueryConfig,
    entries: Mutex<HashMap<QueryKey, Entry>>,
    generations: AtomicU64,
}

impl Shared {
    pub(crate) fn entries(&self) -> MutexGuard<'_, HashMap<QueryKey, Entry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn new_entry(&self, now: Instant) -> Entry {
        let generation = self.generations.fetch_add(1, Ordering::Relaxed);
        Entry::new(now, &self.config, generation)
    }

    fn is_current(&self, key: &QueryKey, tag: FetchTag) -> bool {
        self.entries()
            .get(key)
            .map(|entry| entry.is_current(tag))
            .unwrap_or(false)
    }

    fn settle(&self, key: &QueryKey, tag: FetchTag, result: Result<AnyData, ApiError>) {
        let now = Instant::now();
        let seq = tag.seq;
        let mut entries = self.entries();
        let Some(entry) = entries.get_mut(key) else {
            debug!(key = %key, seq, "Discarding result for collected query");
            return;
        };
        if !entry.is_current(tag) {
            debug!(key = %key, seq, current = entry.seq, "Discarding superseded fetch result");
            return;
        }

        entry.fetching = false;
        match result {
            Ok(data) => {
                entry.data = Some(data);
                entry.status = QueryStatus::Success;
                entry.fetched_at = Some(now);
                entry.stale_after = now + entry.stale_time;
                entry.invalidated = false;
                entry.error = None;
                debug!(key = %key, seq, "Query settled");
            }
            Err(error) => {
                warn!(key = %key, status = ?error.status, error = %error, "Query failed");
                entry.status = QueryStatus::Error;
                entry.error = Some(error);
            }
        }
        entry.notify();
    }

    fn collect_garbage(&self) -> usize {
        collect_garbage_locked(&mut self.entries(), Instant::now())
    }
}

fn collect_garbage_locked(entries: &mut HashMap<QueryKey, Entry>, now: Instant) -> usize {
    let before = entries.len();
    entries.retain(|key, entry| {
        let keep = entry.subscriber_count > 0 || now <= entry.retain_until;
        if !keep {
            debug!(key = %key, "Collecting unused query");
        }
        keep
    });
    before - entries.len()
}

/// Runs one fetch with retries. Stops early once the attempt is superseded.
async fn run_fetch(
    weak: Weak<Shared>,
    key: QueryKey,
    tag: FetchTag,
    fetcher: Fetcher,
    policy: RetryPolicy,
) {
    let mut failures = 0;
    loop {
        let result = fetcher().await;
        let Some(shared) = weak.upgrade() else {
            return;
        };

        let error = match result {
            Ok(data) => return shared.settle(&key, tag, Ok(data)),
            Err(error) => error,
        };
        if !shared.is_current(&key, tag) {
            debug!(key = %key, seq = tag.seq, "Dropping failure of superseded fetch");
            return;
        }
        if !policy.should_retry(failures, &error) {
            return shared.settle(&key, tag, Err(error));
        }
        drop(shared);

        let delay = policy.delay(failures);
        failures += 1;
        warn!(
            key = %key,
            attempt = failures,
            delay_ms = delay.as_millis() as u64,
            error = %error,
            "Query failed, retrying"
        );
        tokio::time::sleep(delay).await;

        match weak.upgrade() {
            Some(shared) if shared.is_current(&key, tag) => {}
            _ => return,
        }
    }
}

/// In-memory cache of server data shared by every consumer in the process.
///
/// Clone is cheap; all clones address the same entries. Operations that
/// dispatch fetches must run inside a tokio runtime.
#[derive(Clone)]
pub struct QueryClient {
    pub(crate) shared: Arc<Shared>,
}

impl Default for QueryClient {
    fn default() -> Self {
        Self::new(QueryConfig::default())
    }
}

impl QueryClient {
    pub fn new(config: QueryConfig) -> Self {
        Self {
            shared: Arc::new(Shared {
                config,
                entries: Mutex::new(HashMap::new()),
                generations: AtomicU64::new(0),
            }),
        }
    }

    pub fn config(&self) -> &QueryConfig {
        &self.shared.config
    }

    /// Register interest in `key`.
    ///
    /// Returns immediately. A missing or stale entry triggers `fetch` in the
    /// background unless a fetch for the key is already in flight, in which
    /// case the caller attaches to it. Fresh entries are served as-is.
    pub fn query<T, F, Fut>(&self, key: QueryKey, fetch: F, options: QueryOptions) -> QueryHandle<T>
    where
        T: Send + Sync + 'static,
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, ApiError>> + Send + 'static,
    {
        let fetcher: Fetcher = Arc::new(move || {
            let fut = fetch();
            async move { fut.await.map(|data| Arc::new(data) as AnyData) }.boxed()
        });

        let now = Instant::now();
        let config = &self.shared.config;
        let mut entries = self.shared.entries();
        collect_garbage_locked(&mut entries, now);

        let entry = entries
            .entry(key.clone())
            .or_insert_with(|| self.shared.new_entry(now));
        entry.subscriber_count += 1;
        entry.retain_until = now + config.gc_time;
        let receiver = entry.notify.subscribe();
        let generation = entry.generation;

        if options.enabled {
            entry.set_stale_time(options.stale_time.unwrap_or(config.stale_time));
            entry.fetcher = Some(fetcher);
            if entry.fetching {
                debug!(key = %key, "Attaching to in-flight fetch");
            } else if entry.data.is_none() || entry.is_stale(now) {
                self.start_fetch(&key, entry);
            } else {
                debug!(key = %key, "Serving fresh cached data");
            }
        }
        drop(entries);

        QueryHandle::new(self.clone(), key, generation, receiver)
    }

    /// Subscribe, wait for the query to settle and return its data.
    pub async fn fetch<T, F, Fut>(&self, key: QueryKey, fetch: F) -> Result<Arc<T>, ApiError>
    where
        T: Send + Sync + 'static,
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, ApiError>> + Send + 'static,
    {
        let mut handle = self.query(key, fetch, QueryOptions::default());
        let state = handle.settled().await;
        match state.status {
            QueryStatus::Success => state.data.ok_or_else(|| {
                ApiError::invalid_response(format!(
                    "cached value for {} is not a {}",
                    handle.key(),
                    type_name::<T>()
                ))
            }),
            QueryStatus::Error => {
                Err(state.error.unwrap_or_else(|| ApiError::network("Query failed")))
            }
            QueryStatus::Idle | QueryStatus::Loading => Err(ApiError::network("Query was cancelled")),
        }
    }

    fn start_fetch(&self, key: &QueryKey, entry: &mut Entry) {
        let Some(fetcher) = entry.fetcher.clone() else {
            return;
        };
        entry.seq += 1;
        entry.fetching = true;
        if entry.data.is_none() {
            entry.status = QueryStatus::Loading;
        }
        entry.notify();

        debug!(key = %key, seq = entry.seq, "Dispatching fetch");
        let tag = FetchTag {
            generation: entry.generation,
            seq: entry.seq,
        };
        tokio::spawn(run_fetch(
            Arc::downgrade(&self.shared),
            key.clone(),
            tag,
            fetcher,
            self.shared.config.retry,
        ));
    }

    pub fn state<T: Any + Send + Sync>(&self, key: &QueryKey) -> QueryState<T> {
        let now = Instant::now();
        self.shared
            .entries()
            .get(key)
            .map(|entry| entry.view(key, now))
            .unwrap_or_else(QueryState::idle)
    }

    pub fn get_query_data<T: Any + Send + Sync>(&self, key: &QueryKey) -> Option<Arc<T>> {
        self.state::<T>(key).data
    }

    /// Write a value as if it had just been fetched.
    pub fn set_query_data<T: Send + Sync + 'static>(&self, key: QueryKey, data: T) {
        let now = Instant::now();
        let mut entries = self.shared.entries();
        collect_garbage_locked(&mut entries, now);

        let entry = entries
            .entry(key)
            .or_insert_with(|| self.shared.new_entry(now));
        entry.data = Some(Arc::new(data));
        entry.status = QueryStatus::Success;
        entry.fetched_at = Some(now);
        entry.stale_after = now + entry.stale_time;
        entry.invalidated = false;
        entry.error = None;
        entry.notify();
    }

    /// Mark every entry whose key starts with `prefix` as stale. Entries with
    /// subscribers are refetched right away; the rest on their next query.
    pub fn invalidate(&self, prefix: &QueryKey) -> usize {
        self.invalidate_where(|key| key.starts_with(prefix))
    }

    pub fn invalidate_exact(&self, key: &QueryKey) -> usize {
        self.invalidate_where(|candidate| candidate == key)
    }

    fn invalidate_where(&self, matches: impl Fn(&QueryKey) -> bool) -> usize {
        let now = Instant::now();
        let mut entries = self.shared.entries();
        let mut count = 0;
        for (key, entry) in entries.iter_mut().filter(|(key, _)| matches(*key)) {
            count += 1;
            entry.mark_stale(now);
            if entry.subscriber_count > 0 && entry.fetcher.is_some() {
                self.start_fetch(key, entry);
            } else {
                entry.notify();
            }
        }
        debug!(count, "Invalidated queries");
        count
    }

    /// Make the pending fetch for `key` (if any) discardable. Returns whether
    /// a fetch was pending.
    pub fn cancel_in_flight(&self, key: &QueryKey) -> bool {
        match self.shared.entries().get_mut(key) {
            Some(entry) if entry.fetching => {
                entry.cancel(key);
                true
            }
            _ => false,
        }
    }

    /// Cancel in-flight fetches on every entry under any of `prefixes`.
    pub(crate) fn cancel_matching(entries: &mut HashMap<QueryKey, Entry>, prefixes: &[QueryKey]) {
        for (key, entry) in entries.iter_mut() {
            if entry.fetching && prefixes.iter().any(|prefix| key.starts_with(prefix)) {
                entry.cancel(key);
            }
        }
    }

    /// Start a new fetch for `key`, superseding any in-flight one.
    pub fn refetch(&self, key: &QueryKey) -> bool {
        let mut entries = self.shared.entries();
        match entries.get_mut(key) {
            Some(entry) if entry.fetcher.is_some() => {
                self.start_fetch(key, entry);
                true
            }
            _ => false,
        }
    }

    /// Release a subscription taken on the entry of `generation`. A handle
    /// that outlived its entry (removed or cleared) leaves the key's
    /// current entry alone.
    pub(crate) fn unsubscribe(&self, key: &QueryKey, generation: u64) {
        let now = Instant::now();
        let gc_time = self.shared.config.gc_time;
        let mut entries = self.shared.entries();
        match entries.get_mut(key) {
            Some(entry) if entry.generation == generation => {
                entry.subscriber_count = entry.subscriber_count.saturating_sub(1);
                entry.retain_until = now + gc_time;
            }
            _ => debug!(key = %key, generation, "Handle outlived its entry"),
        }
    }

    pub fn subscriber_count(&self, key: &QueryKey) -> usize {
        self.shared
            .entries()
            .get(key)
            .map(|entry| entry.subscriber_count)
            .unwrap_or(0)
    }

    pub fn contains(&self, key: &QueryKey) -> bool {
        self.shared.entries().contains_key(key)
    }

    pub fn remove(&self, key: &QueryKey) -> bool {
        self.shared.entries().remove(key).is_some()
    }

    pub fn clear(&self) {
        self.shared.entries().clear();
    }

    pub fn len(&self) -> usize {
        self.shared.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove unsubscribed entries whose retention window has passed.
    pub fn collect_garbage(&self) -> usize {
        self.shared.collect_garbage()
    }

    /// Sweep unused entries every `interval`. The task ends once every
    /// clone of this client has been dropped.
    pub fn spawn_gc(&self, interval: Duration) -> JoinHandle<()> {
        let weak = Arc::downgrade(&self.shared);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval.max(MIN_SWEEP_INTERVAL));
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(shared) = weak.upgrade() else {
                    break;
                };
                let removed = shared.collect_garbage();
                if removed > 0 {
                    debug!(removed, "Query cache sweep");
                }
            }
        })
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::oneshot;

    fn key(name: &str) -> QueryKey {
        QueryKey::new(name)
    }

    /// Fetch function that counts its invocations and returns `value`
    /// after `delay`.
    fn counting(
        calls: &Arc<AtomicUsize>,
        value: u32,
        delay: Duration,
    ) -> impl Fn() -> BoxFuture<'static, Result<u32, ApiError>> + Send + Sync + 'static {
        let calls = Arc::clone(calls);
        move || {
            calls.fetch_add(1, Ordering::SeqCst);
            async move {
                tokio::time::sleep(delay).await;
                Ok(value)
            }
            .boxed()
        }
    }

    /// Fetch function that always fails with `status`.
    fn failing(
        calls: &Arc<AtomicUsize>,
        status: Option<u16>,
    ) -> impl Fn() -> BoxFuture<'static, Result<u32, ApiError>> + Send + Sync + 'static {
        let calls = Arc::clone(calls);
        move || {
            calls.fetch_add(1, Ordering::SeqCst);
            async move {
                Err(match status {
                    Some(status) => ApiError::from_status(status, ""),
                    None => ApiError::network("connection reset"),
                })
            }
            .boxed()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_query_loads_then_succeeds() {
        let client = QueryClient::default();
        let calls = Arc::new(AtomicUsize::new(0));

        let mut handle = client.query(key("clients"), counting(&calls, 1, Duration::from_millis(10)), QueryOptions::default());
        let state = handle.state();
        assert!(state.is_loading());
        assert!(state.data.is_none());

        let state = handle.settled().await;
        assert!(state.is_success());
        assert_eq!(state.data.as_deref(), Some(&1));
        assert!(state.fetched_at.is_some());
        assert!(state.error.is_none());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_queries_coalesce() {
        let client = QueryClient::default();
        let calls = Arc::new(AtomicUsize::new(0));

        let mut handles: Vec<_> = (0..5)
            .map(|_| client.query(key("cases"), counting(&calls, 9, Duration::from_millis(50)), QueryOptions::default()))
            .collect();
        assert_eq!(client.subscriber_count(&key("cases")), 5);

        for handle in handles.iter_mut() {
            let state = handle.settled().await;
            assert_eq!(state.data.as_deref(), Some(&9));
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fresh_entry_not_refetched() {
        let client = QueryClient::default();
        let calls = Arc::new(AtomicUsize::new(0));

        client.fetch(key("tasks"), counting(&calls, 1, Duration::ZERO)).await.unwrap();
        tokio::time::advance(Duration::from_secs(60)).await;

        let handle = client.query(key("tasks"), counting(&calls, 2, Duration::ZERO), QueryOptions::default());
        let state = handle.state();
        assert_eq!(state.data.as_deref(), Some(&1));
        assert!(!state.is_fetching);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_entry_served_while_revalidating() {
        let client = QueryClient::default();
        let calls = Arc::new(AtomicUsize::new(0));

        client.fetch(key("tasks"), counting(&calls, 1, Duration::ZERO)).await.unwrap();
        tokio::time::advance(Duration::from_secs(5 * 60)).await;

        let mut handle = client.query(key("tasks"), counting(&calls, 2, Duration::from_millis(100)), QueryOptions::default());
        let state = handle.state();
        assert_eq!(state.data.as_deref(), Some(&1));
        assert!(state.is_success());
        assert!(state.is_fetching);

        let state = handle.settled().await;
        assert_eq!(state.data.as_deref(), Some(&2));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_per_query_stale_time_override() {
        let client = QueryClient::default();
        let calls = Arc::new(AtomicUsize::new(0));

        client.fetch(key("notifications"), counting(&calls, 1, Duration::ZERO)).await.unwrap();
        tokio::time::advance(Duration::from_secs(31)).await;

        let options = QueryOptions::default().with_stale_time(Duration::from_secs(30));
        let mut handle = client.query(key("notifications"), counting(&calls, 2, Duration::ZERO), options);
        assert!(handle.state().is_fetching);
        assert_eq!(handle.settled().await.data.as_deref(), Some(&2));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_disabled_query_never_fetches() {
        let client = QueryClient::default();
        let calls = Arc::new(AtomicUsize::new(0));

        let mut handle = client.query(key("caseDetails"), counting(&calls, 1, Duration::ZERO), QueryOptions::enabled(false));
        let state = handle.settled().await;
        assert_eq!(state.status, QueryStatus::Idle);
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        // Cached data stays visible to a disabled query
        client.set_query_data(key("caseDetails"), 5u32);
        tokio::time::advance(Duration::from_secs(600)).await;
        let handle = client.query(key("caseDetails"), counting(&calls, 1, Duration::ZERO), QueryOptions::enabled(false));
        assert_eq!(handle.data().as_deref(), Some(&5));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_client_error_not_retried() {
        let client = QueryClient::default();
        let calls = Arc::new(AtomicUsize::new(0));

        let err = client.fetch(key("clients"), failing(&calls, Some(404))).await.unwrap_err();
        assert_eq!(err.status, Some(404));
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let state = client.state::<u32>(&key("clients"));
        assert!(state.is_error());
        assert_eq!(state.error.map(|e| e.status), Some(Some(404)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_server_error_retried_twice_with_backoff() {
        let client = QueryClient::default();
        let calls = Arc::new(AtomicUsize::new(0));
        let started = Instant::now();

        let err = client.fetch(key("deadlines"), failing(&calls, Some(503))).await.unwrap_err();
        assert_eq!(err.status, Some(503));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        // 1s + 2s of backoff
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_secs(3) && elapsed < Duration::from_secs(4));
    }

    #[tokio::test(start_paused = true)]
    async fn test_network_error_retried() {
        let client = QueryClient::new(QueryConfig::default().with_retry(RetryPolicy::queries().with_max_retries(1)));
        let calls = Arc::new(AtomicUsize::new(0));

        let err = client.fetch(key("documents"), failing(&calls, None)).await.unwrap_err();
        assert_eq!(err.status, None);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_error_keeps_previous_data() {
        let client = QueryClient::new(QueryConfig::default().with_retry(RetryPolicy::never()));
        let calls = Arc::new(AtomicUsize::new(0));

        client.fetch(key("notes"), counting(&calls, 4, Duration::ZERO)).await.unwrap();
        client.invalidate(&key("notes"));
        let result = client.fetch(key("notes"), failing(&calls, Some(500))).await;
        assert!(result.is_err());

        let state = client.state::<u32>(&key("notes"));
        assert!(state.is_error());
        assert_eq!(state.data.as_deref(), Some(&4));

        // The next success clears the error
        client.invalidate(&key("notes"));
        client.fetch(key("notes"), counting(&calls, 5, Duration::ZERO)).await.unwrap();
        let state = client.state::<u32>(&key("notes"));
        assert!(state.is_success());
        assert!(state.error.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalidate_prefix_refetches_subscribed_entries() {
        let client = QueryClient::default();
        let calls = Arc::new(AtomicUsize::new(0));

        let mut subscribed = client.query(key("cases").with(1), counting(&calls, 1, Duration::ZERO), QueryOptions::default());
        subscribed.settled().await;
        client.fetch(key("cases").with(2), counting(&calls, 1, Duration::ZERO)).await.unwrap();
        client.fetch(key("clients"), counting(&calls, 1, Duration::ZERO)).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 3);

        assert_eq!(client.invalidate(&key("cases")), 2);
        // Only the subscribed entry refetches immediately
        assert!(subscribed.state().is_fetching);
        assert!(!client.state::<u32>(&key("cases").with(2)).is_fetching);
        assert!(client.state::<u32>(&key("cases").with(2)).is_stale);
        assert!(!client.state::<u32>(&key("clients")).is_stale);

        subscribed.settled().await;
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalidate_exact_skips_longer_keys() {
        let client = QueryClient::default();
        client.set_query_data(key("notifications"), 1u32);
        client.set_query_data(key("notifications").with("unreadCount"), 3u32);

        assert_eq!(client.invalidate_exact(&key("notifications")), 1);
        assert!(client.state::<u32>(&key("notifications")).is_stale);
        assert!(!client.state::<u32>(&key("notifications").with("unreadCount")).is_stale);
    }

    #[tokio::test(start_paused = true)]
    async fn test_superseded_result_discarded() {
        let client = QueryClient::default();
        let (tx_a, rx_a) = oneshot::channel::<u32>();
        let (tx_b, rx_b) = oneshot::channel::<u32>();
        let receivers = Arc::new(Mutex::new(vec![rx_b, rx_a]));

        let fetch = {
            let receivers = Arc::clone(&receivers);
            move || {
                let rx = receivers.lock().unwrap().pop().unwrap();
                async move { rx.await.map_err(|_| ApiError::network("dropped")) }.boxed()
            }
        };

        let mut handle = client.query(key("deadlines"), fetch, QueryOptions::default());
        // Fetch A is in flight; dispatch B over it
        assert!(client.refetch(&key("deadlines")));

        tx_b.send(2).unwrap();
        tokio::task::yield_now().await;
        let state = handle.settled().await;
        assert_eq!(state.data.as_deref(), Some(&2));

        // A resolves late and must not overwrite B
        tx_a.send(1).unwrap();
        tokio::task::yield_now().await;
        assert_eq!(handle.data().as_deref(), Some(&2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_fetch_result_discarded() {
        let client = QueryClient::default();
        let calls = Arc::new(AtomicUsize::new(0));
        client.set_query_data(key("tasks"), 1u32);
        client.invalidate(&key("tasks"));

        let handle = client.query(key("tasks"), counting(&calls, 2, Duration::from_secs(1)), QueryOptions::default());
        assert!(handle.state().is_fetching);
        assert!(client.cancel_in_flight(&key("tasks")));
        assert!(!client.cancel_in_flight(&key("tasks")));

        tokio::time::sleep(Duration::from_secs(2)).await;
        let state = handle.state();
        assert_eq!(state.data.as_deref(), Some(&1));
        assert!(!state.is_fetching);
        assert!(state.is_success());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_before_first_result_returns_to_idle() {
        let client = QueryClient::default();
        let calls = Arc::new(AtomicUsize::new(0));

        let handle = client.query(key("activities"), counting(&calls, 2, Duration::from_secs(1)), QueryOptions::default());
        assert!(handle.state().is_loading());
        client.cancel_in_flight(&key("activities"));
        assert_eq!(handle.state().status, QueryStatus::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unused_entries_collected_after_retention() {
        let client = QueryClient::default();
        let calls = Arc::new(AtomicUsize::new(0));

        let handle = client.query(key("client").with(3), counting(&calls, 1, Duration::ZERO), QueryOptions::default());
        tokio::task::yield_now().await;
        tokio::time::advance(Duration::from_secs(3600)).await;
        // Subscribed entries are never collected
        assert_eq!(client.collect_garbage(), 0);

        drop(handle);
        assert_eq!(client.subscriber_count(&key("client").with(3)), 0);
        tokio::time::advance(Duration::from_secs(10 * 60)).await;
        assert_eq!(client.collect_garbage(), 0);
        tokio::time::advance(Duration::from_millis(1)).await;
        assert_eq!(client.collect_garbage(), 1);
        assert!(client.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_handle_drop_leaves_new_entry_subscribed() {
        let client = QueryClient::default();
        let calls = Arc::new(AtomicUsize::new(0));

        let old = client.query(key("clients"), counting(&calls, 1, Duration::from_secs(1)), QueryOptions::default());
        client.clear();
        let mut current = client.query(key("clients"), counting(&calls, 2, Duration::from_secs(5)), QueryOptions::default());

        // The cleared entry's fetch carries the same seq but must not land
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(current.data().is_none());
        assert!(current.state().is_fetching);
        current.settled().await;

        drop(old);
        assert_eq!(client.subscriber_count(&key("clients")), 1);

        tokio::time::advance(Duration::from_secs(11 * 60)).await;
        assert_eq!(client.collect_garbage(), 0);
        assert_eq!(current.data().as_deref(), Some(&2));

        drop(current);
        assert_eq!(client.subscriber_count(&key("clients")), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_lazy_collection_on_next_query() {
        let client = QueryClient::default();
        let calls = Arc::new(AtomicUsize::new(0));

        client.fetch(key("a"), counting(&calls, 1, Duration::ZERO)).await.unwrap();
        tokio::time::advance(Duration::from_secs(11 * 60)).await;
        assert!(client.contains(&key("a")));

        let _b = client.query(key("b"), counting(&calls, 1, Duration::ZERO), QueryOptions::default());
        assert!(!client.contains(&key("a")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_background_gc_sweeps() {
        let client = QueryClient::new(QueryConfig::default().with_gc_time(Duration::from_secs(10)));
        client.set_query_data(key("x"), 1u32);
        let sweeper = client.spawn_gc(Duration::from_secs(5));

        tokio::time::sleep(Duration::from_secs(16)).await;
        assert!(client.is_empty());
        sweeper.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn test_type_mismatch_reads_as_absent() {
        let client = QueryClient::default();
        client.set_query_data(key("x"), 1u32);
        assert_eq!(client.get_query_data::<u32>(&key("x")).as_deref(), Some(&1));
        assert!(client.get_query_data::<String>(&key("x")).is_none());
    }
}
