//! Writes with optimistic cache updates and rollback.
//!
//! A mutation runs in three steps. Before the server call it cancels
//! in-flight fetches on its target keys, snapshots their data and applies the
//! optimistic patch. On success the targets are invalidated so the server's
//! version replaces the patch. On failure every snapshotted entry gets its
//! exact prior value back before the targets are invalidated.

use std::any::Any;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt};
use tokio::sync::watch;
use tracing::{debug, warn};

use super::client::AnyData;
use super::{QueryClient, QueryKey};
use crate::api::ApiError;

type Patch = Arc<dyn Fn(&AnyData) -> Option<AnyData> + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MutationStatus {
    #[default]
    Idle,
    Pending,
    Success,
    Error,
}

/// Which cache entries a mutation touches and how.
#[derive(Clone, Default)]
pub struct MutationOptions {
    patches: Vec<(QueryKey, Patch)>,
    invalidates: Vec<QueryKey>,
}

impl MutationOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Patch every cached `T` under `prefix` before the server call.
    /// Entries under the prefix holding another type are left untouched.
    pub fn optimistic<T, F>(mut self, prefix: QueryKey, patch: F) -> Self
    where
        T: Any + Send + Sync,
        F: Fn(&T) -> T + Send + Sync + 'static,
    {
        let patch: Patch = Arc::new(move |data: &AnyData| {
            Arc::clone(data)
                .downcast::<T>()
                .ok()
                .map(|prior| Arc::new(patch(&prior)) as AnyData)
        });
        self.patches.push((prefix, patch));
        self
    }

    /// Revalidate everything under `prefix` once the mutation settles.
    pub fn invalidates(mut self, prefix: QueryKey) -> Self {
        self.invalidates.push(prefix);
        self
    }

    /// Patched prefixes followed by invalidation-only prefixes, deduplicated.
    pub fn target_keys(&self) -> Vec<QueryKey> {
        let mut keys: Vec<QueryKey> = Vec::new();
        for key in self.patches.iter().map(|(key, _)| key).chain(&self.invalidates) {
            if !keys.contains(key) {
                keys.push(key.clone());
            }
        }
        keys
    }
}

/// Book-keeping for one mutation in progress.
pub struct MutationRecord {
    target_keys: Vec<QueryKey>,
    snapshot: HashMap<QueryKey, AnyData>,
    status: MutationStatus,
}

impl MutationRecord {
    pub fn target_keys(&self) -> &[QueryKey] {
        &self.target_keys
    }

    pub fn status(&self) -> MutationStatus {
        self.status
    }

    /// Keys whose prior data is held for rollback
    pub fn snapshot_keys(&self) -> impl Iterator<Item = &QueryKey> {
        self.snapshot.keys()
    }
}

/// Rolls the cache back if a mutation's future is dropped before it
/// settles (timeout, `select!`, task abort).
struct PendingMutation<'a> {
    client: &'a QueryClient,
    record: MutationRecord,
}

impl Drop for PendingMutation<'_> {
    fn drop(&mut self) {
        if self.record.status == MutationStatus::Pending {
            warn!(restored = self.record.snapshot.len(), "Mutation dropped before settling, rolling back");
            self.client.restore(&mut self.record);
        }
    }
}

impl QueryClient {
    /// Run `effect` as a mutation described by `options`.
    ///
    /// The effect is retried under the client's mutation retry policy. The
    /// cache is patched before the first attempt and either revalidated or
    /// rolled back after the last. Dropping the future before it completes
    /// rolls back as well.
    pub async fn mutate<R, F, Fut>(&self, mut effect: F, options: MutationOptions) -> Result<R, ApiError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<R, ApiError>>,
    {
        let mut pending = PendingMutation {
            client: self,
            record: self.begin_mutation(&options),
        };
        let policy = self.config().mutation_retry;

        let mut failures = 0;
        let result = loop {
            match effect().await {
                Ok(value) => break Ok(value),
                Err(error) if policy.should_retry(failures, &error) => {
                    let delay = policy.delay(failures);
                    failures += 1;
                    warn!(
                        attempt = failures,
                        delay_ms = delay.as_millis() as u64,
                        error = %error,
                        "Mutation failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(error) => break Err(error),
            }
        };

        match &result {
            Ok(_) => self.commit_mutation(&mut pending.record),
            Err(error) => self.rollback_mutation(&mut pending.record, error),
        }
        result
    }

    /// Cancel, snapshot and patch under a single lock so no fetch result can
    /// land between the snapshot and the patch.
    pub fn begin_mutation(&self, options: &MutationOptions) -> MutationRecord {
        let target_keys = options.target_keys();
        let mut snapshot = HashMap::new();

        let mut entries = self.shared.entries();
        QueryClient::cancel_matching(&mut entries, &target_keys);

        for (prefix, patch) in &options.patches {
            for (key, entry) in entries.iter_mut().filter(|(key, _)| key.starts_with(prefix)) {
                let Some(prior) = entry.data.clone() else {
                    continue;
                };
                let Some(next) = patch(&prior) else {
                    continue;
                };
                snapshot.entry(key.clone()).or_insert(prior);
                entry.data = Some(next);
                entry.notify();
            }
        }
        drop(entries);

        debug!(targets = target_keys.len(), patched = snapshot.len(), "Mutation started");
        MutationRecord {
            target_keys,
            snapshot,
            status: MutationStatus::Pending,
        }
    }

    pub fn commit_mutation(&self, record: &mut MutationRecord) {
        record.snapshot.clear();
        record.status = MutationStatus::Success;
        for key in &record.target_keys {
            self.invalidate(key);
        }
    }

    /// Put every snapshotted value back, then revalidate the targets.
    pub fn rollback_mutation(&self, record: &mut MutationRecord, error: &ApiError) {
        warn!(error = %error, restored = record.snapshot.len(), "Mutation failed, rolling back");
        self.restore(record);
    }

    fn restore(&self, record: &mut MutationRecord) {
        {
            let mut entries = self.shared.entries();
            for (key, prior) in record.snapshot.drain() {
                if let Some(entry) = entries.get_mut(&key) {
                    entry.data = Some(prior);
                    entry.notify();
                }
            }
        }
        record.status = MutationStatus::Error;
        for key in &record.target_keys {
            self.invalidate(key);
        }
    }
}

/// Observable state of a [`Mutation`].
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MutationState {
    pub status: MutationStatus,
    pub error: Option<ApiError>,
}

type Effect<I, R> = Arc<dyn Fn(I) -> BoxFuture<'static, Result<R, ApiError>> + Send + Sync>;
type Plan<I> = Arc<dyn Fn(&I) -> MutationOptions + Send + Sync>;

/// A reusable write bound to a client: an effect plus the cache plan
/// derived from each input.
pub struct Mutation<I, R> {
    client: QueryClient,
    effect: Effect<I, R>,
    plan: Plan<I>,
    state: watch::Sender<MutationState>,
}

impl<I, R> Mutation<I, R>
where
    I: Clone + Send + 'static,
    R: Send + 'static,
{
    pub fn new<F, Fut>(client: &QueryClient, effect: F) -> Self
    where
        F: Fn(I) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R, ApiError>> + Send + 'static,
    {
        let (state, _) = watch::channel(MutationState::default());
        Self {
            client: client.clone(),
            effect: Arc::new(move |input: I| effect(input).boxed()),
            plan: Arc::new(|_: &I| MutationOptions::new()),
            state,
        }
    }

    pub fn with_plan<P>(mut self, plan: P) -> Self
    where
        P: Fn(&I) -> MutationOptions + Send + Sync + 'static,
    {
        self.plan = Arc::new(plan);
        self
    }

    /// The cache plan `input` would run under.
    pub fn plan_for(&self, input: &I) -> MutationOptions {
        (self.plan)(input)
    }

    pub async fn mutate(&self, input: I) -> Result<R, ApiError> {
        self.state.send_replace(MutationState {
            status: MutationStatus::Pending,
            error: None,
        });

        let options = (self.plan)(&input);
        let effect = Arc::clone(&self.effect);
        let result = self
            .client
            .mutate(move || effect(input.clone()), options)
            .await;

        self.state.send_replace(match &result {
            Ok(_) => MutationState {
                status: MutationStatus::Success,
                error: None,
            },
            Err(error) => MutationState {
                status: MutationStatus::Error,
                error: Some(error.clone()),
            },
        });
        result
    }

    pub fn status(&self) -> MutationStatus {
        self.state.borrow().status
    }

    pub fn is_pending(&self) -> bool {
        self.status() == MutationStatus::Pending
    }

    pub fn error(&self) -> Option<ApiError> {
        self.state.borrow().error.clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<MutationState> {
        self.state.subscribe()
    }

    /// Back to idle, clearing any error
    pub fn reset(&self) {
        self.state.send_replace(MutationState::default());
    }
}

// ============================================================================
// Tests
// ============================================================================
