use std::sync::Arc;

use anyhow::{Context, Result};
use serde::{de::DeserializeOwned, Serialize};
use tokio::sync::watch;
use tracing::{debug, warn};

use super::Storage;

/// State that is partly written to durable storage.
///
/// `Persisted` names the stored subset. It should be
/// `#[serde(default)]` so missing fields fall back to their defaults;
/// unknown fields are ignored by serde.
pub trait Persist: Default + Clone + Send + Sync + 'static {
    type Persisted: Serialize + DeserializeOwned;

    /// Namespaced storage key
    const STORAGE_KEY: &'static str;

    fn persisted(&self) -> Self::Persisted;

    /// Full state from a stored subset; everything else starts at default.
    fn rehydrate(persisted: Self::Persisted) -> Self;
}

/// In-memory state with write-through persistence of its declared subset.
///
/// Every update is applied in memory and published to subscribers before
/// the stored copy is rewritten. A failed write is logged; the in-memory
/// state stays authoritative.
pub struct PersistedStore<S: Persist> {
    state: watch::Sender<S>,
    storage: Arc<dyn Storage>,
}

impl<S: Persist> PersistedStore<S> {
    /// Rehydrate from `storage`. Missing or unreadable state yields defaults.
    pub fn load(storage: Arc<dyn Storage>) -> Self {
        let initial = match Self::read(storage.as_ref()) {
            Ok(Some(persisted)) => {
                debug!(key = S::STORAGE_KEY, "Rehydrated persisted state");
                S::rehydrate(persisted)
            }
            Ok(None) => S::default(),
            Err(e) => {
                warn!(key = S::STORAGE_KEY, error = %e, "Discarding unreadable persisted state");
                S::default()
            }
        };
        let (state, _) = watch::channel(initial);
        Self { state, storage }
    }

    fn read(storage: &dyn Storage) -> Result<Option<S::Persisted>> {
        let Some(raw) = storage.get_item(S::STORAGE_KEY)? else {
            return Ok(None);
        };
        let persisted = serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse persisted state: {}", S::STORAGE_KEY))?;
        Ok(Some(persisted))
    }

    pub fn snapshot(&self) -> S {
        self.state.borrow().clone()
    }

    /// Read without cloning the whole state.
    pub fn read_with<R>(&self, f: impl FnOnce(&S) -> R) -> R {
        f(&self.state.borrow())
    }

    pub fn subscribe(&self) -> watch::Receiver<S> {
        self.state.subscribe()
    }

    /// Apply `f`, notify subscribers, then write the persisted subset.
    pub fn update(&self, f: impl FnOnce(&mut S)) {
        self.state.send_modify(f);
        self.write_through();
    }

    fn write_through(&self) {
        let persisted = self.state.borrow().persisted();
        if let Err(e) = self.save(&persisted) {
            warn!(key = S::STORAGE_KEY, error = %e, "Failed to persist state");
        }
    }

    fn save(&self, persisted: &S::Persisted) -> Result<()> {
        let contents = serde_json::to_string(persisted)
            .with_context(|| format!("Failed to serialize state: {}", S::STORAGE_KEY))?;
        self.storage.set_item(S::STORAGE_KEY, &contents)
    }
}
