use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use super::{Persist, PersistedStore, Storage};

/// Most recent unique searches kept in history
const SEARCH_HISTORY_LIMIT: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuickAddKind {
    Case,
    Client,
    Deadline,
    Task,
}

/// Presentation preferences plus transient UI flags.
#[derive(Debug, Clone, PartialEq)]
pub struct UiState {
    pub sidebar_open: bool,
    pub sidebar_collapsed: bool,
    pub dark_mode: bool,
    pub search_history: Vec<String>,

    pub unread_notifications_count: u64,
    pub notifications_panel_open: bool,
    pub search_open: bool,
    pub quick_add_open: bool,
    pub quick_add_kind: Option<QuickAddKind>,
    pub global_loading: bool,
    pub loading_message: String,
}

impl Default for UiState {
    fn default() -> Self {
        Self {
            sidebar_open: true,
            sidebar_collapsed: false,
            dark_mode: false,
            search_history: Vec::new(),
            unread_notifications_count: 0,
            notifications_panel_open: false,
            search_open: false,
            quick_add_open: false,
            quick_add_kind: None,
            global_loading: false,
            loading_message: String::new(),
        }
    }
}

/// The persisted subset of [`UiState`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UiPreferences {
    pub sidebar_open: bool,
    pub sidebar_collapsed: bool,
    pub dark_mode: bool,
    pub search_history: Vec<String>,
}

impl Default for UiPreferences {
    fn default() -> Self {
        UiState::default().persisted()
    }
}

impl Persist for UiState {
    type Persisted = UiPreferences;
    const STORAGE_KEY: &'static str = "docket-ui-storage";

    fn persisted(&self) -> UiPreferences {
        UiPreferences {
            sidebar_open: self.sidebar_open,
            sidebar_collapsed: self.sidebar_collapsed,
            dark_mode: self.dark_mode,
            search_history: self.search_history.clone(),
        }
    }

    fn rehydrate(persisted: UiPreferences) -> Self {
        Self {
            sidebar_open: persisted.sidebar_open,
            sidebar_collapsed: persisted.sidebar_collapsed,
            dark_mode: persisted.dark_mode,
            search_history: persisted.search_history,
            ..Self::default()
        }
    }
}

pub struct UiStore {
    store: PersistedStore<UiState>,
}

impl UiStore {
    pub fn load(storage: Arc<dyn Storage>) -> Self {
        Self {
            store: PersistedStore::load(storage),
        }
    }

    pub fn snapshot(&self) -> UiState {
        self.store.snapshot()
    }

    pub fn subscribe(&self) -> watch::Receiver<UiState> {
        self.store.subscribe()
    }

    pub fn toggle_sidebar(&self) {
        self.store.update(|s| s.sidebar_open = !s.sidebar_open);
    }

    pub fn set_sidebar_open(&self, open: bool) {
        self.store.update(|s| s.sidebar_open = open);
    }

    pub fn toggle_sidebar_collapse(&self) {
        self.store.update(|s| s.sidebar_collapsed = !s.sidebar_collapsed);
    }

    pub fn toggle_dark_mode(&self) {
        self.store.update(|s| s.dark_mode = !s.dark_mode);
    }

    pub fn set_dark_mode(&self, enabled: bool) {
        self.store.update(|s| s.dark_mode = enabled);
    }

    pub fn set_unread_notifications_count(&self, count: u64) {
        self.store.update(|s| s.unread_notifications_count = count);
    }

    pub fn toggle_notifications_panel(&self) {
        self.store
            .update(|s| s.notifications_panel_open = !s.notifications_panel_open);
    }

    pub fn set_search_open(&self, open: bool) {
        self.store.update(|s| s.search_open = open);
    }

    /// Record a search at the front of the history. Empty queries and
    /// queries already in the history are ignored.
    pub fn add_search_history(&self, query: &str) {
        if query.is_empty() || self.store.read_with(|s| s.search_history.iter().any(|q| q == query)) {
            return;
        }
        self.store.update(|s| {
            s.search_history.insert(0, query.to_string());
            s.search_history.truncate(SEARCH_HISTORY_LIMIT);
        });
    }

    pub fn clear_search_history(&self) {
        self.store.update(|s| s.search_history.clear());
    }

    pub fn set_quick_add_open(&self, open: bool, kind: Option<QuickAddKind>) {
        self.store.update(|s| {
            s.quick_add_open = open;
            s.quick_add_kind = kind;
        });
    }

    pub fn set_global_loading(&self, loading: bool, message: Option<&str>) {
        self.store.update(|s| {
            s.global_loading = loading;
            s.loading_message = message.unwrap_or_default().to_string();
        });
    }

    pub fn reset_ui(&self) {
        self.store.update(|s| *s = UiState::default());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStorage;
    use serde_json::Value;

    #[test]
    fn test_transient_fields_not_persisted() {
        let storage = Arc::new(MemoryStorage::new());
        let ui = UiStore::load(storage.clone());
        ui.set_global_loading(true, Some("Syncing"));
        ui.set_dark_mode(true);
        ui.set_unread_notifications_count(4);

        let raw = storage.get_item(UiState::STORAGE_KEY).unwrap().unwrap();
        let stored: Value = serde_json::from_str(&raw).unwrap();
        assert!(stored.get("globalLoading").is_none());
        assert!(stored.get("loadingMessage").is_none());
        assert!(stored.get("unreadNotificationsCount").is_none());
        assert_eq!(stored["darkMode"], Value::Bool(true));

        let reloaded = UiStore::load(storage).snapshot();
        assert!(reloaded.dark_mode);
        assert!(!reloaded.global_loading);
        assert_eq!(reloaded.loading_message, "");
        assert_eq!(reloaded.unread_notifications_count, 0);
    }

    #[test]
    fn test_search_history_unique_and_bounded() {
        let ui = UiStore::load(Arc::new(MemoryStorage::new()));
        ui.add_search_history("");
        for i in 0..12 {
            ui.add_search_history(&format!("query {}", i));
        }
        ui.add_search_history("query 11");

        let history = ui.snapshot().search_history;
        assert_eq!(history.len(), 10);
        assert_eq!(history[0], "query 11");
        assert_eq!(history[9], "query 2");

        ui.clear_search_history();
        assert!(ui.snapshot().search_history.is_empty());
    }

    #[test]
    fn test_partial_stored_state_uses_defaults() {
        let storage = Arc::new(MemoryStorage::new());
        storage.set_item(UiState::STORAGE_KEY, r#"{"sidebarCollapsed":true}"#).unwrap();
        let state = UiStore::load(storage).snapshot();
        assert!(state.sidebar_collapsed);
        assert!(state.sidebar_open);
    }

    #[test]
    fn test_toggles_and_reset() {
        let ui = UiStore::load(Arc::new(MemoryStorage::new()));
        ui.toggle_sidebar();
        ui.toggle_sidebar_collapse();
        ui.toggle_dark_mode();
        ui.toggle_notifications_panel();
        ui.set_search_open(true);
        ui.set_quick_add_open(true, Some(QuickAddKind::Deadline));

        let state = ui.snapshot();
        assert!(!state.sidebar_open);
        assert!(state.sidebar_collapsed);
        assert!(state.dark_mode);
        assert!(state.notifications_panel_open);
        assert!(state.search_open);
        assert_eq!(state.quick_add_kind, Some(QuickAddKind::Deadline));

        ui.set_quick_add_open(false, None);
        assert_eq!(ui.snapshot().quick_add_kind, None);

        ui.reset_ui();
        assert_eq!(ui.snapshot(), UiState::default());
    }
}
