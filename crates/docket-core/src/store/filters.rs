use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use super::{Persist, PersistedStore, Storage};
use crate::models::{CaseQuery, CaseStatus, DeadlineQuery, TaskQuery, TaskStatus};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CaseStatusFilter {
    #[default]
    All,
    Open,
    PendingHearing,
    UnderAppeal,
    Closed,
}

impl CaseStatusFilter {
    pub fn status(self) -> Option<CaseStatus> {
        match self {
            CaseStatusFilter::All => None,
            CaseStatusFilter::Open => Some(CaseStatus::Open),
            CaseStatusFilter::PendingHearing => Some(CaseStatus::PendingHearing),
            CaseStatusFilter::UnderAppeal => Some(CaseStatus::UnderAppeal),
            CaseStatusFilter::Closed => Some(CaseStatus::Closed),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClientTypeFilter {
    #[default]
    All,
    Individual,
    Company,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeadlineStatusFilter {
    #[default]
    All,
    Pending,
    Completed,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatusFilter {
    #[default]
    All,
    Open,
    InProgress,
    Completed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskPriority {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CaseFilters {
    pub status: CaseStatusFilter,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub court_type: Option<String>,
    /// ISO `yyyy-MM-dd`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date_from: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date_to: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub search_term: Option<String>,
}

impl CaseFilters {
    /// The server-side part of the filters
    pub fn to_query(&self) -> CaseQuery {
        CaseQuery {
            status: self.status.status(),
            client_id: self.client_id,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ClientFilters {
    #[serde(rename = "type")]
    pub kind: ClientTypeFilter,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub search_term: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub has_active_cases: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DeadlineFilters {
    pub status: DeadlineStatusFilter,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_days: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub case_id: Option<i64>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
}

impl DeadlineFilters {
    pub fn to_query(&self) -> DeadlineQuery {
        DeadlineQuery {
            case_file_id: self.case_id,
            completed: match self.status {
                DeadlineStatusFilter::All => None,
                DeadlineStatusFilter::Pending => Some(false),
                DeadlineStatusFilter::Completed => Some(true),
            },
            next_days: self.next_days,
            ..DeadlineQuery::default()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TaskFilters {
    pub status: TaskStatusFilter,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assigned_to: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub case_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<TaskPriority>,
}

impl TaskFilters {
    pub fn to_query(&self) -> TaskQuery {
        TaskQuery {
            case_file_id: self.case_id,
            status: match self.status {
                TaskStatusFilter::All => None,
                TaskStatusFilter::Open => Some(TaskStatus::Open),
                TaskStatusFilter::InProgress => Some(TaskStatus::InProgress),
                TaskStatusFilter::Completed => Some(TaskStatus::Done),
            },
        }
    }
}

/// Current list filters and named presets. Everything is persisted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FiltersState {
    pub case_filters: CaseFilters,
    pub client_filters: ClientFilters,
    pub deadline_filters: DeadlineFilters,
    pub task_filters: TaskFilters,
    pub saved_case_filters: BTreeMap<String, CaseFilters>,
    pub saved_client_filters: BTreeMap<String, ClientFilters>,
}

impl Persist for FiltersState {
    type Persisted = FiltersState;
    const STORAGE_KEY: &'static str = "docket-filters-storage";

    fn persisted(&self) -> FiltersState {
        self.clone()
    }

    fn rehydrate(persisted: FiltersState) -> Self {
        persisted
    }
}

/// Filter state. `set_*` actions take an edit closure that changes only the
/// fields it touches.
pub struct FiltersStore {
    store: PersistedStore<FiltersState>,
}

impl FiltersStore {
    pub fn load(storage: Arc<dyn Storage>) -> Self {
        Self {
            store: PersistedStore::load(storage),
        }
    }

    pub fn snapshot(&self) -> FiltersState {
        self.store.snapshot()
    }

    pub fn subscribe(&self) -> watch::Receiver<FiltersState> {
        self.store.subscribe()
    }

    // ===== Cases =====

    pub fn set_case_filters(&self, edit: impl FnOnce(&mut CaseFilters)) {
        self.store.update(|s| edit(&mut s.case_filters));
    }

    pub fn reset_case_filters(&self) {
        self.store.update(|s| s.case_filters = CaseFilters::default());
    }

    pub fn save_case_filter_preset(&self, name: &str, filters: CaseFilters) {
        self.store.update(|s| {
            s.saved_case_filters.insert(name.to_string(), filters);
        });
    }

    /// Returns false when no preset has that name.
    pub fn apply_case_filter_preset(&self, name: &str) -> bool {
        let Some(preset) = self.store.read_with(|s| s.saved_case_filters.get(name).cloned()) else {
            return false;
        };
        self.store.update(|s| s.case_filters = preset);
        true
    }

    // ===== Clients =====

    pub fn set_client_filters(&self, edit: impl FnOnce(&mut ClientFilters)) {
        self.store.update(|s| edit(&mut s.client_filters));
    }

    pub fn reset_client_filters(&self) {
        self.store.update(|s| s.client_filters = ClientFilters::default());
    }

    pub fn save_client_filter_preset(&self, name: &str, filters: ClientFilters) {
        self.store.update(|s| {
            s.saved_client_filters.insert(name.to_string(), filters);
        });
    }

    pub fn apply_client_filter_preset(&self, name: &str) -> bool {
        let Some(preset) = self.store.read_with(|s| s.saved_client_filters.get(name).cloned()) else {
            return false;
        };
        self.store.update(|s| s.client_filters = preset);
        true
    }

    // ===== Deadlines =====

    pub fn set_deadline_filters(&self, edit: impl FnOnce(&mut DeadlineFilters)) {
        self.store.update(|s| edit(&mut s.deadline_filters));
    }

    pub fn reset_deadline_filters(&self) {
        self.store.update(|s| s.deadline_filters = DeadlineFilters::default());
    }

    // ===== Tasks =====

    pub fn set_task_filters(&self, edit: impl FnOnce(&mut TaskFilters)) {
        self.store.update(|s| edit(&mut s.task_filters));
    }

    pub fn reset_task_filters(&self) {
        self.store.update(|s| s.task_filters = TaskFilters::default());
    }

    /// Reset current filters; saved presets are kept.
    pub fn reset_all_filters(&self) {
        self.store.update(|s| {
            s.case_filters = CaseFilters::default();
            s.client_filters = ClientFilters::default();
            s.deadline_filters = DeadlineFilters::default();
            s.task_filters = TaskFilters::default();
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStorage;

    #[test]
    fn test_defaults_serialize_as_all() {
        let json = serde_json::to_value(FiltersState::default()).unwrap();
        assert_eq!(json["caseFilters"]["status"], "ALL");
        assert_eq!(json["clientFilters"]["type"], "ALL");
        assert_eq!(json["taskFilters"]["status"], "ALL");
    }

    #[test]
    fn test_set_merges_and_reset_is_per_resource() {
        let filters = FiltersStore::load(Arc::new(MemoryStorage::new()));
        filters.set_case_filters(|f| f.status = CaseStatusFilter::Open);
        filters.set_case_filters(|f| f.client_id = Some(4));
        filters.set_task_filters(|f| f.status = TaskStatusFilter::InProgress);

        let state = filters.snapshot();
        assert_eq!(state.case_filters.status, CaseStatusFilter::Open);
        assert_eq!(state.case_filters.client_id, Some(4));

        filters.reset_case_filters();
        let state = filters.snapshot();
        assert_eq!(state.case_filters, CaseFilters::default());
        assert_eq!(state.task_filters.status, TaskStatusFilter::InProgress);
    }

    #[test]
    fn test_presets_survive_reload_and_reset_all() {
        let storage = Arc::new(MemoryStorage::new());
        let filters = FiltersStore::load(storage.clone());
        let closed = CaseFilters {
            status: CaseStatusFilter::Closed,
            ..CaseFilters::default()
        };
        filters.save_case_filter_preset("closed", closed.clone());
        filters.set_deadline_filters(|f| f.next_days = Some(14));
        filters.reset_all_filters();

        let reloaded = FiltersStore::load(storage);
        assert!(!reloaded.apply_case_filter_preset("missing"));
        assert!(reloaded.apply_case_filter_preset("closed"));
        let state = reloaded.snapshot();
        assert_eq!(state.case_filters, closed);
        assert_eq!(state.deadline_filters, DeadlineFilters::default());
    }

    #[test]
    fn test_client_presets() {
        let filters = FiltersStore::load(Arc::new(MemoryStorage::new()));
        let companies = ClientFilters {
            kind: ClientTypeFilter::Company,
            ..ClientFilters::default()
        };
        filters.save_client_filter_preset("companies", companies.clone());
        filters.set_client_filters(|f| f.search_term = Some("acme".to_string()));
        assert!(filters.apply_client_filter_preset("companies"));
        assert_eq!(filters.snapshot().client_filters, companies);

        filters.reset_client_filters();
        assert_eq!(filters.snapshot().client_filters, ClientFilters::default());
    }

    #[test]
    fn test_filters_map_to_server_queries() {
        let cases = CaseFilters {
            status: CaseStatusFilter::Open,
            client_id: Some(2),
            search_term: Some("smith".to_string()),
            ..CaseFilters::default()
        };
        assert_eq!(
            cases.to_query(),
            CaseQuery {
                status: Some(CaseStatus::Open),
                client_id: Some(2)
            }
        );

        let deadlines = DeadlineFilters {
            status: DeadlineStatusFilter::Pending,
            ..DeadlineFilters::default()
        };
        assert_eq!(deadlines.to_query().completed, Some(false));

        let tasks = TaskFilters {
            status: TaskStatusFilter::Completed,
            ..TaskFilters::default()
        };
        assert_eq!(tasks.to_query().status, Some(TaskStatus::Done));
    }
}
