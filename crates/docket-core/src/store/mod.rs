//! Persisted application state.
//!
//! Three stores share one mechanism: state lives in a watch channel, every
//! action updates it synchronously, and the declared subset is written to a
//! [`Storage`] backend after each change.
//!
//! | Store | Storage key | Persisted |
//! |-------|-------------|-----------|
//! | `AuthStore` | `docket-auth-storage` | everything |
//! | `UiStore` | `docket-ui-storage` | sidebar, theme, search history |
//! | `FiltersStore` | `docket-filters-storage` | everything |

pub mod auth;
pub mod filters;
pub mod persisted;
pub mod storage;
pub mod ui;

pub use auth::{AuthState, AuthStore};
pub use filters::{
    CaseFilters, CaseStatusFilter, ClientFilters, ClientTypeFilter, DeadlineFilters,
    DeadlineStatusFilter, FiltersState, FiltersStore, TaskFilters, TaskPriority, TaskStatusFilter,
};
pub use persisted::{Persist, PersistedStore};
pub use storage::{FileStorage, MemoryStorage, Storage};
pub use ui::{QuickAddKind, UiPreferences, UiState, UiStore};
