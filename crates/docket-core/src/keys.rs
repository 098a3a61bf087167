//! Query keys used across the application.
//!
//! Every list key begins with its resource name so a single prefix
//! invalidates the unfiltered list, filtered lists and details together.

use serde_json::json;

use crate::models::{CaseQuery, DeadlineQuery, TaskQuery};
use crate::query::QueryKey;

pub fn clients() -> QueryKey {
    QueryKey::new("clients")
}

pub fn client(id: i64) -> QueryKey {
    clients().with(id)
}

pub fn client_cases(id: i64) -> QueryKey {
    client(id).with("cases")
}

pub fn cases() -> QueryKey {
    QueryKey::new("cases")
}

pub fn cases_filtered(query: &CaseQuery) -> QueryKey {
    cases().with_params(query)
}

pub fn case(id: i64) -> QueryKey {
    cases().with(id)
}

/// Aggregated case view; kept apart from `cases` so list invalidation does
/// not refetch every open case page.
pub fn case_details(id: i64) -> QueryKey {
    QueryKey::new("caseDetails").with(id)
}

pub fn all_case_details() -> QueryKey {
    QueryKey::new("caseDetails")
}

pub fn deadlines() -> QueryKey {
    QueryKey::new("deadlines")
}

pub fn deadlines_filtered(query: &DeadlineQuery) -> QueryKey {
    deadlines().with_params(query)
}

pub fn upcoming_deadlines(days: u32) -> QueryKey {
    deadlines_filtered(&DeadlineQuery::upcoming(days))
}

pub fn tasks() -> QueryKey {
    QueryKey::new("tasks")
}

pub fn tasks_filtered(query: &TaskQuery) -> QueryKey {
    tasks().with_params(query)
}

pub fn documents(case_id: i64) -> QueryKey {
    QueryKey::new("documents").with(json!({ "caseFileId": case_id }))
}

pub fn all_documents() -> QueryKey {
    QueryKey::new("documents")
}

pub fn notes(case_id: i64) -> QueryKey {
    QueryKey::new("notes").with(json!({ "caseFileId": case_id }))
}

pub fn all_notes() -> QueryKey {
    QueryKey::new("notes")
}

pub fn notifications() -> QueryKey {
    QueryKey::new("notifications")
}

pub fn unread_count() -> QueryKey {
    notifications().with("unread-count")
}

pub fn activities(case_id: i64) -> QueryKey {
    QueryKey::new("activities").with(json!({ "caseFileId": case_id }))
}

pub fn all_activities() -> QueryKey {
    QueryKey::new("activities")
}
