use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeadlineType {
    CourtHearing,
    Filing,
    Internal,
    Other,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Deadline {
    pub id: i64,
    pub case_file_id: i64,
    pub title: String,
    /// ISO date
    pub due_date: String,
    #[serde(rename = "type")]
    pub kind: DeadlineType,
    pub completed: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewDeadline {
    pub case_file_id: i64,
    pub title: String,
    pub due_date: String,
    #[serde(rename = "type")]
    pub kind: DeadlineType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateDeadline {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub case_file_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub due_date: Option<String>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<DeadlineType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed: Option<bool>,
}

/// Server-side filters for `GET /deadlines`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeadlineQuery {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub case_file_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed: Option<bool>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<DeadlineType>,
    /// Convenience window used by the dashboard
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_days: Option<u32>,
}

impl DeadlineQuery {
    pub fn upcoming(days: u32) -> Self {
        Self {
            next_days: Some(days),
            ..Self::default()
        }
    }
}
