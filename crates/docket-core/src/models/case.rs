use serde::{Deserialize, Serialize};

use super::{Client, Deadline, Task};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CaseStatus {
    Open,
    PendingHearing,
    UnderAppeal,
    Closed,
}

impl CaseStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CaseStatus::Open => "OPEN",
            CaseStatus::PendingHearing => "PENDING_HEARING",
            CaseStatus::UnderAppeal => "UNDER_APPEAL",
            CaseStatus::Closed => "CLOSED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "OPEN" => Some(CaseStatus::Open),
            "PENDING_HEARING" => Some(CaseStatus::PendingHearing),
            "UNDER_APPEAL" => Some(CaseStatus::UnderAppeal),
            "CLOSED" => Some(CaseStatus::Closed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaseFile {
    pub id: i64,
    pub title: String,
    pub case_number: String,
    pub status: CaseStatus,
    /// Primary client
    pub client_id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_ids: Option<Vec<i64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub court: Option<String>,
    /// ISO `yyyy-MM-dd`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_hearing_date: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewCase {
    pub title: String,
    pub case_number: String,
    pub status: CaseStatus,
    pub client_id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_ids: Option<Vec<i64>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub court: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_hearing_date: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateCase {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub case_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<CaseStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_ids: Option<Vec<i64>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub court: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_hearing_date: Option<String>,
}

/// Server-side filters for `GET /cases`. Doubles as a query-key part, so
/// unset fields are left out of the serialized form.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaseQuery {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<CaseStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_id: Option<i64>,
}

/// Case, primary client, deadlines and tasks in one response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaseDetails {
    pub case_file: CaseFile,
    pub client: Client,
    #[serde(default)]
    pub deadlines: Vec<Deadline>,
    #[serde(default)]
    pub tasks: Vec<Task>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_case_status_wire_format() {
        let json = serde_json::to_string(&CaseStatus::PendingHearing).unwrap();
        assert_eq!(json, "\"PENDING_HEARING\"");
        assert_eq!(CaseStatus::parse("under_appeal"), Some(CaseStatus::UnderAppeal));
        assert_eq!(CaseStatus::parse("archived"), None);
    }

    #[test]
    fn test_case_query_omits_unset_fields() {
        let query = CaseQuery {
            status: Some(CaseStatus::Open),
            client_id: None,
        };
        assert_eq!(serde_json::to_string(&query).unwrap(), r#"{"status":"OPEN"}"#);
        assert_eq!(serde_json::to_string(&CaseQuery::default()).unwrap(), "{}");
    }

    #[test]
    fn test_parse_case_details() {
        let json = r#"{
            "caseFile": {"id": 1, "title": "Lease dispute", "caseNumber": "123/2024",
                         "status": "OPEN", "clientId": 4},
            "client": {"id": 4, "firstName": "Nikos", "lastName": "Georgiou"},
            "deadlines": [{"id": 7, "caseFileId": 1, "title": "File appeal",
                           "dueDate": "2024-05-01", "type": "FILING", "completed": false}]
        }"#;
        let details: CaseDetails = serde_json::from_str(json).unwrap();
        assert_eq!(details.case_file.case_number, "123/2024");
        assert_eq!(details.deadlines.len(), 1);
        assert!(details.tasks.is_empty());
    }
}
