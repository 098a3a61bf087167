use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DocumentCategory {
    Petition,
    Decision,
    Contract,
    Evidence,
    Correspondence,
    Other,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    pub id: i64,
    pub case_file_id: i64,
    pub file_name: String,
    /// Bytes
    pub file_size: u64,
    /// MIME type
    pub file_type: String,
    pub category: DocumentCategory,
    pub uploaded_at: String,
    pub uploaded_by: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    /// Download/preview URL
    pub url: String,
}

impl Document {
    pub fn display_size(&self) -> String {
        const KB: u64 = 1024;
        const MB: u64 = KB * 1024;
        if self.file_size >= MB {
            format!("{:.1} MB", self.file_size as f64 / MB as f64)
        } else if self.file_size >= KB {
            format!("{:.1} KB", self.file_size as f64 / KB as f64)
        } else {
            format!("{} B", self.file_size)
        }
    }
}

/// Upload metadata; the file bytes travel as a multipart part.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewDocument {
    pub case_file_id: i64,
    pub file_name: String,
    pub file_type: String,
    pub category: DocumentCategory,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateDocument {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<DocumentCategory>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentQuery {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub case_file_id: Option<i64>,
}
