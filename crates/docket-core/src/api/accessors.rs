//! Resource accessors: one request/response mapping per endpoint.
//!
//! Each accessor is a plain async method on [`ApiClient`]. Accessors hold no
//! state, never cache and never retry; the query cache wraps them as fetch
//! and effect functions.

use reqwest::multipart::{Form, Part};
use reqwest::Method;
use serde::Deserialize;

use super::{ApiClient, ApiError};
use crate::models::{
    Activity, ActivityQuery, AuthResponse, CaseDetails, CaseFile, CaseQuery, Client, Credentials,
    Deadline, DeadlineQuery, Document, DocumentQuery, MarkAsRead, NewCase, NewClient,
    NewDeadline, NewDocument, NewNote, NewTask, Note, NoteQuery, Notification,
    NotificationQuery, Task, TaskQuery, TaskStatus, UpdateCase, UpdateClient, UpdateDeadline,
    UpdateDocument, UpdateNote, UpdateTask,
};

#[derive(Debug, Deserialize)]
struct UnreadCount {
    count: u64,
}

impl ApiClient {
    // ===== Auth =====

    pub async fn login(&self, credentials: &Credentials) -> Result<AuthResponse, ApiError> {
        self.post("/auth/login", credentials).await
    }

    // ===== Clients =====

    pub async fn fetch_clients(&self) -> Result<Vec<Client>, ApiError> {
        self.get::<_, ()>("/clients", None).await
    }

    pub async fn fetch_client(&self, id: i64) -> Result<Client, ApiError> {
        self.get::<_, ()>(&format!("/clients/{}", id), None).await
    }

    pub async fn create_client(&self, payload: &NewClient) -> Result<Client, ApiError> {
        self.post("/clients", payload).await
    }

    pub async fn update_client(&self, id: i64, payload: &UpdateClient) -> Result<Client, ApiError> {
        self.put(&format!("/clients/{}", id), payload).await
    }

    // ===== Cases =====

    pub async fn fetch_cases(&self, query: &CaseQuery) -> Result<Vec<CaseFile>, ApiError> {
        self.get("/cases", Some(query)).await
    }

    pub async fn fetch_case(&self, id: i64) -> Result<CaseFile, ApiError> {
        self.get::<_, ()>(&format!("/cases/{}", id), None).await
    }

    pub async fn create_case(&self, payload: &NewCase) -> Result<CaseFile, ApiError> {
        self.post("/cases", payload).await
    }

    pub async fn update_case(&self, id: i64, payload: &UpdateCase) -> Result<CaseFile, ApiError> {
        self.put(&format!("/cases/{}", id), payload).await
    }

    /// Case, client, deadlines and tasks in a single round trip
    pub async fn fetch_case_details(&self, case_id: i64) -> Result<CaseDetails, ApiError> {
        self.get::<_, ()>(&format!("/cases/{}/details", case_id), None).await
    }

    // ===== Deadlines =====

    pub async fn fetch_deadlines(&self, query: &DeadlineQuery) -> Result<Vec<Deadline>, ApiError> {
        self.get("/deadlines", Some(query)).await
    }

    pub async fn create_deadline(&self, payload: &NewDeadline) -> Result<Deadline, ApiError> {
        self.post("/deadlines", payload).await
    }

    pub async fn update_deadline(
        &self,
        id: i64,
        payload: &UpdateDeadline,
    ) -> Result<Deadline, ApiError> {
        self.put(&format!("/deadlines/{}", id), payload).await
    }

    pub async fn complete_deadline(&self, id: i64) -> Result<Deadline, ApiError> {
        self.post(&format!("/deadlines/{}/complete", id), &serde_json::json!({}))
            .await
    }

    // ===== Tasks =====

    pub async fn fetch_tasks(&self, query: &TaskQuery) -> Result<Vec<Task>, ApiError> {
        self.get("/tasks", Some(query)).await
    }

    pub async fn create_task(&self, payload: &NewTask) -> Result<Task, ApiError> {
        self.post("/tasks", payload).await
    }

    pub async fn update_task(&self, id: i64, payload: &UpdateTask) -> Result<Task, ApiError> {
        self.put(&format!("/tasks/{}", id), payload).await
    }

    pub async fn update_task_status(&self, id: i64, status: TaskStatus) -> Result<Task, ApiError> {
        self.patch(
            &format!("/tasks/{}/status", id),
            &serde_json::json!({ "status": status }),
        )
        .await
    }

    // ===== Documents =====

    pub async fn fetch_documents(&self, query: &DocumentQuery) -> Result<Vec<Document>, ApiError> {
        self.get("/documents", Some(query)).await
    }

    pub async fn fetch_document(&self, id: i64) -> Result<Document, ApiError> {
        self.get::<_, ()>(&format!("/documents/{}", id), None).await
    }

    /// Upload a file as `multipart/form-data` with its metadata fields
    pub async fn upload_document(
        &self,
        metadata: &NewDocument,
        bytes: Vec<u8>,
    ) -> Result<Document, ApiError> {
        let part = Part::bytes(bytes)
            .file_name(metadata.file_name.clone())
            .mime_str(&metadata.file_type)
            .map_err(|e| ApiError::network(format!("Invalid MIME type: {}", e)))?;

        let category = serde_json::to_value(metadata.category)
            .ok()
            .and_then(|v| v.as_str().map(str::to_string))
            .unwrap_or_default();

        let mut form = Form::new()
            .part("file", part)
            .text("caseFileId", metadata.case_file_id.to_string())
            .text("category", category);
        if let Some(ref notes) = metadata.notes {
            form = form.text("notes", notes.clone());
        }

        self.send(self.request(Method::POST, "/documents/upload")?.multipart(form))
            .await
    }

    pub async fn update_document(
        &self,
        id: i64,
        payload: &UpdateDocument,
    ) -> Result<Document, ApiError> {
        self.patch(&format!("/documents/{}", id), payload).await
    }

    pub async fn delete_document(&self, id: i64) -> Result<(), ApiError> {
        self.delete(&format!("/documents/{}", id)).await
    }

    pub fn document_download_url(&self, id: i64) -> String {
        self.url(&format!("/documents/{}/download", id))
    }

    // ===== Notes =====

    pub async fn fetch_notes(&self, query: &NoteQuery) -> Result<Vec<Note>, ApiError> {
        self.get("/notes", Some(query)).await
    }

    pub async fn fetch_note(&self, id: i64) -> Result<Note, ApiError> {
        self.get::<_, ()>(&format!("/notes/{}", id), None).await
    }

    pub async fn create_note(&self, payload: &NewNote) -> Result<Note, ApiError> {
        self.post("/notes", payload).await
    }

    pub async fn update_note(&self, id: i64, payload: &UpdateNote) -> Result<Note, ApiError> {
        self.patch(&format!("/notes/{}", id), payload).await
    }

    pub async fn delete_note(&self, id: i64) -> Result<(), ApiError> {
        self.delete(&format!("/notes/{}", id)).await
    }

    pub async fn search_notes_by_tag(&self, tag: &str) -> Result<Vec<Note>, ApiError> {
        self.get("/notes/search", Some(&[("tag", tag)])).await
    }

    // ===== Notifications =====

    pub async fn fetch_notifications(
        &self,
        query: &NotificationQuery,
    ) -> Result<Vec<Notification>, ApiError> {
        self.get("/notifications", Some(query)).await
    }

    pub async fn fetch_unread_count(&self) -> Result<u64, ApiError> {
        let unread: UnreadCount = self
            .get::<_, ()>("/notifications/unread-count", None)
            .await?;
        Ok(unread.count)
    }

    pub async fn mark_notifications_read(&self, payload: &MarkAsRead) -> Result<(), ApiError> {
        self.send_empty(self.request(Method::POST, "/notifications/mark-read")?.json(payload))
            .await
    }

    pub async fn mark_all_notifications_read(&self) -> Result<(), ApiError> {
        self.send_empty(self.request(Method::POST, "/notifications/mark-all-read")?)
            .await
    }

    pub async fn delete_notification(&self, id: i64) -> Result<(), ApiError> {
        self.delete(&format!("/notifications/{}", id)).await
    }

    // ===== Activities =====

    pub async fn fetch_activities(&self, query: &ActivityQuery) -> Result<Vec<Activity>, ApiError> {
        self.get("/activities", Some(query)).await
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CaseStatus, DocumentCategory};
    use serde_json::json;
    use wiremock::matchers::{body_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn client_for(server: &MockServer) -> ApiClient {
        let client = ApiClient::new(&server.uri()).unwrap();
        client.set_token(Some("test-token".to_string()));
        client
    }

    #[tokio::test]
    async fn test_fetch_cases_with_status_filter() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/cases"))
            .and(query_param("status", "OPEN"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"id": 1, "title": "Lease dispute", "caseNumber": "12/2024", "status": "OPEN", "clientId": 3}
            ])))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let cases = client
            .fetch_cases(&CaseQuery {
                status: Some(CaseStatus::Open),
                client_id: None,
            })
            .await
            .unwrap();
        assert_eq!(cases.len(), 1);
        assert_eq!(cases[0].client_id, 3);
    }

    #[tokio::test]
    async fn test_complete_deadline_posts_empty_object() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/deadlines/7/complete"))
            .and(body_json(json!({})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": 7, "caseFileId": 1, "title": "File appeal", "dueDate": "2024-05-01",
                "type": "FILING", "completed": true
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let deadline = client.complete_deadline(7).await.unwrap();
        assert!(deadline.completed);
    }

    #[tokio::test]
    async fn test_update_task_status_patch_body() {
        let server = MockServer::start().await;
        Mock::given(method("PATCH"))
            .and(path("/tasks/4/status"))
            .and(body_json(json!({"status": "IN_PROGRESS"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": 4, "caseFileId": 1, "title": "Draft brief", "status": "IN_PROGRESS"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let task = client.update_task_status(4, TaskStatus::InProgress).await.unwrap();
        assert_eq!(task.status, TaskStatus::InProgress);
    }

    #[tokio::test]
    async fn test_unread_count_unwrapped() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/notifications/unread-count"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"count": 5})))
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        assert_eq!(client.fetch_unread_count().await.unwrap(), 5);
    }

    #[tokio::test]
    async fn test_delete_ignores_empty_body() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/notes/9"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        client.delete_note(9).await.unwrap();
    }

    #[tokio::test]
    async fn test_upload_document_multipart() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/documents/upload"))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({
                "id": 11, "caseFileId": 1, "fileName": "contract.pdf", "fileSize": 4,
                "fileType": "application/pdf", "category": "CONTRACT",
                "uploadedAt": "2024-03-01T10:00:00Z", "uploadedBy": 2, "url": "/documents/11/download"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let metadata = NewDocument {
            case_file_id: 1,
            file_name: "contract.pdf".to_string(),
            file_type: "application/pdf".to_string(),
            category: DocumentCategory::Contract,
            notes: None,
        };
        let document = client.upload_document(&metadata, b"%PDF".to_vec()).await.unwrap();
        assert_eq!(document.category, DocumentCategory::Contract);

        let requests = server.received_requests().await.unwrap();
        let content_type = requests[0].headers.get("content-type").unwrap().to_str().unwrap();
        assert!(content_type.starts_with("multipart/form-data"));
    }

    #[tokio::test]
    async fn test_login_returns_tokens() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/login"))
            .and(body_json(json!({"email": "a@firm.gr", "password": "pw"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "accessToken": "jwt", "refreshToken": "refresh"
            })))
            .mount(&server)
            .await;

        let client = ApiClient::new(&server.uri()).unwrap();
        let response = client
            .login(&Credentials {
                email: "a@firm.gr".to_string(),
                password: "pw".to_string(),
            })
            .await
            .unwrap();
        assert_eq!(response.access_token, "jwt");
        assert_eq!(response.refresh_token.as_deref(), Some("refresh"));
        assert!(response.user.is_none());
    }

    #[tokio::test]
    async fn test_not_found_surfaces_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/clients/404"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let err = client.fetch_client(404).await.unwrap_err();
        assert_eq!(err.status, Some(404));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_document_download_url() {
        let client = ApiClient::new("http://localhost:8080/api").unwrap();
        assert_eq!(
            client.document_download_url(3),
            "http://localhost:8080/api/documents/3/download"
        );
    }
}
