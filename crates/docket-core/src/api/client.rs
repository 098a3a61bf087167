//! HTTP gateway for the case-management REST API.
//!
//! `ApiClient` owns the connection pool and the current bearer token, injects
//! the `Authorization` header on every request, and normalizes every failure
//! into an [`ApiError`]. It performs no caching and no retries; both belong to
//! the query cache.

use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::{header, Client, Method, RequestBuilder, Response};
use serde::{de::DeserializeOwned, Serialize};
use tracing::debug;

use super::ApiError;

// ============================================================================
// Constants
// ============================================================================

/// Base URL used when neither config nor environment provides one
pub const DEFAULT_API_BASE_URL: &str = "http://localhost:8080/api";

/// HTTP request timeout in seconds.
/// 30s allows for slow API responses while failing fast enough for good UX.
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// API client for the case-management backend.
/// Clone is cheap - the connection pool and token slot are shared.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: Arc<str>,
    token: Arc<RwLock<Option<String>>>,
}

impl ApiClient {
    /// Create a new API client rooted at `base_url`
    pub fn new(base_url: &str) -> Result<Self> {
        reqwest::Url::parse(base_url)
            .with_context(|| format!("Invalid API base URL: {}", base_url))?;

        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            base_url: Arc::from(base_url.trim_end_matches('/')),
            token: Arc::new(RwLock::new(None)),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Set or clear the bearer token. Every clone observes the change.
    pub fn set_token(&self, token: Option<String>) {
        *self.token.write().unwrap_or_else(PoisonError::into_inner) = token;
    }

    pub fn token(&self) -> Option<String> {
        self.token
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub(crate) fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn auth_headers(&self) -> Result<header::HeaderMap, ApiError> {
        let mut headers = header::HeaderMap::new();
        if let Some(token) = self.token() {
            let value = header::HeaderValue::from_str(&format!("Bearer {}", token))
                .map_err(|e| ApiError::network(format!("Invalid bearer token: {}", e)))?;
            headers.insert(header::AUTHORIZATION, value);
        }
        Ok(headers)
    }

    pub(crate) fn request(&self, method: Method, path: &str) -> Result<RequestBuilder, ApiError> {
        Ok(self
            .client
            .request(method, self.url(path))
            .headers(self.auth_headers()?))
    }

    /// Check if response is successful, returning a normalized error if not.
    async fn check_response(response: Response) -> Result<Response, ApiError> {
        if response.status().is_success() {
            Ok(response)
        } else {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            Err(ApiError::from_status(status, &body))
        }
    }

    /// Send a request and decode its JSON body.
    pub(crate) async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, ApiError> {
        let response = request.send().await?;
        let url = response.url().to_string();
        let response = Self::check_response(response).await?;
        let text = response.text().await?;
        debug!(url = %url, bytes = text.len(), "Response received");
        serde_json::from_str(&text)
            .map_err(|e| ApiError::invalid_response(format!("{} ({})", e, url)))
    }

    /// Send a request whose response body is ignored.
    pub(crate) async fn send_empty(&self, request: RequestBuilder) -> Result<(), ApiError> {
        let response = request.send().await?;
        Self::check_response(response).await?;
        Ok(())
    }

    pub(crate) async fn get<T, Q>(&self, path: &str, query: Option<&Q>) -> Result<T, ApiError>
    where
        T: DeserializeOwned,
        Q: Serialize + ?Sized,
    {
        let mut request = self.request(Method::GET, path)?;
        if let Some(query) = query {
            request = request.query(query);
        }
        self.send(request).await
    }

    pub(crate) async fn post<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        self.send(self.request(Method::POST, path)?.json(body)).await
    }

    pub(crate) async fn put<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        self.send(self.request(Method::PUT, path)?.json(body)).await
    }

    pub(crate) async fn patch<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        self.send(self.request(Method::PATCH, path)?.json(body)).await
    }

    pub(crate) async fn delete(&self, path: &str) -> Result<(), ApiError> {
        self.send_empty(self.request(Method::DELETE, path)?).await
    }
}

// ============================================================================
// Tests
// ============================================================================
