use serde_json::Value;
use thiserror::Error;

/// Normalized failure of an outbound request.
///
/// Every transport or HTTP failure is reduced to `{message, status, data}` so
/// the query cache can classify it and hand the same value to every
/// subscriber of a key.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{message}")]
pub struct ApiError {
    pub message: String,
    pub status: Option<u16>,
    pub data: Option<Value>,
}

/// Coarse classification of an [`ApiError`], derived from its status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Unauthorized,
    AccessDenied,
    NotFound,
    RateLimited,
    Client,
    Server,
    Network,
    InvalidResponse,
}

/// Maximum length for error response bodies in error messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

/// Message used when neither the body nor the transport says anything useful
const FALLBACK_MESSAGE: &str = "Request failed";

impl ApiError {
    pub fn new(message: impl Into<String>, status: Option<u16>) -> Self {
        Self {
            message: message.into(),
            status,
            data: None,
        }
    }

    /// Truncate a response body to avoid logging excessive data
    fn truncate_body(body: &str) -> String {
        if body.len() <= MAX_ERROR_BODY_LENGTH {
            body.to_string()
        } else {
            let mut end = MAX_ERROR_BODY_LENGTH;
            while !body.is_char_boundary(end) {
                end -= 1;
            }
            format!("{}... (truncated, {} total bytes)", &body[..end], body.len())
        }
    }

    /// Build an error from a non-success HTTP response.
    ///
    /// A JSON body with a string `message` member supplies the message. Any
    /// other body is kept (truncated) in `data` only and the message is
    /// derived from the status.
    pub fn from_status(status: u16, body: &str) -> Self {
        let data: Option<Value> = serde_json::from_str(body).ok();
        let message = data
            .as_ref()
            .and_then(|d| d.get("message"))
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| default_message(status));

        let data = data.or_else(|| {
            let trimmed = body.trim();
            (!trimmed.is_empty()).then(|| Value::String(Self::truncate_body(trimmed)))
        });
        let err = Self::new(message, Some(status));
        match data {
            Some(data) => err.with_data(data),
            None => err,
        }
    }

    /// Error for a failure that never produced an HTTP status.
    pub fn network(message: impl Into<String>) -> Self {
        let message = message.into();
        Self::new(
            if message.is_empty() { FALLBACK_MESSAGE.to_string() } else { message },
            None,
        )
    }

    /// A success response whose payload did not match the expected shape.
    pub fn invalid_response(message: impl Into<String>) -> Self {
        Self::new(format!("Invalid response: {}", message.into()), None)
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn kind(&self) -> ErrorKind {
        match self.status {
            Some(401) => ErrorKind::Unauthorized,
            Some(403) => ErrorKind::AccessDenied,
            Some(404) => ErrorKind::NotFound,
            Some(429) => ErrorKind::RateLimited,
            Some(400..=499) => ErrorKind::Client,
            Some(500..=599) => ErrorKind::Server,
            Some(_) => ErrorKind::InvalidResponse,
            None => ErrorKind::Network,
        }
    }

    /// Client errors (400-499) are logical failures; retrying cannot help.
    pub fn is_retryable(&self) -> bool {
        !matches!(self.status, Some(400..=499))
    }
}

fn default_message(status: u16) -> String {
    match status {
        401 => "Unauthorized - token may be expired".to_string(),
        403 => "Access denied".to_string(),
        404 => "Resource not found".to_string(),
        429 => "Rate limited - please wait before retrying".to_string(),
        500..=599 => format!("Server error ({})", status),
        _ => format!("{} with status code {}", FALLBACK_MESSAGE, status),
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            return Self::invalid_response(err.to_string());
        }
        match err.status() {
            Some(status) => Self::from_status(status.as_u16(), ""),
            None => Self::network(err.to_string()),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
