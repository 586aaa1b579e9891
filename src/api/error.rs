//! Error types for the Drishti API client.

use reqwest::StatusCode;
use serde_json::Value;
use thiserror::Error;

/// Fallback message when an error body is not JSON.
pub const NETWORK_ERROR_MESSAGE: &str = "Network error";
/// Fallback message when a JSON error body carries no usable detail.
pub const GENERIC_ERROR_MESSAGE: &str = "An error occurred";

/// Errors that can occur while talking to the backend.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Missing, invalid or expired credentials (401/403).
    #[error("authentication failed: {message}")]
    Auth {
        /// HTTP status code.
        status: u16,
        /// Server supplied message.
        message: String,
    },

    /// Rejected input (400/422, or a client-side precondition).
    #[error("validation failed: {message}")]
    Validation {
        /// HTTP status code; `None` when rejected before any request.
        status: Option<u16>,
        /// Server or client message.
        message: String,
    },

    /// The addressed resource does not exist (404).
    #[error("not found: {0}")]
    NotFound(String),

    /// Any other non-success response.
    #[error("API error ({status}): {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Server supplied message.
        message: String,
    },

    /// A `data:` line whose payload is not a stream chunk.
    #[error("malformed stream payload: {0}")]
    StreamParse(String),

    /// No bytes arrived within the idle timeout.
    #[error("request timed out")]
    Timeout,

    /// Transport failure.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Base URL or endpoint could not be built.
    #[error("invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// JSON (de)serialization failure.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Local file access failure.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Durable key-value store failure.
    #[error("storage error: {0}")]
    Storage(String),

    /// An operation needed a token but nobody is logged in.
    #[error("not authenticated")]
    NotAuthenticated,

    /// Invalid client configuration.
    #[error("configuration error: {0}")]
    Config(String),
}

impl From<tokio_rusqlite::Error> for ApiError {
    fn from(err: tokio_rusqlite::Error) -> Self {
        Self::Storage(err.to_string())
    }
}

impl ApiError {
    /// Map a non-success status and server message to the error taxonomy.
    #[must_use]
    pub fn from_status(status: StatusCode, message: String) -> Self {
        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Self::Auth {
                status: status.as_u16(),
                message,
            },
            StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => Self::Validation {
                status: Some(status.as_u16()),
                message,
            },
            StatusCode::NOT_FOUND => Self::NotFound(message),
            _ => Self::Api {
                status: status.as_u16(),
                message,
            },
        }
    }

    /// Client-side precondition failure; no request was made.
    #[must_use]
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            status: None,
            message: message.into(),
        }
    }

    /// HTTP status associated with this error, if any.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Auth { status, .. } | Self::Api { status, .. } => Some(*status),
            Self::Validation { status, .. } => *status,
            Self::NotFound(_) => Some(404),
            Self::Http(err) => err.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    /// Check if retrying the same call may succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Timeout | Self::Http(_) => true,
            Self::Api { status, .. } => *status >= 500,
            _ => false,
        }
    }

    /// Whether the user has to authenticate again.
    #[must_use]
    pub const fn requires_login(&self) -> bool {
        matches!(self, Self::Auth { .. } | Self::NotAuthenticated)
    }
}

/// Extract a human readable message from an error response body.
///
/// Non-JSON bodies yield [`NETWORK_ERROR_MESSAGE`]. FastAPI validation
/// bodies (`detail` as a list of `{loc, msg}`) are flattened.
#[must_use]
pub fn message_from_body(body: &[u8]) -> String {
    let Ok(value) = serde_json::from_slice::<Value>(body) else {
        return NETWORK_ERROR_MESSAGE.to_string();
    };

    match value.get("detail") {
        Some(Value::String(detail)) if !detail.is_empty() => detail.clone(),
        Some(Value::Array(items)) if !items.is_empty() => items
            .iter()
            .map(validation_item)
            .collect::<Vec<_>>()
            .join("; "),
        _ => GENERIC_ERROR_MESSAGE.to_string(),
    }
}

fn validation_item(item: &Value) -> String {
    let msg = item
        .get("msg")
        .and_then(Value::as_str)
        .unwrap_or(GENERIC_ERROR_MESSAGE);
    let loc = item.get("loc").and_then(Value::as_array).map(|parts| {
        parts
            .iter()
            .map(|part| match part {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .collect::<Vec<_>>()
            .join(".")
    });

    match loc {
        Some(loc) if !loc.is_empty() => format!("{loc}: {msg}"),
        _ => msg.to_string(),
    }
}

/// Convert a non-success response into an [`ApiError`].
pub async fn error_from_response(response: reqwest::Response) -> ApiError {
    let status = response.status();
    let message = match response.bytes().await {
        Ok(body) => message_from_body(&body),
        Err(_) => NETWORK_ERROR_MESSAGE.to_string(),
    };
    tracing::debug!(status = status.as_u16(), %message, "backend returned an error");
    ApiError::from_status(status, message)
}

/// Convenience result alias for client operations.
pub type ApiResult<T> = Result<T, ApiError>;
