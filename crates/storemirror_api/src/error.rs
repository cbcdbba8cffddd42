//! Error taxonomy for API operations.

use crate::quota;
use crate::transport::HttpResponse;
use reqwest::StatusCode;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;
use storemirror_changelog::ChangelogError;
use storemirror_retry::RetryError;
use thiserror::Error;

/// Result type for API operations.
pub type ApiResult<T> = Result<T, ApiError>;

/// Errors that can occur while talking to the API.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Request construction or network-level failure. Retryable.
    #[error("transport error: {0}")]
    Transport(String),

    /// The operation observed its cancellation flag. Terminal, not retried
    /// and not reported as a stream error.
    #[error("operation cancelled")]
    Cancelled,

    /// HTTP 429; retried after exactly the server-specified delay.
    #[error("rate limited, retry after {retry_after:?}")]
    RateLimited {
        /// Wait the server asked for.
        retry_after: Duration,
    },

    /// A 4xx other than 429. Fatal, never retried.
    #[error("client error: {0}")]
    Client(StatusError),

    /// A 5xx (or other abnormal status). Retried with backoff.
    #[error("server error: {0}")]
    Server(StatusError),

    /// A response or payload that failed to decode. Fatal for that read.
    #[error("decoding error: {reason}")]
    Decoding {
        /// Why decoding failed.
        reason: String,
        /// The raw bytes that would not decode, kept for diagnostics.
        raw: Vec<u8>,
    },

    /// Every retry attempt failed; carries each attempt's error.
    #[error("{0}")]
    Exhausted(RetryError<ApiError>),
}

impl ApiError {
    /// Classifies a non-success response into the taxonomy.
    pub(crate) fn from_response(response: &HttpResponse) -> ApiError {
        let status = response.status;

        if status == StatusCode::TOO_MANY_REQUESTS {
            return match quota::parse_retry_after(&response.headers) {
                Ok(retry_after) => ApiError::RateLimited { retry_after },
                Err(err) => err,
            };
        }

        let mut messages = match parse_error_body(&response.body) {
            Ok(messages) => messages,
            Err(err) => return err,
        };

        if status == StatusCode::NOT_ACCEPTABLE {
            // The API returns an unhelpful body for this code.
            messages = vec![canonical_reason(status)];
        }

        let detail = StatusError { status, messages };
        if status.is_client_error() {
            ApiError::Client(detail)
        } else {
            ApiError::Server(detail)
        }
    }

    /// Collapses a retry outcome into one taxonomy error: an observed
    /// cancellation wins, a single failed attempt surfaces unwrapped, and
    /// anything else stays aggregated.
    pub(crate) fn from_retry(err: RetryError<ApiError>) -> ApiError {
        if matches!(err.last(), Some(ApiError::Cancelled)) {
            return ApiError::Cancelled;
        }
        match err {
            RetryError::Exhausted(mut errors) if errors.len() == 1 => {
                errors.pop().unwrap_or(ApiError::Cancelled)
            }
            other => ApiError::Exhausted(other),
        }
    }
}

impl From<ChangelogError> for ApiError {
    fn from(err: ChangelogError) -> Self {
        match err {
            ChangelogError::Decode { reason, raw } => ApiError::Decoding { reason, raw },
            other => ApiError::Transport(other.to_string()),
        }
    }
}

/// Status plus the normalized error messages from a non-success response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusError {
    /// The response status.
    pub status: StatusCode,
    /// Flattened error messages, in payload order with map keys sorted.
    pub messages: Vec<String>,
}

impl fmt::Display for StatusError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let message = if self.messages.is_empty() {
            canonical_reason(self.status)
        } else {
            self.messages.join(", ")
        };
        write!(f, "{:03}: {}", self.status.as_u16(), message)
    }
}

fn canonical_reason(status: StatusCode) -> String {
    status
        .canonical_reason()
        .unwrap_or("unknown error")
        .to_owned()
}

/// The dynamic shapes the API uses for error payloads: bare text, a list,
/// or a keyed map whose values are themselves any of the three.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum ErrorShape {
    /// A single message.
    Text(String),
    /// A list of nested shapes.
    List(Vec<ErrorShape>),
    /// A map of field name to nested shape. Keys iterate sorted.
    Map(BTreeMap<String, ErrorShape>),
    /// Anything else the server sends; rendered as JSON.
    Other(serde_json::Value),
}

impl ErrorShape {
    /// Flattens into an ordered list of messages.
    ///
    /// Map keys are iterated in sorted order, so the output is
    /// deterministic regardless of how the payload arrived.
    pub fn flatten(&self) -> Vec<String> {
        match self {
            ErrorShape::Text(text) => vec![text.clone()],
            ErrorShape::List(items) => items.iter().map(ErrorShape::join).collect(),
            ErrorShape::Map(map) => map
                .iter()
                .map(|(key, value)| format!("{key}: {}", value.join()))
                .collect(),
            ErrorShape::Other(value) => vec![value.to_string()],
        }
    }

    /// Renders one shape as a single message.
    fn join(&self) -> String {
        match self {
            ErrorShape::Text(text) => text.clone(),
            ErrorShape::List(items) => items
                .iter()
                .map(ErrorShape::join)
                .collect::<Vec<_>>()
                .join(", "),
            ErrorShape::Map(map) => map
                .iter()
                .map(|(key, value)| format!("{key}: {}", value.join()))
                .collect::<Vec<_>>()
                .join(", "),
            ErrorShape::Other(value) => value.to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    errors: Option<ErrorShape>,
}

/// Parses a non-2xx body into its flattened messages.
///
/// An empty body is fine (no messages); a non-JSON body is a decoding
/// failure that keeps the raw bytes.
fn parse_error_body(body: &[u8]) -> ApiResult<Vec<String>> {
    if body.is_empty() {
        return Ok(Vec::new());
    }
    let parsed: ErrorBody = serde_json::from_slice(body).map_err(|err| ApiError::Decoding {
        reason: err.to_string(),
        raw: body.to_vec(),
    })?;

    let mut messages = Vec::new();
    if let Some(message) = parsed.error {
        messages.push(message);
    }
    if let Some(shape) = parsed.errors {
        messages.extend(shape.flatten());
    }
    Ok(messages)
}
