//! Normalized gateway errors.
//!
//! Every failed request resolves to an [`ApiError`], whatever went wrong
//! underneath: transport failure, error status, refresh failure, or an
//! undecodable body.

use std::sync::Arc;

use reqwest::StatusCode;
use thiserror::Error;

use super::response::ApiResponse;
use super::transport::TransportError;
use crate::auth::CredentialStoreError;

pub const NETWORK_ERROR_MESSAGE: &str = "Network error. Please check your connection.";
pub const SESSION_EXPIRED_MESSAGE: &str = "Session expired. Please login again.";

type Cause = Arc<dyn std::error::Error + Send + Sync>;

/// Failure category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// No response received: offline, DNS failure, timeout.
    Network,
    /// 401 that survived a refresh, or a refresh endpoint rejection.
    Authentication,
    /// The session could not be refreshed; credentials were cleared.
    SessionExpired,
    BadRequest,
    Forbidden,
    NotFound,
    RateLimited,
    ServerError,
    ServiceUnavailable,
    Unknown,
    /// The request could not be built (bad URL, unserializable body).
    InvalidRequest,
    /// A successful response whose body didn't decode.
    InvalidBody,
}

impl ErrorKind {
    /// Classify an error status.
    pub fn from_status(status: StatusCode) -> Self {
        match status.as_u16() {
            400 => Self::BadRequest,
            401 => Self::Authentication,
            403 => Self::Forbidden,
            404 => Self::NotFound,
            429 => Self::RateLimited,
            503 => Self::ServiceUnavailable,
            500..=599 => Self::ServerError,
            _ => Self::Unknown,
        }
    }

    /// Generic user-facing text used when the server sends no message.
    pub fn default_message(self) -> &'static str {
        match self {
            Self::Network => NETWORK_ERROR_MESSAGE,
            Self::Authentication => "Authentication required. Please sign in again.",
            Self::SessionExpired => SESSION_EXPIRED_MESSAGE,
            Self::BadRequest => "Bad request.",
            Self::Forbidden => "You do not have permission to perform this action.",
            Self::NotFound => "The requested resource was not found.",
            Self::RateLimited => "Too many requests. Please wait a moment.",
            Self::ServerError => "Something went wrong. Please try again.",
            Self::ServiceUnavailable => "Service temporarily unavailable.",
            Self::Unknown => "Unknown error",
            Self::InvalidRequest => "The request could not be sent.",
            Self::InvalidBody => "The server returned an unexpected response.",
        }
    }
}

/// Normalized error returned for every failed request.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct ApiError {
    pub kind: ErrorKind,
    /// HTTP status, `None` when no response was received.
    pub status: Option<u16>,
    /// Never empty.
    pub message: String,
    /// Raw response body, `null` when there was none.
    pub data: serde_json::Value,
    #[source]
    cause: Option<Cause>,
}

impl ApiError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            kind,
            status: None,
            message: if message.trim().is_empty() {
                kind.default_message().to_string()
            } else {
                message
            },
            data: serde_json::Value::Null,
            cause: None,
        }
    }

    pub fn with_status(mut self, status: StatusCode) -> Self {
        self.status = Some(status.as_u16());
        self
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = data;
        self
    }

    pub fn with_cause(mut self, cause: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.cause = Some(Arc::new(cause));
        self
    }

    /// The underlying error, if any.
    pub fn cause(&self) -> Option<&(dyn std::error::Error + Send + Sync + 'static)> {
        self.cause.as_deref()
    }

    // -------------------------------------------------------------------------
    // Constructors
    // -------------------------------------------------------------------------

    /// No response was received.
    pub fn network(err: TransportError) -> Self {
        Self::new(ErrorKind::Network, NETWORK_ERROR_MESSAGE).with_cause(err)
    }

    /// Error for a transport failure. A request the transport could not
    /// build is [`ErrorKind::InvalidRequest`]; anything else is a network error.
    pub fn from_transport(err: TransportError) -> Self {
        match err {
            TransportError::Build(detail) => {
                Self::invalid_request(detail.clone()).with_cause(TransportError::Build(detail))
            }
            other => Self::network(other),
        }
    }

    /// Error built from a non-success response.
    pub fn from_response(response: &ApiResponse) -> Self {
        let kind = ErrorKind::from_status(response.status);
        let data = response.json_value();
        let message = server_message(&data).unwrap_or_else(|| kind.default_message().to_string());

        Self::new(kind, message)
            .with_status(response.status)
            .with_data(data)
    }

    /// A 401 on a request that was already replayed after a refresh.
    pub fn authentication(response: &ApiResponse) -> Self {
        let mut err = Self::from_response(response);
        err.kind = ErrorKind::Authentication;
        err
    }

    /// The refresh failed; the session is gone.
    pub fn session_expired(refresh_error: ApiError) -> Self {
        Self::new(ErrorKind::SessionExpired, SESSION_EXPIRED_MESSAGE).with_cause(refresh_error)
    }

    pub fn missing_refresh_token() -> Self {
        Self::new(ErrorKind::Authentication, "No refresh token available")
    }

    /// The task running the refresh went away before it settled.
    pub fn refresh_aborted() -> Self {
        Self::new(
            ErrorKind::Authentication,
            "Token refresh was interrupted before completing",
        )
    }

    pub fn credential_store(err: CredentialStoreError) -> Self {
        Self::new(
            ErrorKind::Authentication,
            "Failed to access stored credentials",
        )
        .with_cause(err)
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidRequest, message)
    }

    pub fn invalid_body(status: StatusCode, err: serde_json::Error) -> Self {
        Self::new(
            ErrorKind::InvalidBody,
            format!("Failed to decode response body: {err}"),
        )
        .with_status(status)
        .with_cause(err)
    }

    // -------------------------------------------------------------------------
    // Queries
    // -------------------------------------------------------------------------

    pub fn is_network(&self) -> bool {
        self.kind == ErrorKind::Network
    }

    /// Authentication failure or expired session.
    pub fn is_auth(&self) -> bool {
        matches!(
            self.kind,
            ErrorKind::Authentication | ErrorKind::SessionExpired
        )
    }

    pub fn is_client_error(&self) -> bool {
        self.status.is_some_and(|s| (400..500).contains(&s))
    }

    pub fn is_server_error(&self) -> bool {
        self.status.is_some_and(|s| (500..600).contains(&s))
    }
}

/// Message supplied by the server: `message`, then a FastAPI `detail`.
fn server_message(data: &serde_json::Value) -> Option<String> {
    let non_empty = |v: &serde_json::Value| {
        v.as_str()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    };

    if let Some(message) = data.get("message").and_then(non_empty) {
        return Some(message);
    }

    match data.get("detail")? {
        serde_json::Value::Array(items) => items
            .iter()
            .find_map(|item| item.get("msg").and_then(non_empty)),
        detail => non_empty(detail),
    }
}
