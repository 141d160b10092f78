//! Stateless stages of a single attempt: build, authorize, classify.

use reqwest::header::{HeaderValue, AUTHORIZATION};
use reqwest::{Method, StatusCode};
use tracing::{error, warn};
use url::Url;

use super::error::ApiError;
use super::request::{ApiRequest, PreparedRequest};
use super::response::ApiResponse;
use super::transport::TransportError;
use crate::auth::CredentialStore;
use crate::config::ClientConfig;

/// Offline demo session token. Never sent to the server.
pub const DEMO_TOKEN: &str = "demo-token";

/// Resolve the URL, merge headers, and pick the timeout for one attempt.
pub fn prepare(config: &ClientConfig, request: &ApiRequest) -> Result<PreparedRequest, ApiError> {
    let raw = if request.path.starts_with("http://") || request.path.starts_with("https://") {
        request.path.clone()
    } else {
        join_url(&config.base_url, &request.path)
    };

    let mut url = Url::parse(&raw)
        .map_err(|e| ApiError::invalid_request(format!("Invalid request URL '{}': {}", raw, e)))?;
    if !request.options.query.is_empty() {
        url.query_pairs_mut().extend_pairs(&request.options.query);
    }

    let mut headers = config.default_headers.clone();
    for (name, value) in &request.options.headers {
        headers.insert(name.clone(), value.clone());
    }

    Ok(PreparedRequest {
        method: request.method.clone(),
        url,
        headers,
        body: request.body.clone(),
        timeout: request.options.timeout.unwrap_or(config.timeouts.general),
    })
}

/// `base` and `path` joined with exactly one slash.
pub fn join_url(base: &str, path: &str) -> String {
    let base = base.trim_end_matches('/');
    let path = path.trim_start_matches('/');
    if path.is_empty() {
        base.to_string()
    } else {
        format!("{}/{}", base, path)
    }
}

/// Attach the stored access token as a bearer credential.
///
/// No token, the demo token, or an unreadable store all mean the request
/// goes out without credentials.
pub async fn attach_auth(store: &dyn CredentialStore, request: &mut PreparedRequest) {
    let token = match store.access_token().await {
        Ok(token) => token,
        Err(e) => {
            warn!("Failed to read access token: {}", e);
            return;
        }
    };

    let Some(token) = token.filter(|t| !t.is_empty() && t != DEMO_TOKEN) else {
        return;
    };

    match HeaderValue::from_str(&format!("Bearer {}", token)) {
        Ok(mut value) => {
            value.set_sensitive(true);
            request.headers.insert(AUTHORIZATION, value);
        }
        Err(e) => warn!("Stored access token is not a valid header value: {}", e),
    }
}

/// Outcome of one attempt.
#[derive(Debug)]
pub enum Classified {
    Success(ApiResponse),
    /// A 401; the caller decides whether to refresh.
    Unauthorized(ApiResponse),
    Failure(ApiError),
}

/// Sort a transport result into success, 401, or a normalized failure.
pub fn classify(
    method: &Method,
    url: &Url,
    result: Result<ApiResponse, TransportError>,
) -> Classified {
    let response = match result {
        Ok(response) => response,
        Err(e @ TransportError::Build(_)) => {
            warn!(%method, %url, "Request not sent: {}", e);
            return Classified::Failure(ApiError::from_transport(e));
        }
        Err(e) => {
            error!(%method, %url, "Network error: {}", e);
            return Classified::Failure(ApiError::from_transport(e));
        }
    };

    if response.is_success() {
        return Classified::Success(response);
    }
    if response.status == StatusCode::UNAUTHORIZED {
        return Classified::Unauthorized(response);
    }

    let err = ApiError::from_response(&response);
    if response.status.is_server_error() {
        error!(
            status = response.status.as_u16(),
            %url,
            "Server error: {}",
            err.message
        );
    } else {
        warn!(
            status = response.status.as_u16(),
            %url,
            "Request failed: {}",
            err.message
        );
    }
    Classified::Failure(err)
}
