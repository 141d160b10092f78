//! Refresh token exchange.
//!
//! The exchange goes straight to the transport. It never passes through the
//! gateway pipeline, so a failing refresh cannot trigger another refresh.

use reqwest::Method;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::ClientConfig;
use crate::http::{pipeline, ApiError, ApiRequest, Transport};

#[derive(Debug, Clone, Serialize)]
pub struct RefreshRequest<'a> {
    pub refresh_token: &'a str,
}

/// Tokens returned by the refresh endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RefreshResponse {
    pub access_token: String,
    /// Present when the server rotates refresh tokens.
    #[serde(default)]
    pub refresh_token: Option<String>,
}

/// POST the refresh token to the refresh endpoint.
pub async fn exchange_refresh_token(
    transport: &dyn Transport,
    config: &ClientConfig,
    refresh_token: &str,
) -> Result<RefreshResponse, ApiError> {
    let body = serde_json::to_value(RefreshRequest { refresh_token })
        .map_err(|e| ApiError::invalid_request(e.to_string()))?;
    let request = ApiRequest::new(Method::POST, config.refresh_path.clone())
        .with_body(body);
    let prepared = pipeline::prepare(config, &request)?;

    debug!(url = %prepared.url, "Exchanging refresh token");

    let response = transport
        .send(prepared)
        .await
        .map_err(ApiError::from_transport)?;

    if !response.is_success() {
        let err = ApiError::from_response(&response);
        warn!(status = response.status.as_u16(), "Token refresh rejected: {}", err.message);
        return Err(err);
    }

    response.json::<RefreshResponse>()
}
