//! The seam between the gateway and the network.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use thiserror::Error;
use tracing::debug;

use super::request::{FormPart, MultipartForm, PreparedRequest, RequestBody};
use super::response::ApiResponse;

/// Failure to obtain any response.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    /// The request could not be assembled; nothing was sent.
    #[error("Invalid request: {0}")]
    Build(String),
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),
    #[error("Connection failed: {0}")]
    Connect(String),
    #[error("Request failed: {0}")]
    Request(String),
}

/// Sends one prepared request and returns the complete response.
///
/// Any response, whatever its status, is `Ok`. `Err` means nothing came back.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: PreparedRequest) -> Result<ApiResponse, TransportError>;
}

/// [`Transport`] backed by a shared `reqwest::Client`.
#[derive(Debug, Clone, Default)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

fn build_form(form: MultipartForm) -> Result<reqwest::multipart::Form, TransportError> {
    let mut out = reqwest::multipart::Form::new();
    for part in form.parts().iter().cloned() {
        out = match part {
            FormPart::Text { name, value } => out.text(name, value),
            FormPart::File {
                name,
                file_name,
                mime_type,
                bytes,
            } => {
                let part = reqwest::multipart::Part::bytes(bytes)
                    .file_name(file_name)
                    .mime_str(&mime_type)
                    .map_err(|e| {
                        TransportError::Build(format!("Invalid MIME type {:?}: {}", mime_type, e))
                    })?;
                out.part(name, part)
            }
        };
    }
    Ok(out)
}

fn classify_error(err: reqwest::Error, timeout: Duration) -> TransportError {
    if err.is_timeout() {
        TransportError::Timeout(timeout)
    } else if err.is_connect() {
        TransportError::Connect(err.to_string())
    } else {
        TransportError::Request(err.to_string())
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, request: PreparedRequest) -> Result<ApiResponse, TransportError> {
        let PreparedRequest {
            method,
            url,
            mut headers,
            body,
            timeout,
        } = request;

        debug!(%method, %url, "Sending request");

        let builder = match body {
            RequestBody::Empty => self.client.request(method, url),
            RequestBody::Json(value) => self.client.request(method, url).json(&value),
            RequestBody::Multipart(form) => {
                // reqwest sets the multipart boundary itself
                headers.remove(CONTENT_TYPE);
                self.client
                    .request(method, url)
                    .multipart(build_form(form)?)
            }
        };

        let response = builder
            .headers(headers)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| classify_error(e, timeout))?;

        let status = response.status();
        let headers = response.headers().clone();
        let body = response
            .bytes()
            .await
            .map_err(|e| classify_error(e, timeout))?;

        debug!(status = status.as_u16(), bytes = body.len(), "Received response");

        Ok(ApiResponse {
            status,
            headers,
            body: body.to_vec(),
        })
    }
}
