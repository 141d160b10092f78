//! HTTP gateway to the ChefMentor backend.

mod client;
mod error;
pub mod pipeline;
mod request;
mod response;
mod transport;

#[cfg(test)]
pub(crate) mod testing;

pub use client::ApiClient;
pub use error::{ApiError, ErrorKind, NETWORK_ERROR_MESSAGE, SESSION_EXPIRED_MESSAGE};
pub use pipeline::DEMO_TOKEN;
pub use request::{ApiRequest, FormPart, MultipartForm, PreparedRequest, RequestBody, RequestOptions};
pub use response::ApiResponse;
pub use transport::{ReqwestTransport, Transport, TransportError};
