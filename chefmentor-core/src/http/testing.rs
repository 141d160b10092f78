//! Scripted transport for tests.

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use super::request::PreparedRequest;
use super::response::ApiResponse;
use super::transport::{Transport, TransportError};

type Responder =
    Box<dyn Fn(&PreparedRequest) -> Result<ApiResponse, TransportError> + Send + Sync>;

/// Answers every request from a closure and records what was sent.
pub struct ScriptedTransport {
    responder: Responder,
    delays: Vec<(String, Duration)>,
    sent: Mutex<Vec<PreparedRequest>>,
}

impl ScriptedTransport {
    pub fn new(
        responder: impl Fn(&PreparedRequest) -> ApiResponse + Send + Sync + 'static,
    ) -> Self {
        Self::fallible(move |req| Ok(responder(req)))
    }

    pub fn fallible(
        responder: impl Fn(&PreparedRequest) -> Result<ApiResponse, TransportError>
            + Send
            + Sync
            + 'static,
    ) -> Self {
        Self {
            responder: Box::new(responder),
            delays: Vec::new(),
            sent: Mutex::new(Vec::new()),
        }
    }

    /// Hold responses for URLs whose path ends with `suffix`.
    pub fn with_delay(mut self, suffix: &str, delay: Duration) -> Self {
        self.delays.push((suffix.to_string(), delay));
        self
    }

    pub fn requests(&self) -> Vec<PreparedRequest> {
        self.sent.lock().unwrap().clone()
    }

    /// Number of requests sent to URLs whose path ends with `suffix`.
    pub fn count(&self, suffix: &str) -> usize {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.url.path().ends_with(suffix))
            .count()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(&self, request: PreparedRequest) -> Result<ApiResponse, TransportError> {
        self.sent.lock().unwrap().push(request.clone());

        let delay = self
            .delays
            .iter()
            .find(|(suffix, _)| request.url.path().ends_with(suffix.as_str()))
            .map(|(_, d)| *d);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        (self.responder)(&request)
    }
}
