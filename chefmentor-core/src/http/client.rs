//! The HTTP client gateway.
//!
//! Every backend call goes through [`ApiClient`]. It attaches the stored
//! access token, normalizes failures into [`ApiError`], and recovers from
//! an expired access token by refreshing it once and replaying the request.
//!
//! Concurrent 401s share a single refresh: the first request to see one
//! runs the refresh, every other request queues behind it and is replayed
//! (or rejected) when it settles.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::future::{BoxFuture, FutureExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};

use super::error::ApiError;
use super::pipeline::{self, Classified};
use super::request::{ApiRequest, RequestBody, RequestOptions};
use super::response::ApiResponse;
use super::transport::{ReqwestTransport, Transport};
use crate::auth::{exchange_refresh_token, CredentialStore};
use crate::config::ClientConfig;

type Waiter = oneshot::Sender<Result<(), ApiError>>;

#[derive(Default)]
struct RefreshState {
    refreshing: bool,
    waiters: VecDeque<Waiter>,
}

enum RefreshRole {
    Leader,
    Waiter(oneshot::Receiver<Result<(), ApiError>>),
}

struct ClientInner {
    config: ClientConfig,
    transport: Arc<dyn Transport>,
    store: Arc<dyn CredentialStore>,
    refresh: Mutex<RefreshState>,
}

impl ClientInner {
    fn refresh_state(&self) -> MutexGuard<'_, RefreshState> {
        self.refresh.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn join_refresh(&self) -> RefreshRole {
        let mut state = self.refresh_state();
        if state.refreshing {
            let (tx, rx) = oneshot::channel();
            state.waiters.push_back(tx);
            RefreshRole::Waiter(rx)
        } else {
            state.refreshing = true;
            RefreshRole::Leader
        }
    }

    /// Clear the in-flight flag and release waiters in arrival order.
    fn finish_refresh(&self, outcome: &Result<(), ApiError>) {
        let waiters = {
            let mut state = self.refresh_state();
            state.refreshing = false;
            std::mem::take(&mut state.waiters)
        };

        debug!(count = waiters.len(), ok = outcome.is_ok(), "Releasing queued requests");
        for waiter in waiters {
            // A dropped receiver means the caller gave up
            let _ = waiter.send(outcome.clone());
        }
    }
}

/// Settles the refresh even if the leading request is dropped mid-flight.
struct RefreshGuard<'a> {
    inner: &'a ClientInner,
    settled: bool,
}

impl<'a> RefreshGuard<'a> {
    fn new(inner: &'a ClientInner) -> Self {
        Self {
            inner,
            settled: false,
        }
    }

    fn settle(mut self, outcome: &Result<(), ApiError>) {
        self.settled = true;
        self.inner.finish_refresh(outcome);
    }
}

impl Drop for RefreshGuard<'_> {
    fn drop(&mut self) {
        if !self.settled {
            warn!("Token refresh abandoned before completing");
            self.inner.finish_refresh(&Err(ApiError::refresh_aborted()));
        }
    }
}

/// Authenticated client for the ChefMentor backend.
///
/// Cheap to clone; clones share the refresh state.
#[derive(Clone)]
pub struct ApiClient {
    inner: Arc<ClientInner>,
}

impl ApiClient {
    pub fn new(
        config: ClientConfig,
        transport: Arc<dyn Transport>,
        store: Arc<dyn CredentialStore>,
    ) -> Self {
        Self {
            inner: Arc::new(ClientInner {
                config,
                transport,
                store,
                refresh: Mutex::new(RefreshState::default()),
            }),
        }
    }

    /// Client that talks to the network through reqwest.
    pub fn with_reqwest(config: ClientConfig, store: Arc<dyn CredentialStore>) -> Self {
        Self::new(config, Arc::new(ReqwestTransport::new()), store)
    }

    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    /// The store tokens are read from and written to.
    pub fn credentials(&self) -> &Arc<dyn CredentialStore> {
        &self.inner.store
    }

    // -------------------------------------------------------------------------
    // Request surface
    // -------------------------------------------------------------------------

    pub async fn request(&self, request: ApiRequest) -> Result<ApiResponse, ApiError> {
        self.dispatch(request).await
    }

    pub async fn get(&self, path: &str, options: RequestOptions) -> Result<ApiResponse, ApiError> {
        self.request(ApiRequest::get(path).with_options(options))
            .await
    }

    pub async fn post(
        &self,
        path: &str,
        body: impl Into<RequestBody>,
        options: RequestOptions,
    ) -> Result<ApiResponse, ApiError> {
        let request = ApiRequest::post(path).with_body(body).with_options(options);
        self.request(request).await
    }

    pub async fn put(
        &self,
        path: &str,
        body: impl Into<RequestBody>,
        options: RequestOptions,
    ) -> Result<ApiResponse, ApiError> {
        let request = ApiRequest::put(path).with_body(body).with_options(options);
        self.request(request).await
    }

    pub async fn delete(
        &self,
        path: &str,
        options: RequestOptions,
    ) -> Result<ApiResponse, ApiError> {
        self.request(ApiRequest::delete(path).with_options(options))
            .await
    }

    pub async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        options: RequestOptions,
    ) -> Result<T, ApiError> {
        self.get(path, options).await?.json()
    }

    pub async fn post_json<B, T>(
        &self,
        path: &str,
        body: &B,
        options: RequestOptions,
    ) -> Result<T, ApiError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let body = to_json(body)?;
        self.post(path, body, options).await?.json()
    }

    pub async fn put_json<B, T>(
        &self,
        path: &str,
        body: &B,
        options: RequestOptions,
    ) -> Result<T, ApiError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let body = to_json(body)?;
        self.put(path, body, options).await?.json()
    }

    // -------------------------------------------------------------------------
    // Pipeline
    // -------------------------------------------------------------------------

    /// One pass through the pipeline. Boxed because recovery replays the
    /// request through here again.
    fn dispatch(&self, mut request: ApiRequest) -> BoxFuture<'_, Result<ApiResponse, ApiError>> {
        async move {
            let inner = &*self.inner;
            let mut prepared = pipeline::prepare(&inner.config, &request)?;
            pipeline::attach_auth(inner.store.as_ref(), &mut prepared).await;

            let method = prepared.method.clone();
            let url = prepared.url.clone();
            let result = inner.transport.send(prepared).await;

            match pipeline::classify(&method, &url, result) {
                Classified::Success(response) => Ok(response),
                Classified::Failure(err) => Err(err),
                Classified::Unauthorized(response) if request.is_retried() => {
                    let err = ApiError::authentication(&response);
                    warn!(%method, %url, "Unauthorized after token refresh: {}", err.message);
                    Err(err)
                }
                Classified::Unauthorized(_) => {
                    debug!(%method, %url, "Access token rejected");
                    request.mark_retried();
                    self.recover_unauthorized(request).await
                }
            }
        }
        .boxed()
    }

    async fn recover_unauthorized(&self, request: ApiRequest) -> Result<ApiResponse, ApiError> {
        let inner = &*self.inner;

        match inner.join_refresh() {
            RefreshRole::Waiter(rx) => {
                debug!(path = %request.path, "Token refresh in progress, queueing request");
                match rx.await {
                    Ok(Ok(())) => self.dispatch(request).await,
                    Ok(Err(err)) => Err(err),
                    Err(_) => Err(ApiError::refresh_aborted()),
                }
            }
            RefreshRole::Leader => {
                let guard = RefreshGuard::new(inner);
                let outcome = self.run_refresh().await;
                guard.settle(&outcome);

                match outcome {
                    Ok(()) => self.dispatch(request).await,
                    Err(err) => Err(ApiError::session_expired(err)),
                }
            }
        }
    }

    /// Exchange the stored refresh token. On failure the session is cleared.
    async fn run_refresh(&self) -> Result<(), ApiError> {
        let outcome = self.exchange_tokens().await;

        match &outcome {
            Ok(()) => info!("Access token refreshed"),
            Err(err) => {
                warn!("Token refresh failed: {}", err);
                if let Err(e) = self.inner.store.clear_auth_data().await {
                    error!("Failed to clear credentials after refresh failure: {}", e);
                }
            }
        }
        outcome
    }

    async fn exchange_tokens(&self) -> Result<(), ApiError> {
        let inner = &*self.inner;

        let refresh_token = inner
            .store
            .refresh_token()
            .await
            .map_err(ApiError::credential_store)?
            .filter(|t| !t.is_empty())
            .ok_or_else(ApiError::missing_refresh_token)?;

        let tokens =
            exchange_refresh_token(inner.transport.as_ref(), &inner.config, &refresh_token).await?;

        inner
            .store
            .set_tokens(&tokens.access_token, tokens.refresh_token.as_deref())
            .await
            .map_err(ApiError::credential_store)
    }
}

fn to_json<B: Serialize + ?Sized>(body: &B) -> Result<serde_json::Value, ApiError> {
    serde_json::to_value(body)
        .map_err(|e| ApiError::invalid_request(format!("Failed to serialize request body: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{MemoryCredentialStore, SessionCredentials};
    use crate::http::testing::ScriptedTransport;
    use crate::http::{ErrorKind, MultipartForm, TransportError};
    use reqwest::StatusCode;
    use serde_json::json;
    use std::time::Duration;

    const REFRESH: &str = "/auth/refresh";

    fn config() -> ClientConfig {
        ClientConfig::new("http://localhost:8000/api/v1")
    }

    /// Accepts only `Bearer new`; the refresh endpoint issues `new`.
    fn backend() -> ScriptedTransport {
        ScriptedTransport::new(|req| {
            if req.url.path().ends_with(REFRESH) {
                return ApiResponse::json_body(
                    StatusCode::OK,
                    &json!({"access_token": "new", "refresh_token": "r2"}),
                );
            }
            if req.authorization() == Some("Bearer new") {
                ApiResponse::json_body(StatusCode::OK, &json!({"path": req.url.path()}))
            } else {
                ApiResponse::json_body(StatusCode::UNAUTHORIZED, &json!({"detail": "Token expired"}))
            }
        })
        .with_delay(REFRESH, Duration::from_millis(50))
    }

    fn setup(
        transport: ScriptedTransport,
        store: MemoryCredentialStore,
    ) -> (ApiClient, Arc<ScriptedTransport>, Arc<MemoryCredentialStore>) {
        let transport = Arc::new(transport);
        let store = Arc::new(store);
        let client = ApiClient::new(config(), transport.clone(), store.clone());
        (client, transport, store)
    }

    fn is_refreshing(client: &ApiClient) -> bool {
        client.inner.refresh_state().refreshing
    }

    #[tokio::test]
    async fn test_attaches_stored_token() {
        let (client, transport, _) = setup(
            ScriptedTransport::new(|_| ApiResponse::json_body(StatusCode::OK, &json!({"ok": true}))),
            MemoryCredentialStore::with_tokens("abc", None),
        );

        let resp = client.get("/recipes", RequestOptions::new()).await.unwrap();
        assert_eq!(resp.status, StatusCode::OK);
        assert_eq!(resp.json_value(), json!({"ok": true}));
        assert_eq!(transport.requests()[0].authorization(), Some("Bearer abc"));
    }

    #[tokio::test]
    async fn test_demo_token_is_not_sent() {
        let (client, transport, _) = setup(
            ScriptedTransport::new(|_| ApiResponse::new(StatusCode::OK, "")),
            MemoryCredentialStore::with_tokens("demo-token", None),
        );

        client.get("/recipes", RequestOptions::new()).await.unwrap();
        assert_eq!(transport.requests()[0].authorization(), None);
    }

    #[tokio::test]
    async fn test_network_error_does_not_refresh() {
        let (client, transport, store) = setup(
            ScriptedTransport::fallible(|_| Err(TransportError::Connect("refused".into()))),
            MemoryCredentialStore::with_tokens("old", Some("r1")),
        );

        let err = client.get("/recipes", RequestOptions::new()).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Network);
        assert_eq!(err.status, None);
        assert_eq!(err.message, "Network error. Please check your connection.");
        assert_eq!(transport.count(REFRESH), 0);
        assert_eq!(store.access_token().await.unwrap().as_deref(), Some("old"));
    }

    #[tokio::test]
    async fn test_other_statuses_do_not_refresh() {
        let (client, transport, _) = setup(
            ScriptedTransport::new(|_| {
                ApiResponse::json_body(StatusCode::FORBIDDEN, &json!({"message": "Not your session"}))
            }),
            MemoryCredentialStore::with_tokens("old", Some("r1")),
        );

        let err = client
            .post("/cooking/start", json!({"recipe_id": "r"}), RequestOptions::new())
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Forbidden);
        assert_eq!(err.status, Some(403));
        assert_eq!(err.message, "Not your session");
        assert_eq!(transport.count(REFRESH), 0);
    }

    #[tokio::test]
    async fn test_single_401_refreshes_and_replays() {
        let (client, transport, store) = setup(
            backend(),
            MemoryCredentialStore::with_tokens("old", Some("r1")),
        );

        let resp = client.get("/recipes", RequestOptions::new()).await.unwrap();
        assert_eq!(resp.json_value(), json!({"path": "/api/v1/recipes"}));

        let sent = transport.requests();
        assert_eq!(sent.len(), 3);
        assert_eq!(sent[0].authorization(), Some("Bearer old"));
        assert_eq!(sent[1].url.path(), "/api/v1/auth/refresh");
        assert_eq!(sent[1].authorization(), None);
        assert_eq!(sent[2].authorization(), Some("Bearer new"));

        let creds = store.credentials().await.unwrap();
        assert_eq!(creds.access_token.as_deref(), Some("new"));
        assert_eq!(creds.refresh_token.as_deref(), Some("r2"));
        assert!(!is_refreshing(&client));
    }

    #[tokio::test]
    async fn test_concurrent_401s_share_one_refresh() {
        let (client, transport, store) = setup(
            backend(),
            MemoryCredentialStore::with_tokens("old", Some("r1")),
        );

        let (a, b, c) = tokio::join!(
            client.get("/a", RequestOptions::new()),
            client.get("/b", RequestOptions::new()),
            client.get("/c", RequestOptions::new()),
        );

        assert_eq!(a.unwrap().json_value(), json!({"path": "/api/v1/a"}));
        assert_eq!(b.unwrap().json_value(), json!({"path": "/api/v1/b"}));
        assert_eq!(c.unwrap().json_value(), json!({"path": "/api/v1/c"}));

        assert_eq!(transport.count(REFRESH), 1);
        for path in ["/a", "/b", "/c"] {
            assert_eq!(transport.count(path), 2, "{path} sent exactly twice");
        }
        assert_eq!(store.access_token().await.unwrap().as_deref(), Some("new"));
        assert!(!is_refreshing(&client));
    }

    #[tokio::test]
    async fn test_refresh_failure_expires_session_for_everyone() {
        let transport = ScriptedTransport::new(|req| {
            if req.url.path().ends_with(REFRESH) {
                ApiResponse::json_body(
                    StatusCode::UNAUTHORIZED,
                    &json!({"detail": "Invalid or expired refresh token"}),
                )
            } else {
                ApiResponse::new(StatusCode::UNAUTHORIZED, "")
            }
        })
        .with_delay(REFRESH, Duration::from_millis(50));
        let (client, transport, store) =
            setup(transport, MemoryCredentialStore::with_tokens("old", Some("r1")));
        store.set_user_data(&json!({"id": "u1"})).await.unwrap();

        let (leader, waiter) = tokio::join!(
            client.get("/a", RequestOptions::new()),
            client.get("/b", RequestOptions::new()),
        );

        let leader = leader.unwrap_err();
        assert_eq!(leader.kind, ErrorKind::SessionExpired);
        assert_eq!(leader.message, "Session expired. Please login again.");
        assert_eq!(
            leader.cause().unwrap().to_string(),
            "Invalid or expired refresh token"
        );

        let waiter = waiter.unwrap_err();
        assert_eq!(waiter.kind, ErrorKind::Authentication);
        assert_eq!(waiter.message, "Invalid or expired refresh token");

        assert_eq!(transport.count(REFRESH), 1);
        assert_eq!(transport.count("/b"), 1);
        assert_eq!(store.credentials().await.unwrap(), SessionCredentials::default());
        assert!(store.user_data().await.unwrap().is_none());
        assert!(!is_refreshing(&client));
    }

    #[tokio::test]
    async fn test_refresh_failure_rejects_every_queued_request() {
        let transport = ScriptedTransport::new(|req| {
            if req.url.path().ends_with(REFRESH) {
                ApiResponse::json_body(StatusCode::UNAUTHORIZED, &json!({"detail": "Refresh revoked"}))
            } else {
                ApiResponse::new(StatusCode::UNAUTHORIZED, "")
            }
        })
        .with_delay(REFRESH, Duration::from_millis(50));
        let (client, transport, store) =
            setup(transport, MemoryCredentialStore::with_tokens("old", Some("r1")));

        let (a, b, c, d) = tokio::join!(
            client.get("/a", RequestOptions::new()),
            client.get("/b", RequestOptions::new()),
            client.get("/c", RequestOptions::new()),
            client.get("/d", RequestOptions::new()),
        );

        assert_eq!(a.unwrap_err().kind, ErrorKind::SessionExpired);
        for waiter in [b, c, d] {
            let err = waiter.unwrap_err();
            assert_eq!(err.kind, ErrorKind::Authentication);
            assert_eq!(err.message, "Refresh revoked");
        }

        assert_eq!(transport.count(REFRESH), 1);
        for path in ["/a", "/b", "/c", "/d"] {
            assert_eq!(transport.count(path), 1, "{path} must not be replayed");
        }
        assert!(store.access_token().await.unwrap().is_none());
        assert!(!is_refreshing(&client));
    }

    #[tokio::test]
    async fn test_replayed_waiters_are_not_refreshed_again() {
        let transport = ScriptedTransport::new(|req| {
            if req.url.path().ends_with(REFRESH) {
                ApiResponse::json_body(StatusCode::OK, &json!({"access_token": "new"}))
            } else {
                ApiResponse::json_body(StatusCode::UNAUTHORIZED, &json!({"detail": "Nope"}))
            }
        })
        .with_delay(REFRESH, Duration::from_millis(50));
        let (client, transport, _) =
            setup(transport, MemoryCredentialStore::with_tokens("old", Some("r1")));

        let (a, b, c) = tokio::join!(
            client.get("/a", RequestOptions::new()),
            client.get("/b", RequestOptions::new()),
            client.get("/c", RequestOptions::new()),
        );

        for result in [a, b, c] {
            let err = result.unwrap_err();
            assert_eq!(err.kind, ErrorKind::Authentication);
            assert_eq!(err.status, Some(401));
        }
        assert_eq!(transport.count(REFRESH), 1);
        for path in ["/a", "/b", "/c"] {
            assert_eq!(transport.count(path), 2, "{path} sent exactly twice");
        }
        assert!(!is_refreshing(&client));
    }

    #[tokio::test]
    async fn test_waiters_replay_in_arrival_order() {
        let (client, transport, _) = setup(
            backend(),
            MemoryCredentialStore::with_tokens("old", Some("r1")),
        );

        let mut handles = Vec::new();
        for (i, path) in ["/leader", "/w1", "/w2", "/w3"].into_iter().enumerate() {
            let client = client.clone();
            handles.push(tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(5 * i as u64)).await;
                client.get(path, RequestOptions::new()).await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let replayed: Vec<String> = transport
            .requests()
            .iter()
            .filter(|r| r.authorization() == Some("Bearer new"))
            .map(|r| r.url.path().trim_start_matches("/api/v1").to_string())
            .collect();
        assert_eq!(replayed, ["/leader", "/w1", "/w2", "/w3"]);
        assert_eq!(transport.count(REFRESH), 1);
    }

    #[tokio::test]
    async fn test_unbuildable_upload_is_invalid_request() {
        let store = Arc::new(MemoryCredentialStore::with_tokens("old", Some("r1")));
        let client = ApiClient::with_reqwest(
            ClientConfig::new("http://127.0.0.1:9/api/v1"),
            store.clone(),
        );
        let form = MultipartForm::new().file("file", "x.bin", "not a mime", vec![0]);

        let err = client
            .post("/failure/analyze", form, RequestOptions::new())
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidRequest);
        assert_eq!(err.status, None);
        assert!(!err.is_network());
        assert!(err.message.contains("Invalid MIME type"));
        assert_eq!(store.access_token().await.unwrap().as_deref(), Some("old"));
    }

    #[tokio::test]
    async fn test_missing_refresh_token_expires_session() {
        let (client, transport, store) = setup(
            backend(),
            MemoryCredentialStore::with_tokens("old", None),
        );

        let err = client.get("/recipes", RequestOptions::new()).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::SessionExpired);
        assert_eq!(err.cause().unwrap().to_string(), "No refresh token available");
        assert_eq!(transport.count(REFRESH), 0);
        assert!(store.access_token().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_401_after_refresh_is_not_retried_again() {
        let transport = ScriptedTransport::new(|req| {
            if req.url.path().ends_with(REFRESH) {
                ApiResponse::json_body(StatusCode::OK, &json!({"access_token": "new"}))
            } else {
                ApiResponse::json_body(StatusCode::UNAUTHORIZED, &json!({"detail": "Nope"}))
            }
        });
        let (client, transport, store) =
            setup(transport, MemoryCredentialStore::with_tokens("old", Some("r1")));

        let err = client.get("/recipes", RequestOptions::new()).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Authentication);
        assert_eq!(err.status, Some(401));
        assert_eq!(err.message, "Nope");

        assert_eq!(transport.count(REFRESH), 1);
        assert_eq!(transport.count("/recipes"), 2);
        // No rotation: the old refresh token is kept
        assert_eq!(store.refresh_token().await.unwrap().as_deref(), Some("r1"));
    }

    #[tokio::test]
    async fn test_dropped_leader_releases_waiters() {
        let transport = ScriptedTransport::new(|req| {
            if req.url.path().ends_with(REFRESH) {
                ApiResponse::json_body(StatusCode::OK, &json!({"access_token": "new"}))
            } else {
                ApiResponse::new(StatusCode::UNAUTHORIZED, "")
            }
        })
        .with_delay(REFRESH, Duration::from_secs(5));
        let (client, _, _) = setup(transport, MemoryCredentialStore::with_tokens("old", Some("r1")));

        let leader = tokio::time::timeout(
            Duration::from_millis(100),
            client.get("/a", RequestOptions::new()),
        );
        let waiter = async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            client.get("/b", RequestOptions::new()).await
        };
        let (leader, waiter) = tokio::join!(leader, waiter);

        assert!(leader.is_err(), "leader should time out");
        let err = waiter.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Authentication);
        assert_eq!(err.message, ApiError::refresh_aborted().message);
        assert!(!is_refreshing(&client));
    }

    #[tokio::test]
    async fn test_json_helpers() {
        #[derive(serde::Deserialize)]
        struct Echo {
            path: String,
        }

        let (client, transport, _) = setup(
            ScriptedTransport::new(|req| {
                ApiResponse::json_body(StatusCode::OK, &json!({"path": req.url.path()}))
            }),
            MemoryCredentialStore::new(),
        );

        let echo: Echo = client
            .post_json("/voice/command", &json!({"text": "next step"}), RequestOptions::new())
            .await
            .unwrap();
        assert_eq!(echo.path, "/api/v1/voice/command");
        assert_eq!(
            transport.requests()[0].body,
            RequestBody::Json(json!({"text": "next step"}))
        );

        let echo: Echo = client.get_json("/recipes/1", RequestOptions::new()).await.unwrap();
        assert_eq!(echo.path, "/api/v1/recipes/1");
    }
}
