//! API client for the business-management backend.
//!
//! Every call goes through [`ApiClient::request`], which attaches the bearer
//! token from the [`CredentialStore`], renews an expired session once on a
//! 401, and tears the session down when renewal is impossible.

use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt, Shared};
use reqwest::header::{self, HeaderMap, HeaderName, HeaderValue};
use reqwest::{Method, StatusCode};
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, info, warn};

use crate::auth::{CredentialStore, CurrentTokens};
use crate::models::{
    ChangePasswordRequest, ForgotPasswordRequest, LoginRequest, LoginResponse, ProfileUpdate,
    RefreshTokenRequest, RefreshTokenResponse, RegisterRequest, User,
};
use crate::navigation::{Navigator, LOGIN_PATH};

use super::transport::{HttpRequest, HttpResponse, ReqwestTransport, Transport};
use super::ApiError;

// ============================================================================
// Constants
// ============================================================================

/// Base URL for all API endpoints
pub const DEFAULT_BASE_URL: &str =
    "https://lab05webapiml20-amhucufsctatapgu.canadacentral-01.azurewebsites.net/api";

/// HTTP request timeout in seconds.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

const LOGIN_ENDPOINT: &str = "/Authentication/login";
const REGISTER_ENDPOINT: &str = "/Authentication/register";
const FORGOT_PASSWORD_ENDPOINT: &str = "/Authentication/forgot-password";
const CHANGE_PASSWORD_ENDPOINT: &str = "/Authentication/change-password";
const PROFILE_ENDPOINT: &str = "/Authentication/profile";
const REFRESH_TOKEN_ENDPOINT: &str = "/Authentication/refresh-token";

const JSON_CONTENT_TYPE: &str = "application/json";

// ============================================================================
// Request configuration
// ============================================================================

/// Per-call options for [`ApiClient::request`].
#[derive(Debug, Clone)]
pub struct RequestConfig {
    pub method: Method,
    pub body: Option<serde_json::Value>,
    /// Merged over the default JSON headers; these win on conflict.
    pub headers: HeaderMap,
    pub requires_auth: bool,
}

impl RequestConfig {
    pub fn new(method: Method) -> Self {
        Self {
            method,
            body: None,
            headers: HeaderMap::new(),
            requires_auth: true,
        }
    }

    pub fn get() -> Self {
        Self::new(Method::GET)
    }

    pub fn delete() -> Self {
        Self::new(Method::DELETE)
    }

    pub fn post<B: Serialize>(body: &B) -> Result<Self, ApiError> {
        Self::new(Method::POST).with_body(body)
    }

    pub fn put<B: Serialize>(body: &B) -> Result<Self, ApiError> {
        Self::new(Method::PUT).with_body(body)
    }

    pub fn with_body<B: Serialize>(mut self, body: &B) -> Result<Self, ApiError> {
        self.body = Some(serde_json::to_value(body)?);
        Ok(self)
    }

    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn unauthenticated(mut self) -> Self {
        self.requires_auth = false;
        self
    }
}

/// Where a call stands with respect to session renewal.
///
/// A call may renew the session at most once; a 401 in `AfterRefresh` is
/// terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Attempt {
    Initial,
    AfterRefresh,
}

type RefreshFuture = Shared<BoxFuture<'static, bool>>;

// ============================================================================
// Client
// ============================================================================

/// API client with session renewal.
/// Clone is cheap - all state is behind one Arc.
#[derive(Clone)]
pub struct ApiClient {
    inner: Arc<Inner>,
}

struct Inner {
    backend: Arc<Backend>,
    navigator: Arc<dyn Navigator>,
    /// Refresh currently in flight, shared by every call that hit a 401
    /// while it runs. The future itself only holds a `Weak` to this slot.
    refresh: Arc<Mutex<Option<RefreshFuture>>>,
}

/// What both regular calls and the refresh future need.
struct Backend {
    base_url: String,
    transport: Arc<dyn Transport>,
    store: Arc<CredentialStore>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn json_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(JSON_CONTENT_TYPE));
    headers.insert(header::ACCEPT, HeaderValue::from_static(JSON_CONTENT_TYPE));
    headers
}

impl ApiClient {
    /// Create a client over a reqwest transport
    pub fn new(
        base_url: impl Into<String>,
        store: Arc<CredentialStore>,
        navigator: Arc<dyn Navigator>,
        timeout: Duration,
    ) -> Result<Self, ApiError> {
        let transport = ReqwestTransport::new(timeout)?;
        Ok(Self::with_transport(
            base_url,
            Arc::new(transport),
            store,
            navigator,
        ))
    }

    pub fn with_transport(
        base_url: impl Into<String>,
        transport: Arc<dyn Transport>,
        store: Arc<CredentialStore>,
        navigator: Arc<dyn Navigator>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                backend: Arc::new(Backend {
                    base_url: base_url.into(),
                    transport,
                    store,
                }),
                navigator,
                refresh: Arc::new(Mutex::new(None)),
            }),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.inner.backend.base_url
    }

    pub fn store(&self) -> &Arc<CredentialStore> {
        &self.inner.backend.store
    }

    /// Issue a request against `base_url + endpoint` and decode the JSON
    /// response.
    ///
    /// On a 401 for an authenticated call the session is renewed once and
    /// the call re-issued. If renewal fails, or the re-issued call is also
    /// rejected, stored credentials are cleared, the navigator is sent to
    /// the login page and `ApiError::AuthenticationFailed` is returned.
    pub async fn request<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        config: RequestConfig,
    ) -> Result<T, ApiError> {
        let url = format!("{}{}", self.inner.backend.base_url, endpoint);
        let body = config.body.as_ref().map(serde_json::to_string).transpose()?;

        let mut attempt = Attempt::Initial;
        loop {
            let request = HttpRequest {
                method: config.method.clone(),
                url: url.clone(),
                headers: self.build_headers(&config)?,
                body: body.clone(),
            };
            debug!(method = %request.method, url = %url, ?attempt, "Sending request");
            let response = self.inner.backend.transport.send(request).await?;

            if response.status == StatusCode::UNAUTHORIZED && config.requires_auth {
                if attempt == Attempt::Initial && refresh_shared(&self.inner).await {
                    attempt = Attempt::AfterRefresh;
                    continue;
                }
                return Err(self.end_session(&url));
            }

            return Self::check_response(&url, response);
        }
    }

    fn build_headers(&self, config: &RequestConfig) -> Result<HeaderMap, ApiError> {
        let mut headers = json_headers();
        headers.extend(config.headers.clone());

        if config.requires_auth {
            if let Some(token) = self.inner.backend.store.current_tokens().token {
                headers.insert(
                    header::AUTHORIZATION,
                    HeaderValue::from_str(&format!("Bearer {}", token))?,
                );
            }
        }
        Ok(headers)
    }

    fn check_response<T: DeserializeOwned>(url: &str, response: HttpResponse) -> Result<T, ApiError> {
        if !response.status.is_success() {
            warn!(
                status = response.status.as_u16(),
                url,
                body = %ApiError::truncate_body(&response.body),
                "Error response from API"
            );
            return Err(ApiError::from_response(response.status, &response.body));
        }

        // 204 and friends carry no body; decode them as JSON null
        let body = if response.body.trim().is_empty() {
            "null"
        } else {
            response.body.as_str()
        };
        serde_json::from_str(body)
            .map_err(|e| ApiError::InvalidResponse(format!("{}: {}", url, e)))
    }

    fn end_session(&self, url: &str) -> ApiError {
        warn!(url, "Session could not be renewed, logging out");
        if let Err(e) = self.inner.backend.store.clear_auth() {
            warn!(error = %e, "Failed to clear stored credentials");
        }
        self.inner.navigator.navigate(LOGIN_PATH);
        ApiError::AuthenticationFailed
    }

    // ===== Authentication =====

    pub async fn login(&self, credentials: &LoginRequest) -> Result<LoginResponse, ApiError> {
        self.request(
            LOGIN_ENDPOINT,
            RequestConfig::post(credentials)?.unauthenticated(),
        )
        .await
    }

    pub async fn register(&self, registration: &RegisterRequest) -> Result<serde_json::Value, ApiError> {
        self.request(
            REGISTER_ENDPOINT,
            RequestConfig::post(registration)?.unauthenticated(),
        )
        .await
    }

    pub async fn forgot_password(&self, email: &str) -> Result<serde_json::Value, ApiError> {
        let body = ForgotPasswordRequest {
            email: email.to_string(),
        };
        self.request(
            FORGOT_PASSWORD_ENDPOINT,
            RequestConfig::post(&body)?.unauthenticated(),
        )
        .await
    }

    pub async fn change_password(
        &self,
        passwords: &ChangePasswordRequest,
    ) -> Result<serde_json::Value, ApiError> {
        self.request(CHANGE_PASSWORD_ENDPOINT, RequestConfig::post(passwords)?)
            .await
    }

    pub async fn profile(&self) -> Result<User, ApiError> {
        self.request(PROFILE_ENDPOINT, RequestConfig::get()).await
    }

    pub async fn update_profile(&self, update: &ProfileUpdate) -> Result<User, ApiError> {
        self.request(PROFILE_ENDPOINT, RequestConfig::put(update)?).await
    }

    // ===== Generic authenticated calls =====

    pub async fn get<T: DeserializeOwned>(&self, endpoint: &str) -> Result<T, ApiError> {
        self.request(endpoint, RequestConfig::get()).await
    }

    pub async fn post<T: DeserializeOwned, B: Serialize>(
        &self,
        endpoint: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        self.request(endpoint, RequestConfig::post(body)?).await
    }

    pub async fn put<T: DeserializeOwned, B: Serialize>(
        &self,
        endpoint: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        self.request(endpoint, RequestConfig::put(body)?).await
    }

    pub async fn delete<T: DeserializeOwned>(&self, endpoint: &str) -> Result<T, ApiError> {
        self.request(endpoint, RequestConfig::delete()).await
    }
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient")
            .field("base_url", &self.inner.backend.base_url)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Session renewal
// ============================================================================

/// Join the refresh in flight, or start one.
async fn refresh_shared(inner: &Inner) -> bool {
    let refresh = {
        let mut slot = lock(&inner.refresh);
        match slot.as_ref() {
            Some(in_flight) => {
                debug!("Joining in-flight token refresh");
                in_flight.clone()
            }
            None => {
                let backend = Arc::clone(&inner.backend);
                let owner: Weak<Mutex<Option<RefreshFuture>>> = Arc::downgrade(&inner.refresh);
                let refresh = async move {
                    let refreshed = backend.refresh_tokens().await;
                    if let Some(slot) = owner.upgrade() {
                        lock(&slot).take();
                    }
                    refreshed
                }
                .boxed()
                .shared();
                *slot = Some(refresh.clone());
                refresh
            }
        }
    };
    refresh.await
}

impl Backend {
    /// Exchange the stored refresh token for a new token pair and store it
    /// in the tier the remember-me flag selects.
    async fn refresh_tokens(&self) -> bool {
        let CurrentTokens {
            refresh_token,
            remember_me,
            ..
        } = self.store.current_tokens();

        let Some(refresh_token) = refresh_token else {
            debug!("No refresh token stored, cannot renew session");
            return false;
        };

        let body = match serde_json::to_string(&RefreshTokenRequest { refresh_token }) {
            Ok(body) => body,
            Err(e) => {
                warn!(error = %e, "Failed to encode refresh request");
                return false;
            }
        };
        let request = HttpRequest {
            method: Method::POST,
            url: format!("{}{}", self.base_url, REFRESH_TOKEN_ENDPOINT),
            headers: json_headers(),
            body: Some(body),
        };

        let response = match self.transport.send(request).await {
            Ok(response) => response,
            Err(e) => {
                warn!(error = %e, "Token refresh failed");
                return false;
            }
        };
        if !response.status.is_success() {
            warn!(status = response.status.as_u16(), "Token refresh rejected");
            return false;
        }

        let tokens: RefreshTokenResponse = match serde_json::from_str(&response.body) {
            Ok(tokens) => tokens,
            Err(e) => {
                warn!(error = %e, "Failed to parse refresh response");
                return false;
            }
        };

        let stored = self
            .store
            .set_token(&tokens.token, remember_me)
            .and_then(|_| self.store.set_refresh_token(&tokens.refresh_token, remember_me));
        if let Err(e) = stored {
            warn!(error = %e, "Failed to store refreshed tokens");
            return false;
        }

        info!(remember_me, "Session renewed");
        true
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::collections::VecDeque;

    use async_trait::async_trait;

    use super::*;
    use crate::auth::credentials::tests::memory_store;
    use crate::auth::storage::{MemoryStorage, StorageTier};

    const BASE: &str = "https://api.test/api";

    /// Transport that replays canned outcomes in order and records requests.
    #[derive(Default)]
    pub(crate) struct ScriptedTransport {
        responses: Mutex<VecDeque<Result<HttpResponse, ApiError>>>,
        pub(crate) requests: Mutex<Vec<HttpRequest>>,
    }

    /// A canned response.
    pub(crate) fn reply(status: u16, body: &str) -> Result<HttpResponse, ApiError> {
        Ok(HttpResponse::new(StatusCode::from_u16(status).unwrap(), body))
    }

    /// A canned transport failure.
    pub(crate) fn fail(reason: &str) -> Result<HttpResponse, ApiError> {
        Err(ApiError::InvalidResponse(reason.to_string()))
    }

    impl ScriptedTransport {
        pub(crate) fn new(responses: Vec<(u16, &str)>) -> Arc<Self> {
            Self::with_results(
                responses
                    .into_iter()
                    .map(|(status, body)| reply(status, body))
                    .collect(),
            )
        }

        pub(crate) fn with_results(results: Vec<Result<HttpResponse, ApiError>>) -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(results.into()),
                requests: Mutex::new(Vec::new()),
            })
        }

        pub(crate) fn urls(&self) -> Vec<String> {
            self.requests.lock().unwrap().iter().map(|r| r.url.clone()).collect()
        }

        fn request(&self, index: usize) -> HttpRequest {
            self.requests.lock().unwrap()[index].clone()
        }
    }

    #[async_trait]
    impl Transport for ScriptedTransport {
        async fn send(&self, request: HttpRequest) -> Result<HttpResponse, ApiError> {
            self.requests.lock().unwrap().push(request);
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .expect("unexpected request")
        }
    }

    #[derive(Default)]
    pub(crate) struct RecordingNavigator {
        pub(crate) paths: Mutex<Vec<String>>,
    }

    impl Navigator for RecordingNavigator {
        fn navigate(&self, path: &str) {
            self.paths.lock().unwrap().push(path.to_string());
        }
    }

    struct Fixture {
        client: ApiClient,
        transport: Arc<ScriptedTransport>,
        navigator: Arc<RecordingNavigator>,
        durable: Arc<MemoryStorage>,
        ephemeral: Arc<MemoryStorage>,
    }

    fn fixture(responses: Vec<(u16, &str)>) -> Fixture {
        fixture_with_results(
            responses
                .into_iter()
                .map(|(status, body)| reply(status, body))
                .collect(),
        )
    }

    fn fixture_with_results(results: Vec<Result<HttpResponse, ApiError>>) -> Fixture {
        let (store, durable, ephemeral) = memory_store();
        let transport = ScriptedTransport::with_results(results);
        let navigator = Arc::new(RecordingNavigator::default());
        let client = ApiClient::with_transport(
            BASE,
            transport.clone(),
            Arc::new(store),
            navigator.clone(),
        );
        Fixture {
            client,
            transport,
            navigator,
            durable,
            ephemeral,
        }
    }

    fn header<'a>(request: &'a HttpRequest, name: &str) -> Option<&'a str> {
        request.headers.get(name).and_then(|v| v.to_str().ok())
    }

    #[tokio::test]
    async fn test_success_attaches_bearer_and_json_headers() {
        let f = fixture(vec![(200, r#"{"id": "1", "email": "ana@example.com"}"#)]);
        f.client.store().set_remember_me(true).unwrap();
        f.client.store().set_token("abc", true).unwrap();

        let user = f.client.profile().await.unwrap();
        assert_eq!(user.email, "ana@example.com");

        let request = f.transport.request(0);
        assert_eq!(request.method, Method::GET);
        assert_eq!(request.url, format!("{}/Authentication/profile", BASE));
        assert_eq!(header(&request, "authorization"), Some("Bearer abc"));
        assert_eq!(header(&request, "content-type"), Some("application/json"));
        assert_eq!(header(&request, "accept"), Some("application/json"));
    }

    #[tokio::test]
    async fn test_caller_headers_override_defaults() {
        let f = fixture(vec![(200, "{}")]);
        let config = RequestConfig::get().with_header(
            header::ACCEPT,
            HeaderValue::from_static("application/vnd.api+json"),
        );

        let _: serde_json::Value = f.client.request("/Products", config).await.unwrap();

        let request = f.transport.request(0);
        assert_eq!(header(&request, "accept"), Some("application/vnd.api+json"));
        assert_eq!(header(&request, "content-type"), Some("application/json"));
    }

    #[tokio::test]
    async fn test_missing_token_still_sends_request() {
        let f = fixture(vec![(200, "[]")]);
        let customers: Vec<serde_json::Value> = f.client.get("/Customers").await.unwrap();
        assert!(customers.is_empty());
        assert_eq!(header(&f.transport.request(0), "authorization"), None);
    }

    #[tokio::test]
    async fn test_unauthenticated_call_skips_token() {
        let f = fixture(vec![(200, r#"{"success": true}"#)]);
        f.client.store().set_token("abc", false).unwrap();

        f.client.forgot_password("ana@example.com").await.unwrap();

        let request = f.transport.request(0);
        assert_eq!(header(&request, "authorization"), None);
        assert_eq!(request.body.as_deref(), Some(r#"{"email":"ana@example.com"}"#));
    }

    #[tokio::test]
    async fn test_refresh_then_single_retry() {
        let f = fixture(vec![
            (401, ""),
            (200, r#"{"token": "new-token", "refreshToken": "new-refresh"}"#),
            (200, r#"{"id": 7, "name": "Widget"}"#),
        ]);
        let store = f.client.store();
        store.set_token("old-token", false).unwrap();
        store.set_refresh_token("old-refresh", false).unwrap();

        let product: serde_json::Value = f.client.get("/Products/7").await.unwrap();
        assert_eq!(product, serde_json::json!({"id": 7, "name": "Widget"}));

        assert_eq!(
            f.transport.urls(),
            vec![
                format!("{}/Products/7", BASE),
                format!("{}/Authentication/refresh-token", BASE),
                format!("{}/Products/7", BASE),
            ]
        );

        let refresh = f.transport.request(1);
        assert_eq!(header(&refresh, "authorization"), None);
        assert_eq!(refresh.body.as_deref(), Some(r#"{"refreshToken":"old-refresh"}"#));
        assert_eq!(header(&f.transport.request(2), "authorization"), Some("Bearer new-token"));

        assert_eq!(store.token(false).as_deref(), Some("new-token"));
        assert_eq!(store.refresh_token(false).as_deref(), Some("new-refresh"));
        assert!(f.durable.is_empty());
        assert!(f.navigator.paths.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_failed_refresh_ends_session() {
        let f = fixture(vec![(401, ""), (400, r#"{"message": "expired"}"#)]);
        let store = f.client.store();
        store.set_remember_me(true).unwrap();
        store.set_token("old-token", true).unwrap();
        store.set_refresh_token("old-refresh", true).unwrap();
        store.set_user(&User::default(), true).unwrap();

        let err = f.client.get::<serde_json::Value>("/Suppliers").await.unwrap_err();
        assert!(err.is_auth_failure());
        assert_eq!(err.to_string(), "Authentication failed");

        assert!(f.durable.is_empty());
        assert!(f.ephemeral.is_empty());
        assert_eq!(*f.navigator.paths.lock().unwrap(), vec!["/login".to_string()]);
        assert_eq!(f.transport.urls().len(), 2);
    }

    #[tokio::test]
    async fn test_unreachable_refresh_endpoint_ends_session() {
        let f = fixture_with_results(vec![reply(401, ""), fail("connection reset")]);
        let store = f.client.store();
        store.set_token("old-token", false).unwrap();
        store.set_refresh_token("old-refresh", false).unwrap();

        let err = f.client.get::<serde_json::Value>("/Customers").await.unwrap_err();
        assert!(err.is_auth_failure());
        assert_eq!(f.transport.urls().len(), 2);
        assert!(f.ephemeral.is_empty());
        assert_eq!(*f.navigator.paths.lock().unwrap(), vec!["/login".to_string()]);
    }

    #[tokio::test]
    async fn test_unparsable_refresh_body_ends_session() {
        let f = fixture(vec![(401, ""), (200, r#"{"token": "only-half"}"#)]);
        let store = f.client.store();
        store.set_token("old-token", false).unwrap();
        store.set_refresh_token("old-refresh", false).unwrap();

        let err = f.client.get::<serde_json::Value>("/Customers").await.unwrap_err();
        assert!(err.is_auth_failure());
        assert_eq!(f.transport.urls().len(), 2);
        assert_eq!(store.token(false), None);
        assert!(f.ephemeral.is_empty());
        assert_eq!(f.navigator.paths.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_refresh_from_fallback_tier_stores_in_flagged_tier() {
        let f = fixture(vec![
            (401, ""),
            (200, r#"{"token": "new-token", "refreshToken": "new-refresh"}"#),
            (200, "{}"),
        ]);
        let store = f.client.store();
        // Stale flag: remembered, but the tokens only live in the ephemeral tier
        store.set_remember_me(true).unwrap();
        store.set_token("old-token", false).unwrap();
        store.set_refresh_token("old-refresh", false).unwrap();

        let _: serde_json::Value = f.client.get("/Products").await.unwrap();

        assert_eq!(
            f.transport.request(1).body.as_deref(),
            Some(r#"{"refreshToken":"old-refresh"}"#)
        );
        assert_eq!(store.token(true).as_deref(), Some("new-token"));
        assert_eq!(store.refresh_token(true).as_deref(), Some("new-refresh"));
        assert_eq!(store.token(false).as_deref(), Some("old-token"));
        assert_eq!(header(&f.transport.request(2), "authorization"), Some("Bearer new-token"));
    }

    #[tokio::test]
    async fn test_transport_error_propagates_without_refresh() {
        let f = fixture_with_results(vec![fail("connection reset")]);
        let store = f.client.store();
        store.set_token("abc", false).unwrap();
        store.set_refresh_token("r", false).unwrap();

        let err = f.client.get::<serde_json::Value>("/Customers").await.unwrap_err();
        assert!(matches!(&err, ApiError::InvalidResponse(reason) if reason == "connection reset"));
        assert_eq!(f.transport.urls().len(), 1);
        assert_eq!(store.token(false).as_deref(), Some("abc"));
        assert!(f.navigator.paths.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_missing_refresh_token_skips_refresh_call() {
        let f = fixture(vec![(401, "")]);
        f.client.store().set_token("old-token", false).unwrap();

        let err = f.client.get::<serde_json::Value>("/Roles").await.unwrap_err();
        assert!(err.is_auth_failure());
        assert_eq!(f.transport.urls(), vec![format!("{}/Roles", BASE)]);
        assert!(f.ephemeral.is_empty());
        assert_eq!(f.navigator.paths.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_second_401_after_refresh_is_terminal() {
        let f = fixture(vec![
            (401, ""),
            (200, r#"{"token": "t2", "refreshToken": "r2"}"#),
            (401, ""),
        ]);
        let store = f.client.store();
        store.set_token("t1", false).unwrap();
        store.set_refresh_token("r1", false).unwrap();

        let err = f.client.get::<serde_json::Value>("/PurchaseOrders").await.unwrap_err();
        assert!(err.is_auth_failure());
        assert_eq!(f.transport.urls().len(), 3);
        assert!(f.ephemeral.is_empty());
        assert_eq!(f.navigator.paths.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_401_on_unauthenticated_call_is_plain_error() {
        let f = fixture(vec![(401, r#"{"message": "Invalid credentials"}"#)]);
        f.client.store().set_token("keep", true).unwrap();
        let request = LoginRequest {
            email: "ana@example.com".to_string(),
            password: "wrong".to_string(),
            remember_me: false,
        };

        let err = f.client.login(&request).await.unwrap_err();
        assert_eq!(err.to_string(), "Invalid credentials");
        assert_eq!(err.status(), Some(401));
        assert_eq!(f.transport.urls().len(), 1);
        assert_eq!(f.client.store().token(true).as_deref(), Some("keep"));
        assert!(f.navigator.paths.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_error_message_from_body_without_refresh() {
        let f = fixture(vec![(400, r#"{"message": "Invalid data"}"#)]);
        f.client.store().set_token("abc", false).unwrap();
        f.client.store().set_refresh_token("r", false).unwrap();

        let err = f
            .client
            .post::<serde_json::Value, _>("/Customers", &serde_json::json!({"companyName": ""}))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Invalid data");
        assert_eq!(f.transport.urls().len(), 1);
        assert_eq!(f.client.store().token(false).as_deref(), Some("abc"));
    }

    #[tokio::test]
    async fn test_empty_success_body_decodes_as_null() {
        let f = fixture(vec![(204, "")]);
        f.client.delete::<()>("/Products/3").await.unwrap();
        assert_eq!(f.transport.request(0).method, Method::DELETE);
    }

    #[tokio::test]
    async fn test_invalid_success_body() {
        let f = fixture(vec![(200, "not json")]);
        let err = f.client.get::<serde_json::Value>("/Products").await.unwrap_err();
        assert!(matches!(err, ApiError::InvalidResponse(_)));
    }

    /// Transport that yields before answering so concurrent calls
    /// interleave. Requests carrying the fresh token succeed.
    #[derive(Default)]
    struct ExpiringTransport {
        refresh_calls: Mutex<usize>,
    }

    #[async_trait]
    impl Transport for ExpiringTransport {
        async fn send(&self, request: HttpRequest) -> Result<HttpResponse, ApiError> {
            tokio::task::yield_now().await;
            if request.url.ends_with(REFRESH_TOKEN_ENDPOINT) {
                *self.refresh_calls.lock().unwrap() += 1;
                tokio::task::yield_now().await;
                return Ok(HttpResponse::new(
                    StatusCode::OK,
                    r#"{"token": "fresh", "refreshToken": "r2"}"#,
                ));
            }
            match header(&request, "authorization") {
                Some("Bearer fresh") => Ok(HttpResponse::new(StatusCode::OK, r#"{"ok": true}"#)),
                _ => Ok(HttpResponse::new(StatusCode::UNAUTHORIZED, "")),
            }
        }
    }

    #[tokio::test]
    async fn test_concurrent_401s_share_one_refresh() {
        let durable: Arc<dyn StorageTier> = Arc::new(MemoryStorage::new());
        let ephemeral: Arc<dyn StorageTier> = Arc::new(MemoryStorage::new());
        let store = Arc::new(CredentialStore::new(durable, ephemeral));
        store.set_token("stale", false).unwrap();
        store.set_refresh_token("r1", false).unwrap();

        let transport = Arc::new(ExpiringTransport::default());
        let navigator = Arc::new(RecordingNavigator::default());
        let client = ApiClient::with_transport(BASE, transport.clone(), store.clone(), navigator.clone());

        let (a, b, c) = tokio::join!(
            client.get::<serde_json::Value>("/Customers"),
            client.get::<serde_json::Value>("/Suppliers"),
            client.get::<serde_json::Value>("/Products"),
        );
        assert!(a.is_ok() && b.is_ok() && c.is_ok());
        assert_eq!(*transport.refresh_calls.lock().unwrap(), 1);
        assert_eq!(store.token(false).as_deref(), Some("fresh"));
        assert!(navigator.paths.lock().unwrap().is_empty());
    }

    /// Transport whose refresh endpoint never answers.
    struct StalledRefreshTransport;

    #[async_trait]
    impl Transport for StalledRefreshTransport {
        async fn send(&self, request: HttpRequest) -> Result<HttpResponse, ApiError> {
            if request.url.ends_with(REFRESH_TOKEN_ENDPOINT) {
                futures::future::pending::<()>().await;
            }
            Ok(HttpResponse::new(StatusCode::UNAUTHORIZED, ""))
        }
    }

    #[test]
    fn test_abandoned_refresh_is_released_with_client() {
        let (store, _, _) = memory_store();
        store.set_token("stale", false).unwrap();
        store.set_refresh_token("r1", false).unwrap();
        let client = ApiClient::with_transport(
            BASE,
            Arc::new(StalledRefreshTransport),
            Arc::new(store),
            Arc::new(RecordingNavigator::default()),
        );

        // Start a refresh, then abandon the call while it is parked
        let call = client.get::<serde_json::Value>("/Customers");
        assert!(call.now_or_never().is_none());
        assert!(lock(&client.inner.refresh).is_some());

        let backend = Arc::downgrade(&client.inner.backend);
        let slot = Arc::downgrade(&client.inner.refresh);
        drop(client);

        assert!(slot.upgrade().is_none());
        assert!(backend.upgrade().is_none());
    }
}
