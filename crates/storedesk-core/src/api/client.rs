//! API client for the store backend.
//!
//! `ApiClient` composes the transport with the request and response stages
//! and exposes typed `get`/`post`/`put`/`patch`/`delete` helpers. Every call
//! goes through the same pipeline:
//! caller -> `RequestStage` -> transport -> `ResponseStage` -> caller.

use std::sync::Arc;
use std::time::{Duration, Instant};

use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use super::{
    ApiBaseUrl, ApiError, ApiRequest, ApiResponse, RequestOptions, RequestStage, ResponseStage,
    TimeoutPolicy, Transport, TransportError,
};
use crate::auth::{CredentialStore, Navigator, NavigatorSlot, RefreshCoordinator};

/// Timeout for the connectivity test.
const CONNECTION_TEST_TIMEOUT_SECS: u64 = 5;

/// Result of an API connectivity test.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectionTestResult {
    pub connected: bool,
    pub latency_ms: Option<u64>,
    /// HTTP status, or 0 if nothing answered
    pub status: u16,
    pub message: String,
}

/// Clone is cheap - all state is behind `Arc`s and clones share the same
/// refresh coordinator, base URL and credential store.
#[derive(Clone)]
pub struct ApiClient {
    transport: Arc<dyn Transport>,
    store: Arc<dyn CredentialStore>,
    base_url: Arc<ApiBaseUrl>,
    refresher: Arc<RefreshCoordinator>,
    navigator: Arc<NavigatorSlot>,
    request_stage: Arc<RequestStage>,
    response_stage: Arc<ResponseStage>,
}

impl ApiClient {
    pub fn new(
        transport: Arc<dyn Transport>,
        store: Arc<dyn CredentialStore>,
        base_url: Arc<ApiBaseUrl>,
        timeouts: TimeoutPolicy,
    ) -> Self {
        let refresher = Arc::new(RefreshCoordinator::new(
            transport.clone(),
            store.clone(),
            base_url.clone(),
            timeouts.clone(),
        ));
        let navigator = Arc::new(NavigatorSlot::default());

        let request_stage = Arc::new(RequestStage::new(
            store.clone(),
            refresher.clone(),
            base_url.clone(),
            timeouts,
        ));
        let response_stage = Arc::new(ResponseStage::new(
            transport.clone(),
            store.clone(),
            refresher.clone(),
            navigator.clone(),
        ));

        Self {
            transport,
            store,
            base_url,
            refresher,
            navigator,
            request_stage,
            response_stage,
        }
    }

    /// Bind the front-end navigator used for the session-expired redirect.
    pub fn set_navigator(&self, navigator: Arc<dyn Navigator>) {
        self.navigator.set(navigator);
    }

    pub fn base_url(&self) -> &Arc<ApiBaseUrl> {
        &self.base_url
    }

    pub fn credentials(&self) -> &Arc<dyn CredentialStore> {
        &self.store
    }

    pub fn refresher(&self) -> &Arc<RefreshCoordinator> {
        &self.refresher
    }

    /// Run a request through both stages and return the raw response.
    pub async fn execute(&self, mut request: ApiRequest) -> Result<ApiResponse, ApiError> {
        self.request_stage.prepare(&mut request).await?;
        let outcome = self.transport.send(&request).await;
        self.response_stage.complete(request, outcome).await
    }

    /// Send a request and decode the JSON response.
    pub async fn send<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
        options: RequestOptions,
    ) -> Result<T, ApiError> {
        let mut request = ApiRequest::new(method, path).with_options(options);
        request.body = body;
        self.execute(request).await?.json()
    }

    fn encode<B: Serialize>(body: &B) -> Result<Value, ApiError> {
        serde_json::to_value(body).map_err(|e| ApiError::InvalidRequest(e.to_string()))
    }

    // ===== Verbs =====

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        self.get_with(path, RequestOptions::default()).await
    }

    pub async fn get_with<T: DeserializeOwned>(
        &self,
        path: &str,
        options: RequestOptions,
    ) -> Result<T, ApiError> {
        self.send(Method::GET, path, None, options).await
    }

    pub async fn post<T: DeserializeOwned, B: Serialize>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        self.post_with(path, body, RequestOptions::default()).await
    }

    pub async fn post_with<T: DeserializeOwned, B: Serialize>(
        &self,
        path: &str,
        body: &B,
        options: RequestOptions,
    ) -> Result<T, ApiError> {
        let body = Self::encode(body)?;
        self.send(Method::POST, path, Some(body), options).await
    }

    pub async fn put<T: DeserializeOwned, B: Serialize>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        self.put_with(path, body, RequestOptions::default()).await
    }

    pub async fn put_with<T: DeserializeOwned, B: Serialize>(
        &self,
        path: &str,
        body: &B,
        options: RequestOptions,
    ) -> Result<T, ApiError> {
        let body = Self::encode(body)?;
        self.send(Method::PUT, path, Some(body), options).await
    }

    pub async fn patch<T: DeserializeOwned, B: Serialize>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        self.patch_with(path, body, RequestOptions::default()).await
    }

    pub async fn patch_with<T: DeserializeOwned, B: Serialize>(
        &self,
        path: &str,
        body: &B,
        options: RequestOptions,
    ) -> Result<T, ApiError> {
        let body = Self::encode(body)?;
        self.send(Method::PATCH, path, Some(body), options).await
    }

    pub async fn delete<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        self.delete_with(path, RequestOptions::default()).await
    }

    pub async fn delete_with<T: DeserializeOwned>(
        &self,
        path: &str,
        options: RequestOptions,
    ) -> Result<T, ApiError> {
        self.send(Method::DELETE, path, None, options).await
    }

    // ===== Connectivity =====

    /// Ping `<url>/` without credentials and measure latency. Uses the
    /// configured base URL unless `url_override` is given.
    pub async fn check_connection(&self, url_override: Option<&str>) -> ConnectionTestResult {
        let mut request = ApiRequest::new(Method::GET, "/");
        request.base_url = url_override
            .map(super::base_url::normalize)
            .unwrap_or_else(|| self.base_url.get());
        request.timeout = Some(Duration::from_secs(CONNECTION_TEST_TIMEOUT_SECS));

        let start = Instant::now();
        match self.transport.send(&request).await {
            Ok(response) => {
                let latency = start.elapsed().as_millis() as u64;
                ConnectionTestResult {
                    connected: true,
                    latency_ms: Some(latency),
                    status: response.status,
                    message: format!("API connected ({}ms)", latency),
                }
            }
            Err(TransportError::Timeout(_)) => ConnectionTestResult {
                connected: false,
                latency_ms: None,
                status: 0,
                message: format!("Timeout (>{}s)", CONNECTION_TEST_TIMEOUT_SECS),
            },
            Err(TransportError::Network(e)) => ConnectionTestResult {
                connected: false,
                latency_ms: None,
                status: 0,
                message: format!("Network error - check the URL ({})", e),
            },
        }
    }
}
