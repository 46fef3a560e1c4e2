//! Pre-send and post-receive middleware.
//!
//! `RequestStage` prepares every outbound request: it captures the current
//! base URL, attaches the bearer token (refreshing it first when it is about
//! to expire) and picks a timeout unless the caller pinned one.
//!
//! `ResponseStage` turns transport failures into structured errors and
//! recovers a 401 with one refresh-and-retry. If no token can be obtained
//! the session is torn down and the navigator is asked to show the login
//! screen with the expired flag. Concurrent requests from the same session
//! tear it down once.

use std::sync::Arc;

use tracing::{debug, info, warn};

use super::{ApiBaseUrl, ApiError, ApiRequest, ApiResponse, TimeoutPolicy, Transport, TransportError};
use crate::auth::{CredentialStore, LoginRedirect, NavigatorSlot, RefreshCoordinator};

/// Tokens expiring within this many minutes are refreshed before use.
pub const PROACTIVE_REFRESH_BUFFER_MINUTES: i64 = 5;

pub struct RequestStage {
    store: Arc<dyn CredentialStore>,
    refresher: Arc<RefreshCoordinator>,
    base_url: Arc<ApiBaseUrl>,
    timeouts: TimeoutPolicy,
    refresh_buffer_minutes: i64,
}

impl RequestStage {
    pub fn new(
        store: Arc<dyn CredentialStore>,
        refresher: Arc<RefreshCoordinator>,
        base_url: Arc<ApiBaseUrl>,
        timeouts: TimeoutPolicy,
    ) -> Self {
        Self {
            store,
            refresher,
            base_url,
            timeouts,
            refresh_buffer_minutes: PROACTIVE_REFRESH_BUFFER_MINUTES,
        }
    }

    pub fn with_refresh_buffer(mut self, minutes: i64) -> Self {
        self.refresh_buffer_minutes = minutes;
        self
    }

    pub async fn prepare(&self, request: &mut ApiRequest) -> Result<(), ApiError> {
        request.base_url = self.base_url.get();
        request.session_epoch = self.refresher.session_epoch();

        if !request.is_auth_endpoint() {
            if let Some(mut token) = self.store.get_access_token().await? {
                if self
                    .store
                    .is_token_expiring_soon(self.refresh_buffer_minutes)
                    .await?
                {
                    info!(request = %request.describe(), "Token expiring soon, refreshing proactively");
                    // On failure keep the old token and let the request fail on its own
                    if let Some(fresh) = self.refresher.refresh().await {
                        token = fresh;
                    }
                }
                request.bearer = Some(token);
            }
        }

        if request.timeout.is_none() {
            request.timeout = Some(
                self.timeouts
                    .classify(&request.path, request.method.as_str()),
            );
        }

        Ok(())
    }
}

pub struct ResponseStage {
    transport: Arc<dyn Transport>,
    store: Arc<dyn CredentialStore>,
    refresher: Arc<RefreshCoordinator>,
    navigator: Arc<NavigatorSlot>,
}

impl ResponseStage {
    pub fn new(
        transport: Arc<dyn Transport>,
        store: Arc<dyn CredentialStore>,
        refresher: Arc<RefreshCoordinator>,
        navigator: Arc<NavigatorSlot>,
    ) -> Self {
        Self {
            transport,
            store,
            refresher,
            navigator,
        }
    }

    /// Classify the outcome of `request`, re-issuing it at most once after a
    /// successful refresh.
    pub async fn complete(
        &self,
        mut request: ApiRequest,
        outcome: Result<ApiResponse, TransportError>,
    ) -> Result<ApiResponse, ApiError> {
        let mut outcome = outcome;

        loop {
            let response = match outcome {
                Ok(response) => response,
                Err(err) => {
                    debug!(request = %request.describe(), error = %err, "Request failed before a response");
                    return Err(ApiError::from_transport(
                        request.method.as_str(),
                        &request.path,
                        err,
                    ));
                }
            };

            if response.is_success() {
                return Ok(response);
            }

            match response.status {
                401 if !request.retried && !request.is_auth_endpoint() => {
                    request.retried = true;
                    debug!(request = %request.describe(), "Got 401, refreshing token before retry");

                    if let Some(token) = self.refresher.refresh().await {
                        request.bearer = Some(token);
                        outcome = self.transport.send(&request).await;
                        continue;
                    }

                    if self.refresher.end_session(request.session_epoch).await {
                        self.tear_down(&request).await;
                    } else {
                        debug!(request = %request.describe(), "Session already torn down");
                    }
                    return Err(ApiError::from_status(401, &response.body));
                }
                403 => {
                    warn!(request = %request.describe(), "403 Forbidden");
                    return Err(ApiError::from_status(403, &response.body));
                }
                status => return Err(ApiError::from_status(status, &response.body)),
            }
        }
    }

    async fn tear_down(&self, request: &ApiRequest) {
        warn!(request = %request.describe(), "Session could not be refreshed, signing out");
        if let Err(e) = self.store.clear_all().await {
            warn!(error = %e, "Failed to clear credentials");
        }
        self.navigator.to_login(LoginRedirect::expired(request.path.clone()));
    }
}
