//! Shared fixtures for unit tests.

use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::Utc;
use serde_json::json;

use crate::api::{ApiRequest, ApiResponse, Transport, TransportError};
use crate::auth::{LoginRedirect, Navigator};
use crate::config::SettingsStore;
use crate::models::User;

type Handler = dyn Fn(&ApiRequest) -> Result<ApiResponse, TransportError> + Send + Sync;

/// Transport that answers from a closure and records every request.
pub struct ScriptedTransport {
    handler: Box<Handler>,
    delay: Option<Duration>,
    requests: Mutex<Vec<ApiRequest>>,
}

impl ScriptedTransport {
    pub fn new(
        handler: impl Fn(&ApiRequest) -> Result<ApiResponse, TransportError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            handler: Box::new(handler),
            delay: None,
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Sleep before answering so concurrent callers overlap.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn requests(&self) -> Vec<ApiRequest> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Number of requests whose path contains `fragment`.
    pub fn count(&self, fragment: &str) -> usize {
        self.requests()
            .iter()
            .filter(|r| r.path.contains(fragment))
            .count()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(&self, request: &ApiRequest) -> Result<ApiResponse, TransportError> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(request.clone());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        (self.handler)(request)
    }
}

#[derive(Default)]
pub struct RecordingNavigator {
    redirects: Mutex<Vec<LoginRedirect>>,
}

impl RecordingNavigator {
    pub fn redirects(&self) -> Vec<LoginRedirect> {
        self.redirects
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Navigator for RecordingNavigator {
    fn to_login(&self, redirect: LoginRedirect) {
        self.redirects
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(redirect);
    }
}

/// In-memory settings that count URL resolutions.
pub struct CountingSettings {
    api_url: String,
    resolve_calls: Mutex<usize>,
    saved_api_url: Mutex<Option<String>>,
    last_username: Mutex<Option<String>>,
}

impl CountingSettings {
    pub fn new(api_url: &str) -> Self {
        Self {
            api_url: api_url.to_string(),
            resolve_calls: Mutex::new(0),
            saved_api_url: Mutex::new(None),
            last_username: Mutex::new(None),
        }
    }

    pub fn resolve_calls(&self) -> usize {
        *self.resolve_calls.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn saved_api_url(&self) -> Option<String> {
        self.saved_api_url
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl SettingsStore for CountingSettings {
    async fn resolve_api_url(&self) -> Result<String> {
        *self.resolve_calls.lock().unwrap_or_else(PoisonError::into_inner) += 1;
        Ok(self.api_url.clone())
    }

    async fn save_api_url(&self, url: &str) -> Result<()> {
        *self.saved_api_url.lock().unwrap_or_else(PoisonError::into_inner) = Some(url.to_string());
        Ok(())
    }

    async fn last_username(&self) -> Result<Option<String>> {
        Ok(self
            .last_username
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone())
    }

    async fn save_last_username(&self, username: &str) -> Result<()> {
        *self.last_username.lock().unwrap_or_else(PoisonError::into_inner) =
            Some(username.to_string());
        Ok(())
    }
}

/// Unsigned JWT whose `exp` is `lifetime` from now.
pub fn jwt_expiring_in(lifetime: chrono::Duration) -> String {
    let exp = (Utc::now() + lifetime).timestamp();
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
    let payload = URL_SAFE_NO_PAD.encode(json!({ "exp": exp, "user_id": 3 }).to_string());
    format!("{header}.{payload}.signature")
}

pub fn sample_user() -> User {
    User {
        id: 3,
        username: "maria".to_string(),
        email: "maria@example.com".to_string(),
        first_name: "Maria".to_string(),
        last_name: "Lopez".to_string(),
        is_staff: true,
        is_superuser: false,
    }
}
