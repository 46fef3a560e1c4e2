use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use anyhow::Context;
use tokio::sync::OnceCell;
use tracing::{debug, error, info, warn};

use super::CredentialStore;
use crate::api::{ApiClient, ApiError, RequestOptions};
use crate::config::SettingsStore;
use crate::models::{
    AdminVerifyResponse, ChangePasswordPayload, ChangePasswordResponse, LoginCredentials,
    LoginResponse, ProfileUpdate, User,
};

/// A stored token this close to expiry at startup is treated as invalid.
const STARTUP_EXPIRY_BUFFER_MINUTES: i64 = 5;

/// Buffer used by the quick `check_auth` check.
const CHECK_AUTH_BUFFER_MINUTES: i64 = 2;

/// The admin check should fail fast.
const VERIFY_ADMIN_TIMEOUT_SECS: u64 = 5;

const LOGIN_PATH: &str = "/auth/login/";
const PROFILE_PATH: &str = "/auth/profile/";
const CHANGE_PASSWORD_PATH: &str = "/auth/change-password/";
const VERIFY_ADMIN_PATH: &str = "/auth/verify-admin/";

/// In-memory view of the signed-in user. Tokens are never kept here.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionState {
    pub user: Option<User>,
    pub is_admin: bool,
}

/// Session state tagged with the login session it belongs to.
#[derive(Debug, Default)]
struct TrackedState {
    state: SessionState,
    epoch: u64,
}

/// Startup, login, logout and profile handling on top of `ApiClient`.
///
/// The signed-in view lapses on its own once the response pipeline tears the
/// session down, so it never outlives the stored credentials.
pub struct SessionManager {
    api: ApiClient,
    settings: Arc<dyn SettingsStore>,
    state: RwLock<TrackedState>,
    initialized: OnceCell<()>,
}

impl SessionManager {
    pub fn new(api: ApiClient, settings: Arc<dyn SettingsStore>) -> Self {
        Self {
            api,
            settings,
            state: RwLock::new(TrackedState::default()),
            initialized: OnceCell::new(),
        }
    }

    pub fn api(&self) -> &ApiClient {
        &self.api
    }

    fn store(&self) -> &Arc<dyn CredentialStore> {
        self.api.credentials()
    }

    pub fn state(&self) -> SessionState {
        let tracked = self.state.read().unwrap_or_else(PoisonError::into_inner);
        if self.api.refresher().is_session_ended(tracked.epoch) {
            return SessionState::default();
        }
        tracked.state.clone()
    }

    fn set_state(&self, user: Option<User>, is_admin: bool) {
        *self.state.write().unwrap_or_else(PoisonError::into_inner) = TrackedState {
            state: SessionState { user, is_admin },
            epoch: self.api.refresher().session_epoch(),
        };
    }

    pub fn is_authenticated(&self) -> bool {
        self.state().user.is_some()
    }

    pub fn current_user(&self) -> Option<User> {
        self.state().user
    }

    pub fn is_admin(&self) -> bool {
        self.state().is_admin
    }

    pub fn display_name(&self) -> String {
        self.state()
            .user
            .map(|u| u.display_name())
            .unwrap_or_default()
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.initialized()
    }

    /// Bootstrap on startup. Runs once; concurrent and later calls wait for
    /// (or skip) the first run.
    pub async fn initialize(&self) {
        self.initialized
            .get_or_init(|| async {
                if let Err(e) = self.bootstrap().await {
                    error!(error = %e, "Session initialization failed");
                }
            })
            .await;
    }

    async fn bootstrap(&self) -> Result<(), ApiError> {
        match self.settings.resolve_api_url().await {
            Ok(url) => {
                let url = self.api.base_url().set(&url);
                debug!(api_url = %url, "API base URL resolved");
            }
            Err(e) => warn!(error = %e, "Could not read API URL setting, using default"),
        }

        if self.store().get_access_token().await?.is_none() {
            debug!("No stored token, starting signed out");
            return Ok(());
        }

        if self
            .store()
            .is_token_expiring_soon(STARTUP_EXPIRY_BUFFER_MINUTES)
            .await?
        {
            info!("Stored token expired or expiring, clearing session");
            self.store().clear_all().await?;
            return Ok(());
        }

        if let Some(user) = self.store().get_user_data().await? {
            debug!(username = %user.username, "Restored cached profile");
            let is_admin = self.store().get_is_admin().await?;
            self.set_state(Some(user), is_admin);
            return Ok(());
        }

        match self.api.get::<User>(PROFILE_PATH).await {
            Ok(profile) => {
                self.store().save_user_data(&profile).await?;
                let is_admin = profile.is_admin();
                self.set_state(Some(profile), is_admin);
            }
            Err(e) => {
                warn!(error = %e, "Profile fetch failed at startup, clearing session");
                self.store().clear_all().await?;
            }
        }
        Ok(())
    }

    /// Authenticate and persist tokens and profile. Errors are returned
    /// unchanged so the caller can show the backend's message.
    pub async fn login(&self, username: &str, password: &str) -> Result<User, ApiError> {
        let credentials = LoginCredentials {
            username: username.to_string(),
            password: password.to_string(),
        };
        let response: LoginResponse = self.api.post(LOGIN_PATH, &credentials).await?;

        self.api.refresher().begin_session().await;
        self.store()
            .save_tokens(&response.access, &response.refresh)
            .await?;
        self.store().save_user_data(&response.user).await?;
        if let Err(e) = self.settings.save_last_username(username).await {
            warn!(error = %e, "Failed to remember last username");
        }

        info!(username = %response.user.username, "Logged in");
        self.set_state(
            Some(response.user.clone()),
            response.is_staff || response.is_admin,
        );
        Ok(response.user)
    }

    /// Clear stored credentials and in-memory state. Never fails. A refresh
    /// still in flight is discarded when it settles.
    pub async fn logout(&self) {
        self.api.refresher().end_current_session().await;
        if let Err(e) = self.store().clear_all().await {
            warn!(error = %e, "Failed to clear stored credentials on logout");
        }
        self.set_state(None, false);
        info!("Logged out");
    }

    /// Re-fetch the profile. Failures are logged and leave the session as is.
    pub async fn refresh_profile(&self) {
        match self.api.get::<User>(PROFILE_PATH).await {
            Ok(profile) => {
                if let Err(e) = self.store().save_user_data(&profile).await {
                    warn!(error = %e, "Failed to cache refreshed profile");
                }
                let is_admin = profile.is_admin();
                self.set_state(Some(profile), is_admin);
            }
            Err(e) => error!(error = %e, "Failed to refresh profile"),
        }
    }

    /// Quick check for a stored token that is not about to expire.
    pub async fn check_auth(&self) -> bool {
        match self.store().get_access_token().await {
            Ok(Some(_)) => {}
            _ => return false,
        }
        matches!(
            self.store()
                .is_token_expiring_soon(CHECK_AUTH_BUFFER_MINUTES)
                .await,
            Ok(false)
        )
    }

    pub async fn update_profile(&self, update: &ProfileUpdate) -> Result<User, ApiError> {
        let profile: User = self.api.put(PROFILE_PATH, update).await?;
        self.store().save_user_data(&profile).await?;
        let is_admin = profile.is_admin();
        self.set_state(Some(profile.clone()), is_admin);
        Ok(profile)
    }

    /// Change the password, persisting a rotated access token if the backend
    /// returns one.
    pub async fn change_password(
        &self,
        old_password: &str,
        new_password: &str,
    ) -> Result<ChangePasswordResponse, ApiError> {
        let payload = ChangePasswordPayload {
            old_password: old_password.to_string(),
            new_password: new_password.to_string(),
        };
        let response: ChangePasswordResponse =
            self.api.post(CHANGE_PASSWORD_PATH, &payload).await?;

        if let Some(ref access) = response.access {
            if let Some(refresh) = self.store().get_refresh_token().await? {
                self.store().save_tokens(access, &refresh).await?;
            }
        }
        Ok(response)
    }

    /// True only if the server confirms admin rights.
    pub async fn verify_admin(&self) -> bool {
        let options =
            RequestOptions::default().timeout(Duration::from_secs(VERIFY_ADMIN_TIMEOUT_SECS));
        match self
            .api
            .get_with::<AdminVerifyResponse>(VERIFY_ADMIN_PATH, options)
            .await
        {
            Ok(response) => response.is_admin,
            Err(e) => {
                debug!(error = %e, "Admin verification failed");
                false
            }
        }
    }

    /// Point the client at a new API and remember it. Applies to every
    /// request started afterwards.
    pub async fn update_base_url(&self, url: &str) -> anyhow::Result<String> {
        let clean = self.api.base_url().set(url);
        self.settings
            .save_api_url(&clean)
            .await
            .context("Failed to persist API URL")?;
        info!(api_url = %clean, "API base URL updated");
        Ok(clean)
    }

    pub async fn last_username(&self) -> Option<String> {
        self.settings.last_username().await.ok().flatten()
    }
}
