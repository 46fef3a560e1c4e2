use std::path::PathBuf;
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use chrono::Duration;
use keyring::Entry;
use thiserror::Error;
use tracing::{debug, warn};

use super::jwt;
use crate::models::{TokenPair, User};

const SERVICE_NAME: &str = "storedesk";
const ACCESS_TOKEN_KEY: &str = "access_token";
const REFRESH_TOKEN_KEY: &str = "refresh_token";

#[derive(Error, Debug)]
pub enum CredentialError {
    #[error("Keychain error: {0}")]
    Keychain(#[from] keyring::Error),

    #[error("Failed to access user data file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to encode user data: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Async key-value capability holding the token pair and the cached user
/// profile. It is the only shared mutable state of the session layer.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn get_access_token(&self) -> Result<Option<String>, CredentialError>;

    async fn get_refresh_token(&self) -> Result<Option<String>, CredentialError>;

    /// Persist both tokens together.
    async fn save_tokens(&self, access: &str, refresh: &str) -> Result<(), CredentialError>;

    async fn clear_tokens(&self) -> Result<(), CredentialError>;

    async fn save_user_data(&self, user: &User) -> Result<(), CredentialError>;

    async fn get_user_data(&self) -> Result<Option<User>, CredentialError>;

    async fn clear_user_data(&self) -> Result<(), CredentialError>;

    /// True if the stored access token expires within `buffer_minutes`, or if
    /// there is no readable token at all.
    async fn is_token_expiring_soon(&self, buffer_minutes: i64) -> Result<bool, CredentialError> {
        Ok(match self.get_access_token().await? {
            Some(token) => jwt::expires_within(&token, Duration::minutes(buffer_minutes)),
            None => true,
        })
    }

    /// Admin flag derived from the cached profile.
    async fn get_is_admin(&self) -> Result<bool, CredentialError> {
        Ok(self
            .get_user_data()
            .await?
            .map(|u| u.is_admin())
            .unwrap_or(false))
    }

    /// Clear tokens and user data.
    async fn clear_all(&self) -> Result<(), CredentialError> {
        self.clear_tokens().await?;
        self.clear_user_data().await
    }
}

/// In-process store. Nothing survives a restart.
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    tokens: Mutex<Option<TokenPair>>,
    user: Mutex<Option<User>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tokens(access: &str, refresh: &str) -> Self {
        let store = Self::default();
        *store.tokens.lock().unwrap_or_else(PoisonError::into_inner) = Some(TokenPair {
            access: access.to_string(),
            refresh: refresh.to_string(),
        });
        store
    }

    fn tokens(&self) -> Option<TokenPair> {
        self.tokens
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn get_access_token(&self) -> Result<Option<String>, CredentialError> {
        Ok(self.tokens().map(|t| t.access))
    }

    async fn get_refresh_token(&self) -> Result<Option<String>, CredentialError> {
        Ok(self.tokens().map(|t| t.refresh))
    }

    async fn save_tokens(&self, access: &str, refresh: &str) -> Result<(), CredentialError> {
        *self.tokens.lock().unwrap_or_else(PoisonError::into_inner) = Some(TokenPair {
            access: access.to_string(),
            refresh: refresh.to_string(),
        });
        Ok(())
    }

    async fn clear_tokens(&self) -> Result<(), CredentialError> {
        *self.tokens.lock().unwrap_or_else(PoisonError::into_inner) = None;
        Ok(())
    }

    async fn save_user_data(&self, user: &User) -> Result<(), CredentialError> {
        *self.user.lock().unwrap_or_else(PoisonError::into_inner) = Some(user.clone());
        Ok(())
    }

    async fn get_user_data(&self) -> Result<Option<User>, CredentialError> {
        Ok(self.user.lock().unwrap_or_else(PoisonError::into_inner).clone())
    }

    async fn clear_user_data(&self) -> Result<(), CredentialError> {
        *self.user.lock().unwrap_or_else(PoisonError::into_inner) = None;
        Ok(())
    }
}

/// Tokens in the OS keychain, user profile in a JSON file.
pub struct KeyringCredentialStore {
    service: String,
    user_data_path: PathBuf,
}

impl KeyringCredentialStore {
    pub fn new(user_data_path: PathBuf) -> Self {
        Self::with_service(SERVICE_NAME, user_data_path)
    }

    pub fn with_service(service: &str, user_data_path: PathBuf) -> Self {
        Self {
            service: service.to_string(),
            user_data_path,
        }
    }

    fn entry(&self, key: &str) -> Result<Entry, CredentialError> {
        Ok(Entry::new(&self.service, key)?)
    }
}

/// Named secret slots, as the keychain exposes them.
trait SecretSlots {
    fn read(&self, key: &str) -> Result<Option<String>, CredentialError>;

    fn write(&self, key: &str, value: &str) -> Result<(), CredentialError>;

    fn delete(&self, key: &str) -> Result<(), CredentialError>;
}

impl SecretSlots for KeyringCredentialStore {
    fn read(&self, key: &str) -> Result<Option<String>, CredentialError> {
        match self.entry(key)?.get_password() {
            Ok(value) => Ok(Some(value)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn write(&self, key: &str, value: &str) -> Result<(), CredentialError> {
        Ok(self.entry(key)?.set_password(value)?)
    }

    fn delete(&self, key: &str) -> Result<(), CredentialError> {
        match self.entry(key)?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Write both tokens. If the refresh token cannot be written the previous
/// access token is put back, so the pair never mixes sessions.
fn save_token_pair(
    slots: &impl SecretSlots,
    access: &str,
    refresh: &str,
) -> Result<(), CredentialError> {
    let previous = slots.read(ACCESS_TOKEN_KEY)?;
    slots.write(ACCESS_TOKEN_KEY, access)?;

    if let Err(e) = slots.write(REFRESH_TOKEN_KEY, refresh) {
        let restored = match previous {
            Some(old) => slots.write(ACCESS_TOKEN_KEY, &old),
            None => slots.delete(ACCESS_TOKEN_KEY),
        };
        if let Err(restore) = restored {
            warn!(error = %restore, "Failed to roll back access token");
        }
        return Err(e);
    }
    Ok(())
}

#[async_trait]
impl CredentialStore for KeyringCredentialStore {
    async fn get_access_token(&self) -> Result<Option<String>, CredentialError> {
        self.read(ACCESS_TOKEN_KEY)
    }

    async fn get_refresh_token(&self) -> Result<Option<String>, CredentialError> {
        self.read(REFRESH_TOKEN_KEY)
    }

    async fn save_tokens(&self, access: &str, refresh: &str) -> Result<(), CredentialError> {
        save_token_pair(self, access, refresh)
    }

    async fn clear_tokens(&self) -> Result<(), CredentialError> {
        self.delete(ACCESS_TOKEN_KEY)?;
        self.delete(REFRESH_TOKEN_KEY)
    }

    async fn save_user_data(&self, user: &User) -> Result<(), CredentialError> {
        if let Some(parent) = self.user_data_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(user)?;
        std::fs::write(&self.user_data_path, contents)?;
        Ok(())
    }

    async fn get_user_data(&self) -> Result<Option<User>, CredentialError> {
        if !self.user_data_path.exists() {
            return Ok(None);
        }
        let contents = std::fs::read_to_string(&self.user_data_path)?;
        match serde_json::from_str(&contents) {
            Ok(user) => Ok(Some(user)),
            Err(e) => {
                debug!(error = %e, "Ignoring unreadable user data file");
                Ok(None)
            }
        }
    }

    async fn clear_user_data(&self) -> Result<(), CredentialError> {
        if self.user_data_path.exists() {
            std::fs::remove_file(&self.user_data_path)?;
        }
        Ok(())
    }
}
