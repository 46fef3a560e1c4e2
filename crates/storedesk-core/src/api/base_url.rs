use std::sync::{PoisonError, RwLock};

use crate::config::DEFAULT_API_URL;

/// Process-wide API base URL.
///
/// Starts at the compiled default, is set once at startup from the settings
/// store and afterwards only through an explicit settings update. Readers
/// copy the value at attach time, so a change affects every request that
/// starts after it and none that started before.
#[derive(Debug)]
pub struct ApiBaseUrl {
    value: RwLock<String>,
}

impl Default for ApiBaseUrl {
    fn default() -> Self {
        Self::new(DEFAULT_API_URL)
    }
}

impl ApiBaseUrl {
    pub fn new(url: &str) -> Self {
        Self {
            value: RwLock::new(normalize(url)),
        }
    }

    pub fn get(&self) -> String {
        self.value
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Replace the URL, returning the normalised value that was stored.
    pub fn set(&self, url: &str) -> String {
        let clean = normalize(url);
        *self.value.write().unwrap_or_else(PoisonError::into_inner) = clean.clone();
        clean
    }
}

/// Trim whitespace and trailing slashes.
pub fn normalize(url: &str) -> String {
    url.trim().trim_end_matches('/').to_string()
}
