use std::sync::{Arc, PoisonError, RwLock};

use tracing::warn;

/// Where to send the user when their session can no longer be recovered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginRedirect {
    /// The session ended because credentials expired, not by logout.
    pub expired: bool,
    /// Destination to return to after logging in again.
    pub return_to: Option<String>,
}

impl LoginRedirect {
    pub fn expired(return_to: impl Into<String>) -> Self {
        Self {
            expired: true,
            return_to: Some(return_to.into()),
        }
    }
}

/// Front-end capability that can show the login entry point.
pub trait Navigator: Send + Sync {
    fn to_login(&self, redirect: LoginRedirect);
}

/// Late-bound navigator handle. The HTTP layer is built before the front-end
/// exists, so the navigator is injected afterwards.
#[derive(Default)]
pub struct NavigatorSlot {
    inner: RwLock<Option<Arc<dyn Navigator>>>,
}

impl NavigatorSlot {
    pub fn set(&self, navigator: Arc<dyn Navigator>) {
        *self.inner.write().unwrap_or_else(PoisonError::into_inner) = Some(navigator);
    }

    pub fn to_login(&self, redirect: LoginRedirect) {
        let navigator = self
            .inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        match navigator {
            Some(navigator) => navigator.to_login(redirect),
            None => warn!(?redirect, "No navigator bound, dropping login redirect"),
        }
    }
}
