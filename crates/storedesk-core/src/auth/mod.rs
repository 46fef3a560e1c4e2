//! Authentication module for managing sessions and credentials.
//!
//! This module provides:
//! - `CredentialStore`: async storage for the token pair and cached profile
//!   (`KeyringCredentialStore` for the OS keychain, `MemoryCredentialStore`
//!   for in-process use)
//! - `RefreshCoordinator`: single-flight access token refresh
//! - `SessionManager`: startup bootstrap, login, logout and profile handling
//! - `Navigator`: the front-end hook for the session-expired redirect
//!
//! Access tokens are JWTs; expiry is read from their `exp` claim.

pub mod credentials;
pub mod jwt;
pub mod navigation;
pub mod refresh;
pub mod session;

pub use credentials::{
    CredentialError, CredentialStore, KeyringCredentialStore, MemoryCredentialStore,
};
pub use navigation::{LoginRedirect, Navigator, NavigatorSlot};
pub use refresh::RefreshCoordinator;
pub use session::{SessionManager, SessionState};
