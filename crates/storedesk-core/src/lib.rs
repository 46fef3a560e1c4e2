//! Core library for the storedesk store administration client.
//!
//! The interesting part of this crate is the API session layer in [`api`]:
//! a request stage that attaches bearer credentials (refreshing them
//! proactively when they are about to expire) and picks a per-endpoint
//! timeout, and a response stage that normalises failures and recovers a
//! 401 with a single refresh-and-retry. Refreshes are coordinated by
//! [`auth::RefreshCoordinator`] so any number of concurrent requests share
//! one network call.
//!
//! [`auth::SessionManager`] builds startup, login and logout on top of it.

pub mod api;
pub mod auth;
pub mod config;
pub mod models;

#[cfg(test)]
pub(crate) mod test_support;

pub use api::{ApiClient, ApiError};
pub use auth::{CredentialStore, SessionManager};
pub use config::Config;
