//! Data models exchanged with the store backend.
//!
//! - `User`: the authenticated account as returned by the profile endpoint
//! - Auth payloads: `LoginCredentials`, `LoginResponse`, `TokenPair`, etc.
//! - `Paginated<T>`: the list envelope used by collection endpoints

pub mod page;
pub mod user;

pub use page::Paginated;
pub use user::{
    AdminVerifyResponse, ChangePasswordPayload, ChangePasswordResponse, LoginCredentials,
    LoginResponse, ProfileUpdate, RefreshResponse, TokenPair, User,
};
