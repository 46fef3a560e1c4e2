//! REST API client module for the store backend.
//!
//! This module provides the `ApiClient` together with the pieces it is
//! composed from:
//!
//! - `RequestStage` / `ResponseStage`: the pre-send and post-receive
//!   middleware (credentials, proactive refresh, timeouts, 401 recovery)
//! - `TimeoutPolicy`: per-endpoint timeout classification
//! - `Transport`: the seam to the network (`ReqwestTransport` in production)
//! - `ApiBaseUrl`: the process-wide base URL cell
//!
//! The backend uses JWT bearer authentication obtained from `/auth/login/`.

pub mod base_url;
pub mod client;
pub mod error;
pub mod middleware;
pub mod request;
pub mod timeout;
pub mod transport;

pub use base_url::ApiBaseUrl;
pub use client::{ApiClient, ConnectionTestResult};
pub use error::{ApiError, TransportError};
pub use middleware::{RequestStage, ResponseStage};
pub use request::{ApiRequest, ApiResponse, RequestOptions};
pub use timeout::{EndpointClass, TimeoutPolicy, TimeoutSettings};
pub use transport::{ReqwestTransport, Transport};
