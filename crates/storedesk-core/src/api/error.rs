use thiserror::Error;

use crate::auth::CredentialError;

/// Failure reported by a [`Transport`](super::Transport) before any HTTP
/// status was received.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("network error: {0}")]
    Network(String),
}

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("The request ({method} {path}) took too long. Please try again.")]
    Timeout {
        method: String,
        path: String,
        #[source]
        source: TransportError,
    },

    #[error("Could not connect to the server. Check your internet connection.")]
    NetworkUnreachable {
        #[source]
        source: TransportError,
    },

    #[error("Unauthorized - session may be expired")]
    Unauthorized(String),

    #[error("Access denied: {0}")]
    Forbidden(String),

    #[error("Request failed with status {status}: {message}")]
    Status { status: u16, message: String },

    #[error("Could not encode request body: {0}")]
    InvalidRequest(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Credential store error: {0}")]
    Credentials(#[from] CredentialError),
}

/// Maximum length for error response bodies in error messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

impl ApiError {
    /// Truncate a response body to avoid logging excessive data
    fn truncate_body(body: &str) -> String {
        if body.len() <= MAX_ERROR_BODY_LENGTH {
            body.to_string()
        } else {
            let mut end = MAX_ERROR_BODY_LENGTH;
            while !body.is_char_boundary(end) {
                end -= 1;
            }
            format!("{}... (truncated, {} total bytes)", &body[..end], body.len())
        }
    }

    /// Map a non-success status to its error kind, keeping the backend's
    /// message as-is (apart from truncation).
    pub fn from_status(status: u16, body: &str) -> Self {
        let truncated = Self::truncate_body(body);
        match status {
            401 => ApiError::Unauthorized(truncated),
            403 => ApiError::Forbidden(truncated),
            _ => ApiError::Status {
                status,
                message: truncated,
            },
        }
    }

    /// Normalise a transport failure for the request it interrupted.
    pub fn from_transport(method: &str, path: &str, err: TransportError) -> Self {
        match err {
            TransportError::Timeout(_) => ApiError::Timeout {
                method: method.to_uppercase(),
                path: path.to_string(),
                source: err,
            },
            TransportError::Network(_) => ApiError::NetworkUnreachable { source: err },
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, ApiError::Timeout { .. })
    }

    pub fn is_network_error(&self) -> bool {
        matches!(self, ApiError::NetworkUnreachable { .. })
    }

    pub fn is_unauthorized(&self) -> bool {
        matches!(self, ApiError::Unauthorized(_))
    }

    /// HTTP status carried by the error, if the server answered at all.
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Unauthorized(_) => Some(401),
            ApiError::Forbidden(_) => Some(403),
            ApiError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}
