use std::time::Duration;

use reqwest::Method;
use serde::de::DeserializeOwned;
use serde_json::Value;

use super::ApiError;

/// Paths that obtain credentials rather than use them. These never carry a
/// bearer token and never go through 401 recovery.
const AUTH_ENDPOINTS: [&str; 3] = ["/auth/login", "/auth/register", "/auth/token/refresh"];

/// Per-call overrides accepted by every `ApiClient` verb.
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    /// Pin the timeout instead of letting the endpoint class decide.
    pub timeout: Option<Duration>,
    pub query: Vec<(String, String)>,
}

impl RequestOptions {
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn query(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.query.push((key.into(), value.to_string()));
        self
    }
}

/// A request as it moves through the middleware stages.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body: Option<Value>,
    /// Set by the caller to pin the timeout, or by the request stage.
    pub timeout: Option<Duration>,
    /// Base URL captured when credentials were attached.
    pub base_url: String,
    pub bearer: Option<String>,
    /// One-shot marker so a 401 is recovered at most once.
    pub retried: bool,
    /// Login session the credentials were taken from; 0 until prepared.
    pub session_epoch: u64,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            body: None,
            timeout: None,
            base_url: String::new(),
            bearer: None,
            retried: false,
            session_epoch: 0,
        }
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn with_options(mut self, options: RequestOptions) -> Self {
        self.timeout = options.timeout;
        self.query = options.query;
        self
    }

    /// Login, register and token refresh endpoints.
    pub fn is_auth_endpoint(&self) -> bool {
        AUTH_ENDPOINTS.iter().any(|p| self.path.contains(p))
    }

    /// Absolute URL for the captured base URL.
    pub fn url(&self) -> String {
        if self.path.starts_with("http://") || self.path.starts_with("https://") {
            return self.path.clone();
        }
        let base = self.base_url.trim_end_matches('/');
        if self.path.starts_with('/') {
            format!("{}{}", base, self.path)
        } else {
            format!("{}/{}", base, self.path)
        }
    }

    /// "GET /orders/" style label for logs and error messages.
    pub fn describe(&self) -> String {
        format!("{} {}", self.method, self.path)
    }
}

/// A response that reached us with an HTTP status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiResponse {
    pub status: u16,
    pub body: String,
}

impl ApiResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Decode the body; an empty body decodes as JSON `null`.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, ApiError> {
        let body = if self.body.trim().is_empty() {
            "null"
        } else {
            self.body.as_str()
        };
        serde_json::from_str(body).map_err(|e| ApiError::InvalidResponse(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_endpoint_detection() {
        assert!(ApiRequest::new(Method::POST, "/auth/login/").is_auth_endpoint());
        assert!(ApiRequest::new(Method::POST, "/auth/register/").is_auth_endpoint());
        assert!(ApiRequest::new(Method::POST, "/auth/token/refresh/").is_auth_endpoint());
        assert!(!ApiRequest::new(Method::GET, "/auth/profile/").is_auth_endpoint());
        assert!(!ApiRequest::new(Method::GET, "/orders/").is_auth_endpoint());
    }

    #[test]
    fn test_url_joining() {
        let mut request = ApiRequest::new(Method::GET, "/orders/");
        request.base_url = "https://api.example.com/api/".to_string();
        assert_eq!(request.url(), "https://api.example.com/api/orders/");

        request.path = "orders/".to_string();
        assert_eq!(request.url(), "https://api.example.com/api/orders/");
    }

    #[test]
    fn test_options_pin_timeout_and_query() {
        let request = ApiRequest::new(Method::GET, "/orders/").with_options(
            RequestOptions::default()
                .timeout(Duration::from_secs(5))
                .query("page", 2),
        );
        assert_eq!(request.timeout, Some(Duration::from_secs(5)));
        assert_eq!(request.query, vec![("page".to_string(), "2".to_string())]);
        assert_eq!(request.describe(), "GET /orders/");
    }

    #[test]
    fn test_empty_body_decodes_as_unit() {
        let response = ApiResponse::new(204, "");
        assert!(response.is_success());
        response.json::<()>().expect("empty body should decode as unit");
        assert!(ApiResponse::new(200, "not json").json::<Value>().is_err());
    }
}
