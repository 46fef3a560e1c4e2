//! Per-endpoint request timeouts.
//!
//! Uploads are slow and auth checks should fail fast, so every request gets
//! a timeout picked from the shape of its path and method. Rules are tried
//! in order and the first match wins; anything unmatched gets the default.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Category of backend routes sharing an expected latency profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointClass {
    Upload,
    Product,
    ProductsList,
    Auth,
    Orders,
}

impl EndpointClass {
    /// Evaluation order used by [`TimeoutPolicy`].
    pub const ORDERED: [EndpointClass; 5] = [
        EndpointClass::Upload,
        EndpointClass::Product,
        EndpointClass::ProductsList,
        EndpointClass::Auth,
        EndpointClass::Orders,
    ];

    /// Expects a lowercased path and method.
    fn matches(self, path: &str, method: &str) -> bool {
        match self {
            EndpointClass::Upload => {
                method == "post"
                    && (path.contains("/image") || path.contains("/upload") || path.contains("/file"))
            }
            EndpointClass::Product => path.contains("/products/") && !path.ends_with("/products/"),
            EndpointClass::ProductsList => path.contains("/products"),
            EndpointClass::Auth => path.contains("/auth/") || path.contains("/login"),
            EndpointClass::Orders => path.contains("/orders/") || path.contains("/order/"),
        }
    }
}

/// Timeout presets in seconds, one per endpoint class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutSettings {
    pub default: u64,
    pub product: u64,
    pub products_list: u64,
    pub auth: u64,
    pub orders: u64,
    pub upload: u64,
}

impl Default for TimeoutSettings {
    fn default() -> Self {
        Self {
            default: 30,
            product: 15,
            products_list: 25,
            auth: 10,
            orders: 20,
            upload: 60,
        }
    }
}

impl TimeoutSettings {
    fn seconds_for(&self, class: EndpointClass) -> u64 {
        match class {
            EndpointClass::Upload => self.upload,
            EndpointClass::Product => self.product,
            EndpointClass::ProductsList => self.products_list,
            EndpointClass::Auth => self.auth,
            EndpointClass::Orders => self.orders,
        }
    }
}

#[derive(Debug, Clone)]
struct TimeoutRule {
    class: EndpointClass,
    timeout: Duration,
}

/// Ordered first-match timeout rules plus a fallback.
#[derive(Debug, Clone)]
pub struct TimeoutPolicy {
    rules: Vec<TimeoutRule>,
    default: Duration,
}

impl Default for TimeoutPolicy {
    fn default() -> Self {
        Self::from_settings(&TimeoutSettings::default())
    }
}

impl TimeoutPolicy {
    pub fn from_settings(settings: &TimeoutSettings) -> Self {
        let rules = EndpointClass::ORDERED
            .iter()
            .map(|&class| TimeoutRule {
                class,
                timeout: Duration::from_secs(settings.seconds_for(class)),
            })
            .collect();

        Self {
            rules,
            default: Duration::from_secs(settings.default),
        }
    }

    fn rule_for(&self, path: &str, method: &str) -> Option<&TimeoutRule> {
        let path = path.to_lowercase();
        let method = method.to_lowercase();
        self.rules.iter().find(|rule| rule.class.matches(&path, &method))
    }

    /// Endpoint class of a request, or `None` for the default bucket.
    pub fn class_of(&self, path: &str, method: &str) -> Option<EndpointClass> {
        self.rule_for(path, method).map(|rule| rule.class)
    }

    /// Timeout for a request. Total: always returns a duration.
    pub fn classify(&self, path: &str, method: &str) -> Duration {
        if path.is_empty() {
            return self.default;
        }
        self.rule_for(path, method)
            .map(|rule| rule.timeout)
            .unwrap_or(self.default)
    }

    pub fn default_timeout(&self) -> Duration {
        self.default
    }
}
