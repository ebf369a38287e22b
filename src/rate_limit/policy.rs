//! Route classes and their quotas

use crate::config::RateLimitConfig;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// Longest window a policy may use (one day)
pub const MAX_WINDOW_MS: u64 = 24 * 60 * 60 * 1000;

pub const DEFAULT_ANALYZE_POLICY: RateLimitPolicy = RateLimitPolicy::new(10, 60_000);
pub const DEFAULT_AUTH_POLICY: RateLimitPolicy = RateLimitPolicy::new(20, 60_000);
pub const DEFAULT_GENERAL_POLICY: RateLimitPolicy = RateLimitPolicy::new(60, 60_000);

/// Ceiling of accepted requests per sliding window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitPolicy {
    pub max_requests: u32,
    pub window_ms: u64,
}

impl RateLimitPolicy {
    pub const fn new(max_requests: u32, window_ms: u64) -> Self {
        Self {
            max_requests,
            window_ms,
        }
    }
}

impl Default for RateLimitPolicy {
    fn default() -> Self {
        DEFAULT_GENERAL_POLICY
    }
}

/// A policy as written in config, where either key may be omitted
#[derive(Deserialize)]
struct PolicyFields {
    max_requests: Option<u32>,
    window_ms: Option<u64>,
}

fn policy_over<'de, D>(defaults: RateLimitPolicy, deserializer: D) -> Result<RateLimitPolicy, D::Error>
where
    D: Deserializer<'de>,
{
    let fields = PolicyFields::deserialize(deserializer)?;
    Ok(RateLimitPolicy {
        max_requests: fields.max_requests.unwrap_or(defaults.max_requests),
        window_ms: fields.window_ms.unwrap_or(defaults.window_ms),
    })
}

/// Deserialize the analyze policy, filling omitted keys from its defaults
pub fn analyze_policy<'de, D: Deserializer<'de>>(deserializer: D) -> Result<RateLimitPolicy, D::Error> {
    policy_over(DEFAULT_ANALYZE_POLICY, deserializer)
}

pub fn auth_policy<'de, D: Deserializer<'de>>(deserializer: D) -> Result<RateLimitPolicy, D::Error> {
    policy_over(DEFAULT_AUTH_POLICY, deserializer)
}

pub fn general_policy<'de, D: Deserializer<'de>>(deserializer: D) -> Result<RateLimitPolicy, D::Error> {
    policy_over(DEFAULT_GENERAL_POLICY, deserializer)
}

/// Quota bucket a request path falls into
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RouteClass {
    /// AI analysis endpoints
    Analyze,
    /// Authentication endpoints
    Auth,
    /// Everything else under /api/
    General,
}

impl RouteClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            RouteClass::Analyze => "analyze",
            RouteClass::Auth => "auth",
            RouteClass::General => "general",
        }
    }

    /// Classify a request path. `None` means the path bypasses the limiter.
    pub fn classify(path: &str) -> Option<RouteClass> {
        if is_exempt(path) {
            return None;
        }

        if path.contains("/api/analyze") {
            Some(RouteClass::Analyze)
        } else if path.contains("/api/auth/") {
            Some(RouteClass::Auth)
        } else {
            Some(RouteClass::General)
        }
    }
}

impl fmt::Display for RouteClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Hand-coded exemptions: framework internals, static assets, the health
/// check and anything outside the API.
fn is_exempt(path: &str) -> bool {
    path.starts_with("/_next/")
        || path.starts_with("/static/")
        || path.starts_with("/api/health")
        || path.contains('.')
        || !path.starts_with("/api/")
}

/// The three configured policies, looked up by route class
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoutePolicies {
    pub analyze: RateLimitPolicy,
    pub auth: RateLimitPolicy,
    pub general: RateLimitPolicy,
}

impl RoutePolicies {
    pub fn from_config(config: &RateLimitConfig) -> Self {
        Self {
            analyze: config.analyze,
            auth: config.auth,
            general: config.general,
        }
    }

    pub fn policy_for(&self, class: RouteClass) -> RateLimitPolicy {
        match class {
            RouteClass::Analyze => self.analyze,
            RouteClass::Auth => self.auth,
            RouteClass::General => self.general,
        }
    }
}

impl Default for RoutePolicies {
    fn default() -> Self {
        Self::from_config(&RateLimitConfig::default())
    }
}
