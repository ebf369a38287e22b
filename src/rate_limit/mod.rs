//! Per-IP sliding-window rate limiting with route-class tiers

pub mod client;
pub mod limiter;
pub mod middleware;
pub mod policy;

pub use client::{client_id, ClientContext, UNKNOWN_CLIENT};
pub use limiter::{Quota, RateLimitDecision, RateLimiter, Rejection};
pub use middleware::{apply_quota_headers, too_many_requests_response};
pub use policy::{RateLimitPolicy, RouteClass, RoutePolicies};
