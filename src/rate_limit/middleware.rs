//! HTTP glue: 429 responses and quota headers

use crate::rate_limit::limiter::{Quota, Rejection};
use crate::utils::{format_timestamp, json_response, set_header};
use hyper::{Body, Response, StatusCode};
use serde_json::json;

pub const HEADER_LIMIT: &str = "x-ratelimit-limit";
pub const HEADER_REMAINING: &str = "x-ratelimit-remaining";
pub const HEADER_RESET: &str = "x-ratelimit-reset";
pub const HEADER_RETRY_AFTER: &str = "retry-after";

/// Terminal response for a rejected request
pub fn too_many_requests_response(rejection: &Rejection) -> Response<Body> {
    let body = json!({
        "success": false,
        "error": "Too many requests. Please try again later.",
        "retryAfter": rejection.retry_after_secs,
    });
    let mut response = json_response(StatusCode::TOO_MANY_REQUESTS, &body);
    let headers = response.headers_mut();
    set_header(headers, HEADER_RETRY_AFTER, &rejection.retry_after_secs.to_string());
    set_header(headers, HEADER_LIMIT, &rejection.limit.to_string());
    set_header(headers, HEADER_REMAINING, "0");
    set_header(headers, HEADER_RESET, &format_timestamp(rejection.reset_at));
    response
}

/// Merge quota telemetry into the handler's response
pub fn apply_quota_headers(response: &mut Response<Body>, quota: &Quota) {
    let headers = response.headers_mut();
    set_header(headers, HEADER_LIMIT, &quota.limit.to_string());
    set_header(headers, HEADER_REMAINING, &quota.remaining.to_string());
    set_header(headers, HEADER_RESET, &format_timestamp(quota.reset_at));
}
