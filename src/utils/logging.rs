//! Logging utility functions for request handling

use crate::log_debug;
use crate::rate_limit::RouteClass;
use hyper::StatusCode;
use std::net::SocketAddr;
use tracing::{info, warn};

/// Log incoming request information
pub fn log_incoming_request(method: &str, path: &str, remote_addr: &SocketAddr) {
    info!("📥 {} {} from {}", method, path, remote_addr.ip());
    log_debug!("🔍 REQUEST DETAILS:\n  Method: {}\n  Path: {}\n  Remote: {}",
               method, path, remote_addr);
}

/// Log a completed request
pub fn log_http_completed(method: &str, path: &str, status: StatusCode, total_time: u128) {
    info!("✅ completed {} {} → {} ({}ms)", method,
          path.chars().take(50).collect::<String>(),
          status, total_time);
}

/// Log a request rejected by the rate limiter
pub fn log_rate_limited(client_id: &str, path: &str, route_class: RouteClass, retry_after_secs: u64) {
    warn!(
        client = client_id,
        path,
        route_class = route_class.as_str(),
        retry_after_secs,
        "🚦 Rate limit exceeded"
    );
}
