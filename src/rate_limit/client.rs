//! Best-effort client identification for rate limiting

use crate::utils::header_str;
use hyper::HeaderMap;
use std::net::IpAddr;

/// Shared bucket for requests with no identifiable origin
pub const UNKNOWN_CLIENT: &str = "unknown";

/// What the HTTP layer knows about a request's origin
#[derive(Debug, Clone, Copy)]
pub struct ClientContext<'a> {
    /// Address supplied by the hosting platform (the socket peer when the
    /// gateway is not behind a reverse proxy)
    pub platform_ip: Option<IpAddr>,
    pub headers: &'a HeaderMap,
}

type Extractor = fn(&ClientContext<'_>) -> Option<String>;

/// Tried in order; the first hit identifies the client
const EXTRACTORS: [Extractor; 3] = [from_platform, from_forwarded_for, from_real_ip];

fn from_platform(ctx: &ClientContext<'_>) -> Option<String> {
    ctx.platform_ip.map(|ip| ip.to_string())
}

fn from_forwarded_for(ctx: &ClientContext<'_>) -> Option<String> {
    header_str(ctx.headers, "x-forwarded-for")
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|first| !first.is_empty())
        .map(str::to_string)
}

fn from_real_ip(ctx: &ClientContext<'_>) -> Option<String> {
    header_str(ctx.headers, "x-real-ip").map(str::to_string)
}

/// Identify the client, falling back to [`UNKNOWN_CLIENT`]
pub fn client_id(ctx: &ClientContext<'_>) -> String {
    EXTRACTORS
        .iter()
        .find_map(|extract| extract(ctx))
        .unwrap_or_else(|| UNKNOWN_CLIENT.to_string())
}
