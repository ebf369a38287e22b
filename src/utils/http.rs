//! HTTP utility functions

use bytes::Bytes;
use hyper::header::{HeaderName, HeaderValue, CACHE_CONTROL, CONTENT_TYPE};
use hyper::{Body, HeaderMap, Response, StatusCode};
use serde_json::{json, Value};
use tracing::debug;

/// Read a header as a trimmed, non-empty string
pub fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

/// Insert a header, skipping values that are not valid header text
pub fn set_header(headers: &mut HeaderMap, name: &'static str, value: &str) {
    match HeaderValue::from_str(value) {
        Ok(value) => {
            headers.insert(HeaderName::from_static(name), value);
        }
        Err(_) => debug!("Skipping invalid value for header {}: {:?}", name, value),
    }
}

/// Build a JSON response
pub fn json_response(status: StatusCode, body: &Value) -> Response<Body> {
    let mut response = Response::new(Body::from(body.to_string()));
    *response.status_mut() = status;
    let headers = response.headers_mut();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    response
}

/// Build the `{success: false, error}` envelope used by every API error
pub fn error_response(status: StatusCode, message: &str) -> Response<Body> {
    json_response(status, &json!({ "success": false, "error": message }))
}

/// Reasons a request body could not be collected
#[derive(Debug, thiserror::Error)]
pub enum BodyError {
    #[error("Request body exceeds {limit} bytes")]
    TooLarge { limit: usize },

    #[error("Failed to read request body: {0}")]
    Read(#[from] hyper::Error),
}

/// Collect a request body, refusing to buffer more than `limit` bytes
pub async fn read_body_limited(body: Body, limit: usize) -> Result<Bytes, BodyError> {
    use futures::StreamExt;

    let mut body = body;
    let mut collected = Vec::new();
    while let Some(chunk) = body.next().await {
        let chunk = chunk?;
        if collected.len() + chunk.len() > limit {
            return Err(BodyError::TooLarge { limit });
        }
        collected.extend_from_slice(&chunk);
    }
    debug!("Body extracted, size: {} bytes", collected.len());
    Ok(Bytes::from(collected))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_str_trims_and_skips_empty() {
        let mut headers = HeaderMap::new();
        headers.insert("x-real-ip", " 10.0.0.1 ".parse().unwrap());
        headers.insert("x-empty", "  ".parse().unwrap());

        assert_eq!(header_str(&headers, "x-real-ip"), Some("10.0.0.1"));
        assert_eq!(header_str(&headers, "x-empty"), None);
        assert_eq!(header_str(&headers, "x-missing"), None);
    }

    #[test]
    fn test_error_response_envelope() {
        let response = error_response(StatusCode::BAD_REQUEST, "Image is required");
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(response.headers()[CONTENT_TYPE], "application/json");
    }

    #[tokio::test]
    async fn test_read_body_limited() {
        let body = read_body_limited(Body::from("hello"), 16).await.unwrap();
        assert_eq!(&body[..], b"hello");

        let err = read_body_limited(Body::from("hello world"), 4).await.unwrap_err();
        assert!(matches!(err, BodyError::TooLarge { limit: 4 }));
    }
}
