//! API route handlers

use crate::gateway::image::{decode_image, ImageError};
use crate::gateway::server::AppState;
use crate::log_error;
use crate::utils::{error_response, format_timestamp, json_response, now, read_body_limited, BodyError};
use hyper::header::{HeaderValue, ALLOW};
use hyper::{Body, Method, Request, Response, StatusCode};
use serde_json::{json, Value};
use tracing::{info, warn};

pub const HEALTH_PATH: &str = "/api/health";
pub const ANALYZE_PATH: &str = "/api/analyze";

/// Dispatch a request that has already passed the rate limiter
pub async fn route(req: Request<Body>, state: &AppState) -> Response<Body> {
    let path = req.uri().path().trim_end_matches('/');
    match path {
        HEALTH_PATH if req.method() == Method::GET => handle_health(state),
        HEALTH_PATH => method_not_allowed("GET"),
        ANALYZE_PATH if req.method() == Method::POST => handle_analyze(req, state).await,
        ANALYZE_PATH => method_not_allowed("POST"),
        _ => error_response(StatusCode::NOT_FOUND, "Route not found"),
    }
}

fn method_not_allowed(allow: &'static str) -> Response<Body> {
    let mut response = error_response(StatusCode::METHOD_NOT_ALLOWED, "Method Not Allowed");
    response.headers_mut().insert(ALLOW, HeaderValue::from_static(allow));
    response
}

/// GET /api/health
fn handle_health(state: &AppState) -> Response<Body> {
    json_response(
        StatusCode::OK,
        &json!({
            "success": true,
            "status": "healthy",
            "service": "hygiene-gateway",
            "version": env!("CARGO_PKG_VERSION"),
            "ai": state.analysis.model_name(),
            "timestamp": format_timestamp(now()),
        }),
    )
}

/// POST /api/analyze with `{image, location?, areaNotes?}`
async fn handle_analyze(req: Request<Body>, state: &AppState) -> Response<Body> {
    let bytes = match read_body_limited(req.into_body(), state.max_body_size).await {
        Ok(bytes) => bytes,
        Err(e @ BodyError::TooLarge { .. }) => {
            return error_response(StatusCode::PAYLOAD_TOO_LARGE, &e.to_string());
        }
        Err(e) => return error_response(StatusCode::BAD_REQUEST, &e.to_string()),
    };

    let body: Value = match serde_json::from_slice(&bytes) {
        Ok(body) => body,
        Err(_) => return error_response(StatusCode::BAD_REQUEST, "Request body must be a JSON object"),
    };

    let image = match &body["image"] {
        Value::Null => "",
        Value::String(image) => image.as_str(),
        _ => return error_response(StatusCode::BAD_REQUEST, &ImageError::InvalidFormat.to_string()),
    };
    let location = match optional_string(&body, "location") {
        Ok(location) => location,
        Err(response) => return response,
    };
    let area_notes = match optional_string(&body, "areaNotes") {
        Ok(notes) => notes,
        Err(response) => return response,
    };

    let payload = match decode_image(image, state.max_image_bytes) {
        Ok(payload) => payload,
        Err(e) => {
            warn!(error = %e, "Rejected analysis request");
            return error_response(StatusCode::BAD_REQUEST, &e.to_string());
        }
    };

    info!(
        mime_type = %payload.mime_type,
        bytes = payload.data.len(),
        location = location.unwrap_or("Unknown"),
        "📸 Processing image analysis request"
    );

    match state.analysis.analyze(&payload.data, &payload.mime_type).await {
        Ok(result) => json_response(
            StatusCode::OK,
            &json!({
                "success": true,
                "data": {
                    "result": result,
                    "location": location.unwrap_or("Unknown"),
                    "areaNotes": area_notes.unwrap_or_default(),
                    "analyzedAt": format_timestamp(now()),
                }
            }),
        ),
        Err(e) => {
            log_error!("Analysis unavailable: {}", e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string())
        }
    }
}

/// A field that may be absent or null, but must be a string when present
fn optional_string<'a>(body: &'a Value, field: &str) -> Result<Option<&'a str>, Response<Body>> {
    match &body[field] {
        Value::Null => Ok(None),
        Value::String(value) => Ok(Some(value.as_str())),
        _ => Err(error_response(
            StatusCode::BAD_REQUEST,
            &format!("{} must be a string", display_name(field)),
        )),
    }
}

fn display_name(field: &str) -> &'static str {
    match field {
        "location" => "Location",
        "areaNotes" => "Area notes",
        _ => "Field",
    }
}
