//! Gateway server implementation

use crate::analysis::AnalysisService;
use crate::config::GatewayConfig;
use crate::gateway::handlers::route;
use crate::rate_limit::{
    apply_quota_headers, client_id, too_many_requests_response, ClientContext, RateLimitDecision, RateLimiter,
};
use crate::utils::{log_http_completed, log_incoming_request, log_rate_limited, now};
use crate::{log_debug, log_error, log_info};
use anyhow::Result;
use hyper::server::conn::AddrStream;
use hyper::service::{make_service_fn, service_fn};
use hyper::{Body, Request, Response, Server};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{error, info};

/// Shared state handed to every request
pub struct AppState {
    pub limiter: Arc<RateLimiter>,
    pub analysis: Arc<AnalysisService>,
    /// Identify clients by forwarding headers instead of the socket peer
    pub behind_proxy: bool,
    pub max_body_size: usize,
    pub max_image_bytes: usize,
}

impl AppState {
    pub fn new(config: &GatewayConfig, limiter: Arc<RateLimiter>, analysis: Arc<AnalysisService>) -> Self {
        Self {
            limiter,
            analysis,
            behind_proxy: config.rate_limit.behind_proxy,
            max_body_size: config.max_body_size,
            max_image_bytes: config.analysis.max_image_bytes,
        }
    }
}

pub struct GatewayServer {
    listen_addr: SocketAddr,
    state: Arc<AppState>,
}

impl GatewayServer {
    pub fn new(listen_addr: SocketAddr, state: AppState) -> Self {
        Self {
            listen_addr,
            state: Arc::new(state),
        }
    }

    /// Serve until Ctrl+C, then stop the rate limiter's sweep
    pub async fn start(self) -> Result<()> {
        info!("Starting hygiene gateway on {}", self.listen_addr);
        log_debug!(
            "Server configuration: listen_addr={}, behind_proxy={}, max_body_size={}",
            self.listen_addr,
            self.state.behind_proxy,
            self.state.max_body_size
        );

        let state = Arc::clone(&self.state);
        let make_svc = make_service_fn(move |conn: &AddrStream| {
            let remote_addr = conn.remote_addr();
            let state = Arc::clone(&state);
            log_debug!("New connection from: {}", remote_addr);

            async move {
                Ok::<_, Infallible>(service_fn(move |req| {
                    let state = Arc::clone(&state);
                    async move { handle_request(req, remote_addr, state).await }
                }))
            }
        });

        let server = Server::try_bind(&self.listen_addr)?
            .serve(make_svc)
            .with_graceful_shutdown(shutdown_signal());

        log_info!("Server bound successfully, waiting for connections");

        if let Err(e) = server.await {
            error!("Server error: {}", e);
            log_error!("Server error: {}", e);
        }

        self.state.limiter.shutdown().await;
        info!("👋 Hygiene gateway stopped");
        Ok(())
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        return;
    }
    info!("🛑 Shutdown signal received");
}

/// Handle incoming HTTP request: rate-limit gate, then routing
pub async fn handle_request(
    req: Request<Body>,
    remote_addr: SocketAddr,
    state: Arc<AppState>,
) -> Result<Response<Body>, Infallible> {
    let start_time = std::time::Instant::now();
    let method = req.method().to_string();
    let path = req.uri().path().to_string();

    log_incoming_request(&method, &path, &remote_addr);

    let client = client_id(&ClientContext {
        platform_ip: (!state.behind_proxy).then(|| remote_addr.ip()),
        headers: req.headers(),
    });

    let response = match state.limiter.check_and_record(&client, &path, now()) {
        RateLimitDecision::Limited(rejection) => {
            log_rate_limited(&client, &path, rejection.route_class, rejection.retry_after_secs);
            too_many_requests_response(&rejection)
        }
        RateLimitDecision::Allowed(quota) => {
            let mut response = route(req, &state).await;
            apply_quota_headers(&mut response, &quota);
            response
        }
        RateLimitDecision::Exempt => route(req, &state).await,
    };

    log_http_completed(&method, &path, response.status(), start_time.elapsed().as_millis());
    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::{AnalysisError, RetryPolicy, VisionClient};
    use crate::config::RateLimitConfig;
    use crate::error::Error;
    use crate::rate_limit::RateLimitPolicy;
    use async_trait::async_trait;
    use hyper::{Method, StatusCode};
    use serde_json::{json, Value};

    const GOOD: &str = r#"{"overallScore": 72, "cleanliness": 70, "organization": 75, "safety": 71,
        "assessment": "Fair.", "issues": [{"type": "Surface Cleanliness", "description": "Grease on hood",
        "severity": "High", "confidence": 90}], "recommendations": ["Degrease the hood"]}"#;

    struct FixedClient {
        configured: bool,
    }

    #[async_trait]
    impl VisionClient for FixedClient {
        fn model_name(&self) -> &str {
            "fixed-model"
        }

        fn ensure_configured(&self) -> crate::error::Result<()> {
            if self.configured {
                Ok(())
            } else {
                Err(Error::MissingCredentials("GEMINI_API_KEY".to_string()))
            }
        }

        async fn analyze_image(&self, _image: &[u8], _mime_type: &str) -> std::result::Result<String, AnalysisError> {
            Ok(GOOD.to_string())
        }
    }

    fn state_with(configured: bool, analyze_limit: u32) -> Arc<AppState> {
        let config = GatewayConfig {
            rate_limit: RateLimitConfig {
                analyze: RateLimitPolicy::new(analyze_limit, 60_000),
                ..RateLimitConfig::default()
            },
            ..GatewayConfig::default()
        };
        let analysis = AnalysisService::new(Arc::new(FixedClient { configured }), RetryPolicy::default());
        Arc::new(AppState::new(
            &config,
            Arc::new(RateLimiter::new(&config.rate_limit)),
            Arc::new(analysis),
        ))
    }

    fn peer(last_octet: u8) -> SocketAddr {
        SocketAddr::from(([10, 0, 0, last_octet], 40000))
    }

    fn analyze_request(body: Value) -> Request<Body> {
        Request::builder()
            .method(Method::POST)
            .uri("/api/analyze")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get(path: &str) -> Request<Body> {
        Request::builder().uri(path).body(Body::empty()).unwrap()
    }

    async fn body_json(response: Response<Body>) -> Value {
        let bytes = hyper::body::to_bytes(response.into_body()).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn header<'a>(response: &'a Response<Body>, name: &str) -> &'a str {
        response.headers().get(name).unwrap().to_str().unwrap()
    }

    #[tokio::test]
    async fn test_health_is_exempt() {
        let state = state_with(true, 1);
        for _ in 0..5 {
            let response = handle_request(get("/api/health"), peer(1), state.clone()).await.unwrap();
            assert_eq!(response.status(), StatusCode::OK);
            assert!(response.headers().get("x-ratelimit-limit").is_none());
            let body = body_json(response).await;
            assert_eq!(body["status"], "healthy");
            assert_eq!(body["ai"], "fixed-model");
        }
        assert_eq!(state.limiter.tracked_keys(), 0);
    }

    #[tokio::test]
    async fn test_analyze_success_envelope() {
        let state = state_with(true, 10);
        let request = analyze_request(json!({
            "image": "data:image/jpeg;base64,aGVsbG8=",
            "location": "Kitchen A",
        }));

        let response = handle_request(request, peer(1), state).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(header(&response, "x-ratelimit-limit"), "10");
        assert_eq!(header(&response, "x-ratelimit-remaining"), "9");

        let body = body_json(response).await;
        assert_eq!(body["success"], true);
        assert_eq!(body["data"]["result"]["overallScore"], 72);
        assert_eq!(body["data"]["result"]["issues"][0]["severity"], "High");
        assert_eq!(body["data"]["location"], "Kitchen A");
        assert_eq!(body["data"]["areaNotes"], "");
        assert!(body["data"]["analyzedAt"].as_str().unwrap().ends_with('Z'));
    }

    #[tokio::test]
    async fn test_rate_limited_after_quota() {
        let state = state_with(true, 2);
        for remaining in ["1", "0"] {
            let request = analyze_request(json!({ "image": "aGVsbG8=" }));
            let response = handle_request(request, peer(1), state.clone()).await.unwrap();
            assert_eq!(response.status(), StatusCode::OK);
            assert_eq!(header(&response, "x-ratelimit-remaining"), remaining);
        }

        let request = analyze_request(json!({ "image": "aGVsbG8=" }));
        let response = handle_request(request, peer(1), state.clone()).await.unwrap();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(header(&response, "x-ratelimit-remaining"), "0");
        let retry_after: u64 = header(&response, "retry-after").parse().unwrap();
        assert!((1..=60).contains(&retry_after));
        let body = body_json(response).await;
        assert_eq!(body["success"], false);
        assert_eq!(body["retryAfter"], retry_after);

        // another client keeps its own budget
        let request = analyze_request(json!({ "image": "aGVsbG8=" }));
        let response = handle_request(request, peer(2), state).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_forwarded_for_used_behind_proxy() {
        let config = GatewayConfig {
            rate_limit: RateLimitConfig {
                general: RateLimitPolicy::new(1, 60_000),
                behind_proxy: true,
                ..RateLimitConfig::default()
            },
            ..GatewayConfig::default()
        };
        let analysis = AnalysisService::new(Arc::new(FixedClient { configured: true }), RetryPolicy::default());
        let state = Arc::new(AppState::new(
            &config,
            Arc::new(RateLimiter::new(&config.rate_limit)),
            Arc::new(analysis),
        ));

        let forwarded = |ip: &str| {
            Request::builder()
                .uri("/api/reports")
                .header("x-forwarded-for", ip)
                .body(Body::empty())
                .unwrap()
        };

        let first = handle_request(forwarded("203.0.113.7"), peer(1), state.clone()).await.unwrap();
        assert_eq!(first.status(), StatusCode::NOT_FOUND);
        let second = handle_request(forwarded("203.0.113.7"), peer(2), state.clone()).await.unwrap();
        assert_eq!(second.status(), StatusCode::TOO_MANY_REQUESTS);
        let other = handle_request(forwarded("203.0.113.8"), peer(1), state).await.unwrap();
        assert_eq!(other.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_analyze_validation_errors() {
        let state = state_with(true, 100);
        let cases = vec![
            (json!({}), "Image is required"),
            (json!({ "image": "aGVsbG8=", "location": 5 }), "Location must be a string"),
            (json!({ "image": "aGVsbG8=", "areaNotes": ["x"] }), "Area notes must be a string"),
            (
                json!({ "image": "data:image/bmp;base64,aGVsbG8=" }),
                "Invalid image format. Supported formats: JPEG, PNG, GIF, WebP",
            ),
        ];

        for (body, message) in cases {
            let response = handle_request(analyze_request(body), peer(1), state.clone()).await.unwrap();
            assert_eq!(response.status(), StatusCode::BAD_REQUEST);
            assert_eq!(body_json(response).await["error"], message);
        }

        let request = Request::builder()
            .method(Method::POST)
            .uri("/api/analyze")
            .body(Body::from("{not json"))
            .unwrap();
        let response = handle_request(request, peer(1), state).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_oversized_body_rejected() {
        let config = GatewayConfig {
            max_body_size: 64,
            ..GatewayConfig::default()
        };
        let analysis = AnalysisService::new(Arc::new(FixedClient { configured: true }), RetryPolicy::default());
        let state = Arc::new(AppState::new(
            &config,
            Arc::new(RateLimiter::new(&config.rate_limit)),
            Arc::new(analysis),
        ));

        let request = analyze_request(json!({ "image": "A".repeat(256) }));
        let response = handle_request(request, peer(1), state).await.unwrap();
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[tokio::test]
    async fn test_missing_credentials_is_500() {
        let state = state_with(false, 10);
        let request = analyze_request(json!({ "image": "aGVsbG8=" }));
        let response = handle_request(request, peer(1), state).await.unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = body_json(response).await;
        assert_eq!(body["success"], false);
        assert!(body["error"].as_str().unwrap().contains("GEMINI_API_KEY"));
    }

    #[tokio::test]
    async fn test_method_and_route_errors() {
        let state = state_with(true, 10);

        let response = handle_request(get("/api/analyze"), peer(1), state.clone()).await.unwrap();
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(header(&response, "allow"), "POST");

        let response = handle_request(get("/api/unknown"), peer(1), state.clone()).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(header(&response, "x-ratelimit-limit"), "60");

        let response = handle_request(get("/favicon.ico"), peer(1), state).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert!(response.headers().get("x-ratelimit-limit").is_none());
    }
}
