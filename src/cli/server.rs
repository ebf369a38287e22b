//! Server management CLI commands

use crate::analysis::{AnalysisService, GeminiClient, RetryPolicy};
use crate::config::GatewayConfig;
use crate::gateway::{AppState, GatewayServer};
use crate::rate_limit::RateLimiter;
use anyhow::Result;
use clap::Args;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Debug, Clone, Default, Args)]
pub struct ServerArgs {
    /// Listening address (overrides config.yml and GATEWAY_LISTEN_ADDR)
    #[arg(long)]
    pub listen_addr: Option<String>,

    /// Identify clients by X-Forwarded-For / X-Real-IP instead of the socket peer
    #[arg(long)]
    pub behind_proxy: bool,

    /// Maximum request body size in bytes
    #[arg(long)]
    pub max_body_size: Option<usize>,

    /// Vision model identifier
    #[arg(long)]
    pub model: Option<String>,

    /// Per-attempt analysis timeout in milliseconds
    #[arg(long)]
    pub analysis_timeout_ms: Option<u64>,
}

impl ServerArgs {
    /// Apply command-line overrides on top of the loaded configuration
    pub fn apply(&self, mut config: GatewayConfig) -> Result<GatewayConfig> {
        debug!("Applying CLI arguments to GatewayConfig");

        if let Some(addr) = &self.listen_addr {
            config.listen_addr = addr
                .parse::<SocketAddr>()
                .map_err(|e| anyhow::anyhow!("Invalid listen address '{}': {}", addr, e))?;
        }
        if self.behind_proxy {
            config.rate_limit.behind_proxy = true;
        }
        if let Some(max_body_size) = self.max_body_size {
            config.max_body_size = max_body_size;
        }
        if let Some(model) = &self.model {
            config.analysis.model = model.clone();
        }
        if let Some(timeout) = self.analysis_timeout_ms {
            config.analysis.timeout_ms = timeout;
        }

        config.validate()?;
        Ok(config)
    }

    /// Start the gateway with the given configuration
    pub async fn start_server(&self, config: GatewayConfig) -> Result<()> {
        info!("🚀 Starting hygiene gateway");

        let config = self.apply(config)?;

        info!("📋 Server Configuration:");
        info!("   Listen address: {}", config.listen_addr);
        info!("   Behind proxy: {}", config.rate_limit.behind_proxy);
        info!(
            "   Rate limits: analyze {}/{}ms, auth {}/{}ms, general {}/{}ms",
            config.rate_limit.analyze.max_requests,
            config.rate_limit.analyze.window_ms,
            config.rate_limit.auth.max_requests,
            config.rate_limit.auth.window_ms,
            config.rate_limit.general.max_requests,
            config.rate_limit.general.window_ms
        );
        info!("   Model: {}", config.analysis.model);
        info!(
            "   Analysis: timeout {}ms, {} retries, base delay {}ms",
            config.analysis.timeout_ms, config.analysis.max_retries, config.analysis.base_delay_ms
        );
        info!("   Max body size: {} bytes", config.max_body_size);

        let client = GeminiClient::from_config(&config.analysis)?;
        let analysis = AnalysisService::new(Arc::new(client), RetryPolicy::from_config(&config.analysis));
        let limiter = RateLimiter::init(&config.rate_limit);

        let state = AppState::new(&config, Arc::new(limiter), Arc::new(analysis));
        GatewayServer::new(config.listen_addr, state).start().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overrides_applied() {
        let args = ServerArgs {
            listen_addr: Some("0.0.0.0:8080".to_string()),
            behind_proxy: true,
            model: Some("gemini-2.5-pro".to_string()),
            ..ServerArgs::default()
        };
        let config = args.apply(GatewayConfig::default()).unwrap();
        assert_eq!(config.listen_addr, "0.0.0.0:8080".parse::<SocketAddr>().unwrap());
        assert!(config.rate_limit.behind_proxy);
        assert_eq!(config.analysis.model, "gemini-2.5-pro");
        assert_eq!(config.analysis.timeout_ms, 60_000);
    }

    #[test]
    fn test_invalid_listen_addr() {
        let args = ServerArgs {
            listen_addr: Some("not-an-address".to_string()),
            ..ServerArgs::default()
        };
        assert!(args.apply(GatewayConfig::default()).is_err());
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let args = ServerArgs {
            analysis_timeout_ms: Some(0),
            ..ServerArgs::default()
        };
        assert!(args.apply(GatewayConfig::default()).is_err());
    }
}
