//! Hygiene Gateway - a rate-limited HTTP gateway for AI hygiene inspections
//!
//! This library provides a per-client sliding-window rate limiter, a resilient
//! wrapper around a hosted vision model, and the HTTP server tying them together.

pub mod analysis;
pub mod cli;
pub mod config;
pub mod error;
pub mod gateway;
pub mod logging;
pub mod models;
pub mod rate_limit;
pub mod utils;

// Re-export commonly used items
pub use analysis::{AnalysisService, GeminiClient, RetryPolicy, VisionClient};
pub use config::GatewayConfig;
pub use error::{Error, Result};
pub use gateway::GatewayServer;
pub use logging::{init_logger_with_config, log_debug, log_error, log_info};
pub use models::{AnalysisIssue, AnalysisResult, Severity};
pub use rate_limit::{RateLimitDecision, RateLimiter, RouteClass};

/// Runtime utilities for creating single-threaded vs multi-threaded Tokio runtimes
pub mod runtime {
    use crate::config::RuntimeConfig;
    use anyhow::{Context, Result};
    use tokio::runtime::{Builder, Runtime};

    /// Create a Tokio runtime based on the configuration
    pub fn create_runtime(config: &RuntimeConfig) -> Result<Runtime> {
        match config.mode.as_str() {
            "single_threaded" => {
                tracing::info!("🧵 Initializing single-threaded runtime");
                Builder::new_current_thread()
                    .enable_all()
                    .build()
                    .context("Failed to create single-threaded runtime")
            }
            "multi_threaded" => {
                let mut builder = Builder::new_multi_thread();
                builder.enable_all();

                match config.worker_threads {
                    Some(threads) if threads > 0 => {
                        tracing::info!("🧵 Initializing multi-threaded runtime with {} worker threads", threads);
                        builder.worker_threads(threads);
                    }
                    _ => tracing::info!("🧵 Initializing multi-threaded runtime with auto-detected CPU cores"),
                }

                builder.build().context("Failed to create multi-threaded runtime")
            }
            _ => {
                tracing::warn!("⚠️  Unknown runtime mode '{}', defaulting to multi-threaded", config.mode);
                Builder::new_multi_thread()
                    .enable_all()
                    .build()
                    .context("Failed to create default multi-threaded runtime")
            }
        }
    }

    /// Execute an async function with the configured runtime
    pub fn run_with_runtime<F, T>(config: &RuntimeConfig, future: F) -> Result<T>
    where
        F: std::future::Future<Output = Result<T>>,
    {
        let runtime = create_runtime(config)?;
        runtime.block_on(future)
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn test_single_threaded_runtime_runs_future() {
            let config = RuntimeConfig {
                mode: "single_threaded".to_string(),
                worker_threads: None,
            };
            let value = run_with_runtime(&config, async { Ok(42) }).unwrap();
            assert_eq!(value, 42);
        }
    }
}
