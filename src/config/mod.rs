//! Configuration loading

pub mod settings;

pub use settings::{AnalysisConfig, GatewayConfig, LoggingConfig, RateLimitConfig, RuntimeConfig};
