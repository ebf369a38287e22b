//! Gateway configuration settings

use crate::error::Error;
use crate::rate_limit::policy::{
    analyze_policy, auth_policy, general_policy, DEFAULT_ANALYZE_POLICY, DEFAULT_AUTH_POLICY,
    DEFAULT_GENERAL_POLICY, MAX_WINDOW_MS,
};
use crate::rate_limit::RateLimitPolicy;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;

/// Default configuration file looked up in the working directory
pub const DEFAULT_CONFIG_PATH: &str = "config.yml";

/// Longest interval between rate-limit sweeps (one week)
pub const MAX_SWEEP_INTERVAL_SECS: u64 = 7 * 24 * 60 * 60;

/// Environment variable holding the vision API key
pub const API_KEY_ENV: &str = "GEMINI_API_KEY";

/// Main configuration for the gateway
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Server listening address
    pub listen_addr: SocketAddr,

    /// Log level configuration
    pub log_level: String,

    /// Maximum request body size in bytes
    pub max_body_size: usize,

    /// Logging configuration
    pub logging: LoggingConfig,

    /// Rate limiting configuration
    pub rate_limit: RateLimitConfig,

    /// Vision analysis configuration
    pub analysis: AnalysisConfig,

    /// Runtime configuration
    pub runtime: RuntimeConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Also write logs to a daily-rotated file
    pub enable_file_logging: bool,

    /// Directory for log files
    pub log_dir: String,
}

/// Rate limiting configuration: one policy per route class
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// AI analysis endpoints (strict)
    #[serde(deserialize_with = "analyze_policy")]
    pub analyze: RateLimitPolicy,

    /// Auth endpoints (moderate)
    #[serde(deserialize_with = "auth_policy")]
    pub auth: RateLimitPolicy,

    /// Every other API route (lenient)
    #[serde(deserialize_with = "general_policy")]
    pub general: RateLimitPolicy,

    /// Interval between garbage-collection sweeps of idle entries
    pub sweep_interval_secs: u64,

    /// Ignore the socket peer and identify clients by forwarding headers
    pub behind_proxy: bool,
}

/// Vision analysis configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// API key for the vision service, normally supplied via GEMINI_API_KEY
    #[serde(skip_serializing)]
    pub api_key: Option<String>,

    /// Model identifier
    pub model: String,

    /// Base URL of the generative language API
    pub api_base_url: String,

    /// Per-attempt timeout in milliseconds
    pub timeout_ms: u64,

    /// Retries after the first attempt
    pub max_retries: u32,

    /// Backoff base delay in milliseconds
    pub base_delay_ms: u64,

    /// Largest decoded image accepted by the analyze endpoint
    pub max_image_bytes: usize,
}

/// Runtime configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Runtime mode: "single_threaded" or "multi_threaded"
    pub mode: String,

    /// Number of worker threads for multi-threaded mode (0 = auto-detect CPU cores)
    pub worker_threads: Option<usize>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([127, 0, 0, 1], 3000)),
            log_level: "info".to_string(),
            // 10MB image as base64 plus JSON envelope
            max_body_size: 14 * 1024 * 1024,
            logging: LoggingConfig::default(),
            rate_limit: RateLimitConfig::default(),
            analysis: AnalysisConfig::default(),
            runtime: RuntimeConfig::default(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enable_file_logging: false,
            log_dir: "logs".to_string(),
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            analyze: DEFAULT_ANALYZE_POLICY,
            auth: DEFAULT_AUTH_POLICY,
            general: DEFAULT_GENERAL_POLICY,
            sweep_interval_secs: 300,
            behind_proxy: false,
        }
    }
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: "gemini-2.5-flash".to_string(),
            api_base_url: "https://generativelanguage.googleapis.com".to_string(),
            timeout_ms: 60_000,
            max_retries: 2,
            base_delay_ms: 1_000,
            max_image_bytes: 10 * 1024 * 1024,
        }
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            mode: "multi_threaded".to_string(),
            worker_threads: None,
        }
    }
}

impl RateLimitConfig {
    /// Longest window across all route classes
    pub fn longest_window_ms(&self) -> u64 {
        [self.analyze, self.auth, self.general]
            .iter()
            .map(|policy| policy.window_ms)
            .max()
            .unwrap_or(0)
    }
}

impl GatewayConfig {
    /// Load configuration from a YAML file
    pub fn from_yaml_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        let config: GatewayConfig = serde_yaml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.as_ref().display()))?;

        Ok(config)
    }

    /// Load configuration from `config.yml` when present, then apply
    /// environment variable overrides and validate
    pub fn load_config() -> Result<Self> {
        Self::load_from(DEFAULT_CONFIG_PATH)
    }

    /// Same as [`GatewayConfig::load_config`] with an explicit file path
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut config = if path.as_ref().exists() {
            Self::from_yaml_file(path.as_ref())?
        } else {
            Self::default()
        };

        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Override settings from environment variables
    pub fn apply_env_overrides(&mut self) {
        if let Ok(addr_str) = std::env::var("GATEWAY_LISTEN_ADDR") {
            if let Ok(addr) = addr_str.parse() {
                self.listen_addr = addr;
            }
        }

        if let Ok(log_level) = std::env::var("RUST_LOG") {
            self.log_level = log_level;
        }

        if let Ok(max_size) = std::env::var("GATEWAY_MAX_BODY_SIZE") {
            if let Ok(max_size) = max_size.parse() {
                self.max_body_size = max_size;
            }
        }

        if let Ok(enable) = std::env::var("GATEWAY_ENABLE_FILE_LOGGING") {
            self.logging.enable_file_logging = enable.to_lowercase() == "true";
        }

        if let Ok(behind_proxy) = std::env::var("GATEWAY_BEHIND_PROXY") {
            self.rate_limit.behind_proxy = behind_proxy.to_lowercase() == "true";
        }

        if let Ok(api_key) = std::env::var(API_KEY_ENV) {
            if !api_key.trim().is_empty() {
                self.analysis.api_key = Some(api_key);
            }
        }

        if let Ok(model) = std::env::var("GEMINI_MODEL") {
            self.analysis.model = model;
        }

        if let Ok(base) = std::env::var("GEMINI_API_BASE") {
            self.analysis.api_base_url = base;
        }

        if let Ok(timeout) = std::env::var("GATEWAY_ANALYSIS_TIMEOUT_MS") {
            if let Ok(timeout) = timeout.parse() {
                self.analysis.timeout_ms = timeout;
            }
        }

        if let Ok(mode) = std::env::var("GATEWAY_RUNTIME_MODE") {
            self.runtime.mode = mode;
        }

        if let Ok(threads) = std::env::var("GATEWAY_WORKER_THREADS") {
            if let Ok(threads) = threads.parse() {
                self.runtime.worker_threads = Some(threads);
            }
        }
    }

    /// Reject configurations the limiter and analysis wrapper cannot honor
    pub fn validate(&self) -> std::result::Result<(), Error> {
        let policies = [
            ("analyze", self.rate_limit.analyze),
            ("auth", self.rate_limit.auth),
            ("general", self.rate_limit.general),
        ];
        for (name, policy) in policies {
            if policy.max_requests == 0 {
                return Err(Error::Config(format!("rate_limit.{}.max_requests must be positive", name)));
            }
            if policy.window_ms == 0 {
                return Err(Error::Config(format!("rate_limit.{}.window_ms must be positive", name)));
            }
            if policy.window_ms > MAX_WINDOW_MS {
                return Err(Error::Config(format!(
                    "rate_limit.{}.window_ms must not exceed {} (one day)",
                    name, MAX_WINDOW_MS
                )));
            }
        }

        if self.rate_limit.sweep_interval_secs > MAX_SWEEP_INTERVAL_SECS {
            return Err(Error::Config(format!(
                "rate_limit.sweep_interval_secs must not exceed {} (one week)",
                MAX_SWEEP_INTERVAL_SECS
            )));
        }

        if self.rate_limit.sweep_interval_secs.saturating_mul(1000) < self.rate_limit.longest_window_ms() {
            return Err(Error::Config(
                "rate_limit.sweep_interval_secs must not be shorter than the longest window".to_string(),
            ));
        }

        if self.analysis.timeout_ms == 0 {
            return Err(Error::Config("analysis.timeout_ms must be positive".to_string()));
        }

        match self.runtime.mode.as_str() {
            "single_threaded" | "multi_threaded" => Ok(()),
            other => Err(Error::Config(format!("Unknown runtime mode '{}'", other))),
        }
    }

    /// Render the effective configuration as YAML (the API key is never printed)
    pub fn to_yaml(&self) -> std::result::Result<String, Error> {
        Ok(serde_yaml::to_string(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_policies() {
        let config = GatewayConfig::default();
        assert_eq!(config.rate_limit.analyze, RateLimitPolicy::new(10, 60_000));
        assert_eq!(config.rate_limit.auth, RateLimitPolicy::new(20, 60_000));
        assert_eq!(config.rate_limit.general, RateLimitPolicy::new(60, 60_000));
        assert_eq!(config.analysis.max_retries, 2);
        assert_eq!(config.analysis.timeout_ms, 60_000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "listen_addr: 0.0.0.0:8081\nrate_limit:\n  analyze:\n    max_requests: 3\n    window_ms: 1000\n"
        )
        .unwrap();

        let config = GatewayConfig::from_yaml_file(file.path()).unwrap();
        assert_eq!(config.listen_addr.port(), 8081);
        assert_eq!(config.rate_limit.analyze, RateLimitPolicy::new(3, 1000));
        assert_eq!(config.rate_limit.general, RateLimitPolicy::new(60, 60_000));
        assert_eq!(config.analysis.model, "gemini-2.5-flash");
    }

    #[test]
    fn test_validate_rejects_zero_quota() {
        let mut config = GatewayConfig::default();
        config.rate_limit.auth.max_requests = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("rate_limit.auth.max_requests"));
    }

    #[test]
    fn test_validate_rejects_short_sweep() {
        let mut config = GatewayConfig::default();
        config.rate_limit.sweep_interval_secs = 10;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_oversized_window() {
        let mut config = GatewayConfig::default();
        config.rate_limit.general = RateLimitPolicy::new(5, 9_000_000_000_000_000_000);
        config.rate_limit.sweep_interval_secs = 9_000_000_000_000_000;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("rate_limit.general.window_ms"));

        config.rate_limit.general = RateLimitPolicy::new(5, MAX_WINDOW_MS);
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("sweep_interval_secs"));

        config.rate_limit.sweep_interval_secs = MAX_SWEEP_INTERVAL_SECS;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_policy_keys_fall_back_per_class() {
        let yaml = "rate_limit:\n  analyze:\n    max_requests: 3\n  auth:\n    window_ms: 1000\n";
        let config: GatewayConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.rate_limit.analyze, RateLimitPolicy::new(3, 60_000));
        assert_eq!(config.rate_limit.auth, RateLimitPolicy::new(20, 1000));
        assert_eq!(config.rate_limit.general, RateLimitPolicy::new(60, 60_000));

        let policy: RateLimitPolicy = serde_yaml::from_str("max_requests: 7").unwrap();
        assert_eq!(policy, RateLimitPolicy::new(7, 60_000));
    }

    #[test]
    fn test_yaml_never_contains_api_key() {
        let mut config = GatewayConfig::default();
        config.analysis.api_key = Some("secret-key".to_string());
        let yaml = config.to_yaml().unwrap();
        assert!(!yaml.contains("secret-key"));
        assert!(yaml.contains("gemini-2.5-flash"));
    }
}
