//! Timeout, retry and fallback around a single logical vision call

use crate::analysis::client::VisionClient;
use crate::analysis::error::AnalysisError;
use crate::analysis::response::parse_analysis;
use crate::config::AnalysisConfig;
use crate::error::Result;
use crate::models::AnalysisResult;
use crate::utils::{backoff_delay, duration_to_ms, race_deadline, Sleeper, TokioSleeper};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// Attempt budget and timing for one `analyze` call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,
    /// Hard deadline per attempt
    pub attempt_timeout: Duration,
    /// Delay before the first retry; doubles for each one after
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &AnalysisConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            attempt_timeout: Duration::from_millis(config.timeout_ms),
            base_delay: Duration::from_millis(config.base_delay_ms),
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&AnalysisConfig::default())
    }
}

/// State carried across the attempts of one call
struct AttemptState {
    attempt_number: u32,
    last_error: Option<AnalysisError>,
}

pub struct AnalysisService {
    client: Arc<dyn VisionClient>,
    sleeper: Arc<dyn Sleeper>,
    policy: RetryPolicy,
}

impl AnalysisService {
    pub fn new(client: Arc<dyn VisionClient>, policy: RetryPolicy) -> Self {
        Self::with_sleeper(client, policy, Arc::new(TokioSleeper))
    }

    pub fn with_sleeper(client: Arc<dyn VisionClient>, policy: RetryPolicy, sleeper: Arc<dyn Sleeper>) -> Self {
        Self {
            client,
            sleeper,
            policy,
        }
    }

    pub fn model_name(&self) -> &str {
        self.client.model_name()
    }

    /// Analyze one image. Operational failures (timeouts, quota, malformed
    /// output) come back as a fallback result; `Err` is reserved for
    /// configuration problems detected before the first attempt.
    pub async fn analyze(&self, image: &[u8], mime_type: &str) -> Result<AnalysisResult> {
        self.client.ensure_configured()?;

        let max_attempts = self.policy.max_attempts();
        let mut state = AttemptState {
            attempt_number: 1,
            last_error: None,
        };

        loop {
            info!(
                attempt = state.attempt_number,
                max_attempts,
                mime_type,
                model = self.client.model_name(),
                bytes = image.len(),
                "🔍 Analyzing image"
            );

            let err = match self.attempt(image, mime_type).await {
                Ok(result) => {
                    info!(
                        attempt = state.attempt_number,
                        overall_score = result.overall_score,
                        issues = result.issues.len(),
                        "✅ Analysis complete"
                    );
                    return Ok(result);
                }
                Err(err) => err,
            };

            let retryable = err.is_retryable();
            warn!(attempt = state.attempt_number, retryable, error = %err, "Analysis attempt failed");
            state.last_error = Some(err);

            if !retryable || state.attempt_number >= max_attempts {
                break;
            }

            let delay = backoff_delay(self.policy.base_delay, state.attempt_number);
            info!(
                next_attempt = state.attempt_number + 1,
                delay_ms = duration_to_ms(delay),
                "🔁 Retrying analysis"
            );
            self.sleeper.sleep(delay).await;
            state.attempt_number += 1;
        }

        let reason = state
            .last_error
            .map(|err| err.user_message())
            .unwrap_or_else(|| "Unknown analysis failure".to_string());
        error!(attempts = state.attempt_number, reason = %reason, "❌ Analysis failed, returning fallback result");
        Ok(AnalysisResult::fallback(&reason))
    }

    async fn attempt(&self, image: &[u8], mime_type: &str) -> std::result::Result<AnalysisResult, AnalysisError> {
        let timeout = self.policy.attempt_timeout;
        let text = race_deadline(self.client.analyze_image(image, mime_type), timeout)
            .await
            .map_err(|_| AnalysisError::Timeout(duration_to_ms(timeout)))??;
        parse_analysis(&text)
    }
}
