//! Time utility functions: clocks, deadlines and backoff

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use std::future::Future;
use std::time::Duration;

/// Get current timestamp
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Format timestamp as an ISO 8601 string with millisecond precision
pub fn format_timestamp(timestamp: DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Convert duration to milliseconds
pub fn duration_to_ms(duration: Duration) -> u64 {
    duration.as_millis() as u64
}

/// Exponential backoff delay before retry number `attempt` (1-based):
/// `base * 2^(attempt - 1)`.
pub fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    let exponent = attempt.saturating_sub(1).min(31);
    base.saturating_mul(1u32 << exponent)
}

/// Marker returned when the deadline fires before the operation settles
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeadlineElapsed;

/// Race `operation` against a timer; whichever settles first wins.
///
/// The losing branch is dropped, so a timed-out operation is cancelled at its
/// next suspension point.
pub async fn race_deadline<F, T>(operation: F, deadline: Duration) -> Result<T, DeadlineElapsed>
where
    F: Future<Output = T>,
{
    tokio::select! {
        output = operation => Ok(output),
        _ = tokio::time::sleep(deadline) => Err(DeadlineElapsed),
    }
}

/// Sleep abstraction so retry loops can be driven without real time passing
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// Sleeper backed by the tokio timer
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}
