//! In-memory sliding-window rate limiter keyed by client and route class

use crate::config::RateLimitConfig;
use crate::rate_limit::policy::{RateLimitPolicy, RouteClass, RoutePolicies, MAX_WINDOW_MS};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use dashmap::DashMap;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Timestamps of requests from one client to one route class, oldest first
#[derive(Debug, Default, Clone)]
struct RateLimitEntry {
    request_timestamps: VecDeque<DateTime<Utc>>,
}

impl RateLimitEntry {
    /// Drop timestamps that have left the window ending at `now`
    fn prune(&mut self, now: DateTime<Utc>, policy: RateLimitPolicy) {
        let window = window(policy);
        while let Some(oldest) = self.request_timestamps.front() {
            if now - *oldest < window {
                break;
            }
            self.request_timestamps.pop_front();
        }
    }

    fn len(&self) -> usize {
        self.request_timestamps.len()
    }

    fn is_empty(&self) -> bool {
        self.request_timestamps.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct RateLimitKey {
    client_id: String,
    route_class: RouteClass,
}

/// Quota telemetry for an accepted request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Quota {
    pub route_class: RouteClass,
    pub limit: u32,
    pub remaining: u32,
    pub reset_at: DateTime<Utc>,
}

/// Details of a rejected request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
    pub route_class: RouteClass,
    pub limit: u32,
    pub retry_after_secs: u64,
    pub reset_at: DateTime<Utc>,
}

/// Outcome of an admission check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RateLimitDecision {
    /// Path bypasses the limiter entirely
    Exempt,
    Allowed(Quota),
    Limited(Rejection),
}

/// Per-client, per-route-class sliding-window limiter.
///
/// Each key is updated under its map shard's lock, so pruning, counting and
/// appending happen atomically with respect to concurrent requests for the
/// same key. Different keys never wait on each other beyond shard contention.
pub struct RateLimiter {
    policies: RoutePolicies,
    entries: Arc<DashMap<RateLimitKey, RateLimitEntry>>,
    sweep_interval: Duration,
    shutdown_tx: watch::Sender<bool>,
    sweep_task: Mutex<Option<JoinHandle<()>>>,
}

impl RateLimiter {
    /// Create a limiter with an empty table and no background sweep
    pub fn new(config: &RateLimitConfig) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            policies: RoutePolicies::from_config(config),
            entries: Arc::new(DashMap::new()),
            sweep_interval: Duration::from_secs(config.sweep_interval_secs),
            shutdown_tx,
            sweep_task: Mutex::new(None),
        }
    }

    /// Create a limiter and start its periodic sweep on the current runtime
    pub fn init(config: &RateLimitConfig) -> Self {
        let mut limiter = Self::new(config);
        let handle = tokio::spawn(run_sweeper(
            Arc::clone(&limiter.entries),
            limiter.policies,
            limiter.sweep_interval,
            limiter.shutdown_tx.subscribe(),
        ));
        limiter.sweep_task = Mutex::new(Some(handle));
        info!(
            interval_secs = limiter.sweep_interval.as_secs(),
            "🧹 Rate limit sweep started"
        );
        limiter
    }

    /// Stop the background sweep and wait for it to exit
    pub async fn shutdown(&self) {
        self.shutdown_tx.send_replace(true);
        if let Some(handle) = self.sweep_task.lock().await.take() {
            if let Err(e) = handle.await {
                debug!("Rate limit sweep ended abnormally: {}", e);
            }
        }
    }

    /// Number of tracked (client, route class) pairs
    pub fn tracked_keys(&self) -> usize {
        self.entries.len()
    }

    /// Admit or reject one request from `client_id` to `path` at `now`.
    /// Rejected attempts are not recorded.
    pub fn check_and_record(&self, client_id: &str, path: &str, now: DateTime<Utc>) -> RateLimitDecision {
        let Some(route_class) = RouteClass::classify(path) else {
            return RateLimitDecision::Exempt;
        };
        let policy = self.policies.policy_for(route_class);
        let key = RateLimitKey {
            client_id: client_id.to_string(),
            route_class,
        };

        let mut entry = self.entries.entry(key).or_default();
        entry.prune(now, policy);

        if entry.len() >= policy.max_requests as usize {
            // max_requests > 0, so the window holds at least one timestamp here
            let oldest = entry.request_timestamps.front().copied().unwrap_or(now);
            return RateLimitDecision::Limited(rejection(route_class, policy, oldest, now));
        }

        entry.request_timestamps.push_back(now);
        let used = entry.len() as u32;

        RateLimitDecision::Allowed(Quota {
            route_class,
            limit: policy.max_requests,
            remaining: policy.max_requests.saturating_sub(used),
            reset_at: window_end(now, policy),
        })
    }

    /// Prune every entry relative to `now` and drop the empty ones.
    /// Returns the number of entries removed.
    pub fn sweep(&self, now: DateTime<Utc>) -> usize {
        sweep_entries(&self.entries, &self.policies, now)
    }
}

/// Window length, clamped so date arithmetic stays in range for any policy
fn window(policy: RateLimitPolicy) -> ChronoDuration {
    ChronoDuration::milliseconds(policy.window_ms.min(MAX_WINDOW_MS) as i64)
}

fn window_end(start: DateTime<Utc>, policy: RateLimitPolicy) -> DateTime<Utc> {
    start.checked_add_signed(window(policy)).unwrap_or(start)
}

fn rejection(
    route_class: RouteClass,
    policy: RateLimitPolicy,
    oldest: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Rejection {
    let reset_at = window_end(oldest, policy);
    let wait_ms = (reset_at - now).num_milliseconds().max(0) as u64;
    Rejection {
        route_class,
        limit: policy.max_requests,
        retry_after_secs: wait_ms.div_ceil(1000),
        reset_at,
    }
}

fn sweep_entries(
    entries: &DashMap<RateLimitKey, RateLimitEntry>,
    policies: &RoutePolicies,
    now: DateTime<Utc>,
) -> usize {
    let keys: Vec<RateLimitKey> = entries.iter().map(|entry| entry.key().clone()).collect();

    let mut removed = 0;
    for key in keys {
        let Some(mut entry) = entries.get_mut(&key) else {
            continue;
        };
        entry.prune(now, policies.policy_for(key.route_class));
        let idle = entry.is_empty();
        drop(entry);

        if idle && entries.remove_if(&key, |_, entry| entry.is_empty()).is_some() {
            removed += 1;
        }
    }
    removed
}

async fn run_sweeper(
    entries: Arc<DashMap<RateLimitKey, RateLimitEntry>>,
    policies: RoutePolicies,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.tick().await; // Skip the immediate tick (no traffic yet)
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let removed = sweep_entries(&entries, &policies, Utc::now());
                debug!(removed, remaining = entries.len(), "Rate limit sweep complete");
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    debug!("Rate limit sweep stopping");
                    break;
                }
            }
        }
    }
}
