//! Sliding-window rate limiting.
//!
//! [`SlidingWindowCounter`] keeps the exact timestamps of recent requests per key and
//! prunes them lazily on access. [`RateLimiter`] layers three independent windows:
//! requests per IP per minute, per IP per hour, and per instance per minute.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use serde::Serialize;

use crate::config::RateLimitConfig;

/// Outcome of checking one key against a window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowCheck {
    Allowed,
    /// Rejected; whole seconds until the oldest request leaves the window (at least 1).
    Limited { retry_after: u64 },
}

/// Exact trailing-interval counter: `max` requests per `window`, per key.
#[derive(Debug)]
pub struct SlidingWindowCounter {
    max: usize,
    window: Duration,
    entries: Mutex<HashMap<String, VecDeque<Instant>>>,
}

impl SlidingWindowCounter {
    pub fn new(max: usize, window: Duration) -> Self {
        Self {
            max,
            window,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Check `key` at the current instant and record the request if it fits.
    pub fn check_and_record(&self, key: &str) -> WindowCheck {
        self.check_and_record_at(key, Instant::now())
    }

    /// Same as [`check_and_record`](Self::check_and_record) with an explicit clock.
    ///
    /// Rejected requests are never recorded.
    pub fn check_and_record_at(&self, key: &str, now: Instant) -> WindowCheck {
        let mut guard = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        let stamps = guard.entry(key.to_string()).or_default();
        prune(stamps, now, self.window);

        if stamps.len() >= self.max {
            let retry_after = stamps
                .front()
                .map(|oldest| (*oldest + self.window).saturating_duration_since(now))
                .unwrap_or(self.window);
            return WindowCheck::Limited {
                retry_after: ceil_secs(retry_after).max(1),
            };
        }

        stamps.push_back(now);
        WindowCheck::Allowed
    }

    /// Number of requests currently inside the window for `key`.
    #[cfg(test)]
    pub fn count_at(&self, key: &str, now: Instant) -> usize {
        let mut guard = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        guard
            .get_mut(key)
            .map(|stamps| {
                prune(stamps, now, self.window);
                stamps.len()
            })
            .unwrap_or(0)
    }

    /// Drop keys whose windows have fully drained. Returns how many were removed.
    pub fn sweep_at(&self, now: Instant) -> usize {
        let mut guard = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        let before = guard.len();
        guard.retain(|_, stamps| {
            prune(stamps, now, self.window);
            !stamps.is_empty()
        });
        before - guard.len()
    }

    pub fn key_count(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

fn prune(stamps: &mut VecDeque<Instant>, now: Instant, window: Duration) {
    while let Some(oldest) = stamps.front() {
        if now.saturating_duration_since(*oldest) >= window {
            stamps.pop_front();
        } else {
            break;
        }
    }
}

fn ceil_secs(d: Duration) -> u64 {
    let secs = d.as_secs();
    if d.subsec_nanos() > 0 {
        secs + 1
    } else {
        secs
    }
}

/// Which window rejected a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RateTier {
    IpMinute,
    IpHour,
    InstanceMinute,
}

impl RateTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::IpMinute => "ip_minute",
            Self::IpHour => "ip_hour",
            Self::InstanceMinute => "instance_minute",
        }
    }
}

impl fmt::Display for RateTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateDecision {
    pub allowed: bool,
    pub retry_after: Option<u64>,
    pub violated_tier: Option<RateTier>,
}

impl RateDecision {
    fn allowed() -> Self {
        Self {
            allowed: true,
            retry_after: None,
            violated_tier: None,
        }
    }

    fn limited(tier: RateTier, retry_after: u64) -> Self {
        Self {
            allowed: false,
            retry_after: Some(retry_after),
            violated_tier: Some(tier),
        }
    }
}

/// Three-tier limiter. Tiers are checked in order and a request is recorded into a
/// tier only after passing it, so the first violation short-circuits the rest.
#[derive(Debug)]
pub struct RateLimiter {
    ip_minute: SlidingWindowCounter,
    ip_hour: SlidingWindowCounter,
    instance_minute: SlidingWindowCounter,
}

impl RateLimiter {
    pub fn new(config: &RateLimitConfig) -> Self {
        Self {
            ip_minute: SlidingWindowCounter::new(config.ip_per_minute, Duration::from_secs(60)),
            ip_hour: SlidingWindowCounter::new(config.ip_per_hour, Duration::from_secs(3600)),
            instance_minute: SlidingWindowCounter::new(
                config.instance_per_minute,
                Duration::from_secs(60),
            ),
        }
    }

    pub fn check(&self, client_ip: &str, instance: &str) -> RateDecision {
        self.check_at(client_ip, instance, Instant::now())
    }

    pub fn check_at(&self, client_ip: &str, instance: &str, now: Instant) -> RateDecision {
        let ip_key = format!("ip:{client_ip}");
        let instance_key = format!("instance:{instance}");

        let tiers = [
            (RateTier::IpMinute, &self.ip_minute, &ip_key),
            (RateTier::IpHour, &self.ip_hour, &ip_key),
            (RateTier::InstanceMinute, &self.instance_minute, &instance_key),
        ];

        for (tier, counter, key) in tiers {
            if let WindowCheck::Limited { retry_after } = counter.check_and_record_at(key, now) {
                tracing::warn!(
                    client_ip,
                    instance,
                    tier = %tier,
                    retry_after,
                    "rate limit exceeded"
                );
                return RateDecision::limited(tier, retry_after);
            }
        }
        RateDecision::allowed()
    }

    /// Drop drained keys from every tier.
    pub fn sweep(&self) -> usize {
        let now = Instant::now();
        self.ip_minute.sweep_at(now) + self.ip_hour.sweep_at(now) + self.instance_minute.sweep_at(now)
    }

    /// Keys still holding timestamps across all tiers.
    pub fn tracked_keys(&self) -> usize {
        self.ip_minute.key_count() + self.ip_hour.key_count() + self.instance_minute.key_count()
    }
}
