// src/utils/retry.rs

//! Shared retry/backoff policy for page fetches and channel deliveries.

use std::time::Duration;

use rand::Rng;
use reqwest::header::{HeaderMap, RETRY_AFTER};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

/// How the delay grows between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Backoff {
    /// Same delay before every retry
    #[default]
    Fixed,
    /// `base * retry_number`
    Linear,
}

/// Retry policy injected into the fetch layer and notification channels.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,
    /// Base delay between attempts
    pub base_delay_ms: u64,
    pub backoff: Backoff,
    /// Upper bound of random jitter added to each delay
    pub jitter_ms: u64,
    /// Use the server's `Retry-After` when present
    pub honor_retry_after: bool,
    /// Wait applied on 429 when the server sends no `Retry-After`
    pub default_retry_after_ms: u64,
    /// Ceiling for any rate-limit wait, hinted or default
    pub max_retry_after_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            base_delay_ms: 600,
            backoff: Backoff::Fixed,
            jitter_ms: 0,
            honor_retry_after: true,
            default_retry_after_ms: 1000,
            max_retry_after_ms: 60_000,
        }
    }
}

impl RetryPolicy {
    /// Policy used by notification channels: three 429 retries, one second default wait.
    pub fn for_delivery() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 1000,
            ..Self::default()
        }
    }

    /// No waiting at all; handy for tests.
    pub fn immediate(max_retries: u32) -> Self {
        Self {
            max_retries,
            base_delay_ms: 0,
            backoff: Backoff::Fixed,
            jitter_ms: 0,
            honor_retry_after: false,
            default_retry_after_ms: 0,
            max_retry_after_ms: 0,
        }
    }

    /// Delay before retry number `retry` (1-based).
    pub fn delay_for(&self, retry: u32) -> Duration {
        let base = match self.backoff {
            Backoff::Fixed => self.base_delay_ms,
            Backoff::Linear => self.base_delay_ms.saturating_mul(u64::from(retry.max(1))),
        };
        Duration::from_millis(base + self.jitter())
    }

    /// Delay before retrying a rate-limited request, capped at `max_retry_after_ms`.
    pub fn rate_limit_delay(&self, headers: &HeaderMap) -> Duration {
        let hinted = if self.honor_retry_after {
            parse_retry_after(headers)
        } else {
            None
        };
        hinted
            .unwrap_or_else(|| Duration::from_millis(self.default_retry_after_ms))
            .min(Duration::from_millis(self.max_retry_after_ms))
    }

    fn jitter(&self) -> u64 {
        if self.jitter_ms == 0 {
            0
        } else {
            rand::rng().random_range(0..=self.jitter_ms)
        }
    }
}

/// Parse `Retry-After` as (possibly fractional) seconds.
///
/// Values that do not fit a `Duration` saturate to `Duration::MAX`;
/// negative, NaN and date forms are ignored.
pub fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    let raw = headers.get(RETRY_AFTER)?.to_str().ok()?.trim();
    let secs: f64 = raw.parse().ok()?;
    if secs.is_nan() || secs < 0.0 {
        return None;
    }
    Some(Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX))
}

/// Sleep unless cancelled first. Returns `false` when cancelled.
pub async fn sleep_or_cancel(delay: Duration, cancel: &CancellationToken) -> bool {
    if delay.is_zero() {
        return !cancel.is_cancelled();
    }
    tokio::select! {
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(delay) => true,
    }
}
