use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Exponential backoff with jitter, for actions that return retryable errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Backoff {
    pub initial_ms: u64,
    pub max_ms: u64,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            initial_ms: 1000,
            max_ms: 60_000,
        }
    }
}

impl Backoff {
    pub fn new(initial_ms: u64, max_ms: u64) -> Self {
        Self { initial_ms, max_ms }
    }

    /// Delay before attempt `attempt + 1`, without jitter.
    pub fn base_delay(&self, attempt: u32) -> Duration {
        let factor = 2u64.checked_pow(attempt).unwrap_or(u64::MAX);
        let ms = self.initial_ms.saturating_mul(factor).min(self.max_ms);
        Duration::from_millis(ms)
    }

    /// Delay with 0.8x to 1.2x jitter.
    pub fn delay(&self, attempt: u32) -> Duration {
        let ms = self.base_delay(attempt).as_millis() as f64;
        let jitter = 0.8 + rand::random::<f64>() * 0.4;
        Duration::from_millis((ms * jitter) as u64)
    }

    /// Wall-clock instant of the next attempt.
    pub fn next_wake(&self, attempt: u32) -> DateTime<Utc> {
        let delay = chrono::Duration::from_std(self.delay(attempt))
            .unwrap_or_else(|_| chrono::Duration::milliseconds(self.max_ms as i64));
        Utc::now() + delay
    }
}
