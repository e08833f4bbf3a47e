use crate::types::constants::{BACKOFF_MAX, BACKOFF_MIN, BACKOFF_MULTIPLIER};
use std::time::Duration;

/// Reconnect backoff policy
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BackoffConfig {
    pub min: Duration,
    pub max: Duration,
    pub multiplier: f64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            min: Duration::from_millis(BACKOFF_MIN),
            max: Duration::from_millis(BACKOFF_MAX),
            multiplier: BACKOFF_MULTIPLIER,
        }
    }
}

/// Exponential backoff with a cap. Pure state; the connection manager reads
/// `current_delay` before each attempt and reports the outcome.
#[derive(Debug, Clone)]
pub struct BackoffController {
    config: BackoffConfig,
    current: Duration,
}

impl BackoffController {
    pub fn new(config: BackoffConfig) -> Self {
        Self {
            config,
            current: config.min,
        }
    }

    pub fn current_delay(&self) -> Duration {
        self.current
    }

    pub fn on_success(&mut self) {
        self.current = self.config.min;
    }

    pub fn on_failure(&mut self) {
        let next_ms = (self.current.as_millis() as f64 * self.config.multiplier).round();
        let next = Duration::from_millis(next_ms as u64);
        self.current = next.min(self.config.max);
    }
}

impl Default for BackoffController {
    fn default() -> Self {
        Self::new(BackoffConfig::default())
    }
}
