//! Reconnect policies for the control connection
//!
//! The channel asks its policy after every unexpected close. The default
//! policy never reconnects.

use crate::config::ReconnectConfig;
use crate::error::TransportError;
use std::time::Duration;

/// Decides whether and when to reopen a closed control connection
pub trait ReconnectPolicy: Send {
    /// `attempt` starts at 1 for the first retry after a close.
    /// Returns the delay before reconnecting, or `None` to give up.
    fn should_reconnect(&mut self, attempt: u32, last_error: Option<&TransportError>) -> Option<Duration>;
}

/// Leaves the connection closed
#[derive(Debug, Default, Clone, Copy)]
pub struct NeverReconnect;

impl ReconnectPolicy for NeverReconnect {
    fn should_reconnect(&mut self, _attempt: u32, _last_error: Option<&TransportError>) -> Option<Duration> {
        None
    }
}

/// Exponential backoff with a delay cap and an optional attempt limit
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    pub initial: Duration,
    pub max: Duration,
    pub multiplier: f64,
    /// 0 means unlimited
    pub max_attempts: u32,
}

impl ExponentialBackoff {
    pub fn from_config(config: &ReconnectConfig) -> Self {
        Self {
            initial: Duration::from_millis(config.initial_delay_ms),
            max: Duration::from_millis(config.max_delay_ms),
            multiplier: config.multiplier,
            max_attempts: config.max_attempts,
        }
    }

    fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(63) as i32;
        let millis = self.initial.as_millis() as f64 * self.multiplier.powi(exponent);
        let capped = millis.min(self.max.as_millis() as f64);
        Duration::from_millis(capped as u64)
    }
}

impl ReconnectPolicy for ExponentialBackoff {
    fn should_reconnect(&mut self, attempt: u32, last_error: Option<&TransportError>) -> Option<Duration> {
        if self.max_attempts != 0 && attempt > self.max_attempts {
            return None;
        }
        if let Some(err) = last_error {
            if !err.is_retryable() {
                return None;
            }
        }
        Some(self.delay_for(attempt))
    }
}

/// Build the policy selected by configuration
pub fn policy_from_config(config: &ReconnectConfig) -> Box<dyn ReconnectPolicy> {
    if config.enabled {
        Box::new(ExponentialBackoff::from_config(config))
    } else {
        Box::new(NeverReconnect)
    }
}
