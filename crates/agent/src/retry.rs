//! Retry policies for completion queries.
//!
//! Two independent layers:
//! - [`RetryPolicy`]: exponential backoff with optional jitter around a whole
//!   attempt, for [`ErrorClass::Transient`] failures.
//! - [`ServiceRetryPolicy`]: a short linear backoff inside one attempt, for
//!   [`ErrorClass::Service`] failures.
//!
//! [`ErrorClass::Transient`]: gridparley_core::ErrorClass::Transient
//! [`ErrorClass::Service`]: gridparley_core::ErrorClass::Service

use std::time::Duration;
use gridparley_config::{RetryConfig, ServiceRetryConfig};
use rand::Rng;

/// Outer exponential backoff.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub initial_delay: Duration,
    pub exponential_base: f64,
    pub jitter: bool,
    pub max_retries: u32,
}

impl RetryPolicy {
    /// Delay before retry `attempt` (1-based):
    /// `initial × base^attempt`, scaled by `1 + U[0, 1)` when jitter is on.
    pub fn delay(&self, attempt: u32) -> Duration {
        let exp = i32::try_from(attempt).unwrap_or(i32::MAX);
        let mut secs = self.initial_delay.as_secs_f64() * self.exponential_base.powi(exp);
        if self.jitter {
            secs *= 1.0 + rand::rng().random::<f64>();
        }
        Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX)
    }

    /// Largest delay this policy can produce.
    pub fn max_delay(&self) -> Duration {
        let exp = i32::try_from(self.max_retries).unwrap_or(i32::MAX);
        let factor = if self.jitter { 2.0 } else { 1.0 };
        let secs = self.initial_delay.as_secs_f64() * self.exponential_base.powi(exp) * factor;
        Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX)
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            initial_delay: config.initial_delay(),
            exponential_base: config.exponential_base,
            jitter: config.jitter,
            max_retries: config.max_retries,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetryConfig::default())
    }
}

/// Inner linear backoff for server-side failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceRetryPolicy {
    pub max_retries: u32,
    pub backoff_step: Duration,
}

impl ServiceRetryPolicy {
    /// Delay before service retry `attempt` (1-based): `step × attempt`.
    pub fn delay(&self, attempt: u32) -> Duration {
        self.backoff_step.saturating_mul(attempt)
    }
}

impl From<&ServiceRetryConfig> for ServiceRetryPolicy {
    fn from(config: &ServiceRetryConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            backoff_step: Duration::from_secs(config.backoff_step_secs),
        }
    }
}

impl Default for ServiceRetryPolicy {
    fn default() -> Self {
        Self::from(&ServiceRetryConfig::default())
    }
}
