use crate::config::AcquisitionConfig;
use crate::error::SensorError;
use std::time::Duration;
use tracing::{info, warn};

/// Recovery action to take after a sensor error
#[derive(Debug, Clone, PartialEq)]
pub enum RecoveryAction {
    /// Retry the capture after a delay
    RetryAfterDelay(Duration),
    /// Stop and restart streaming, then retry after a delay
    RestartStream(Duration),
    /// Tear the link down; the next cycle reconnects
    Teardown,
}

/// Recovery strategy configuration
#[derive(Debug, Clone)]
pub struct RecoveryConfig {
    /// Consecutive capture failures tolerated before teardown
    pub max_retries: u32,
    /// Delay between capture retries
    pub retry_delay: Duration,
    /// Base delay between reconnect attempts
    pub base_delay: Duration,
    /// Maximum delay between reconnect attempts
    pub max_delay: Duration,
    /// Whether to use exponential backoff for reconnects
    pub exponential_backoff: bool,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_delay: Duration::from_millis(100),
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(16),
            exponential_backoff: false,
        }
    }
}

impl From<&AcquisitionConfig> for RecoveryConfig {
    fn from(config: &AcquisitionConfig) -> Self {
        Self {
            max_retries: config.capture_retry_limit,
            retry_delay: config.capture_retry_delay(),
            base_delay: Duration::from_millis(config.reconnect_delay_ms),
            max_delay: Duration::from_millis(config.reconnect_max_delay_ms),
            exponential_backoff: config.exponential_backoff,
        }
    }
}

/// Decides how to recover from a failed capture, given the link's
/// consecutive failure count (including the failure being handled)
#[derive(Debug, Clone)]
pub struct CapturePolicy {
    config: RecoveryConfig,
}

impl CapturePolicy {
    pub fn new(config: RecoveryConfig) -> Self {
        Self { config }
    }

    /// Determine recovery action for a failed capture
    pub fn on_failure(&self, consecutive_failures: u32, error: &SensorError) -> RecoveryAction {
        if matches!(error, SensorError::Disconnected | SensorError::NotConnected) {
            warn!("Sensor link lost during capture: {}", error);
            return RecoveryAction::Teardown;
        }

        if consecutive_failures >= self.config.max_retries {
            warn!(
                "Capture failed {} times in a row ({}), tearing down sensor link",
                consecutive_failures, error
            );
            return RecoveryAction::Teardown;
        }

        info!(
            "Capture failed (attempt {}/{}): {}",
            consecutive_failures, self.config.max_retries, error
        );

        if error.needs_stream_restart() {
            RecoveryAction::RestartStream(self.config.retry_delay)
        } else {
            RecoveryAction::RetryAfterDelay(self.config.retry_delay)
        }
    }
}

/// Delay schedule for reconnect attempts
#[derive(Debug)]
pub struct ReconnectBackoff {
    config: RecoveryConfig,
    attempts: u32,
}

impl ReconnectBackoff {
    pub fn new(config: RecoveryConfig) -> Self {
        Self {
            config,
            attempts: 0,
        }
    }

    /// Record a failed attempt and return how long to wait before the next one
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.calculate_delay(self.attempts);
        self.attempts = self.attempts.saturating_add(1);
        delay
    }

    /// Reset after a successful reconnect
    pub fn reset(&mut self) {
        if self.attempts > 0 {
            info!(
                "Sensor reconnected after {} failed attempts",
                self.attempts
            );
        }
        self.attempts = 0;
    }

    /// Failed attempts since the last successful connect
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Calculate delay for retry with exponential backoff
    fn calculate_delay(&self, attempt: u32) -> Duration {
        if !self.config.exponential_backoff {
            return self.config.base_delay;
        }

        let factor = 2u32.saturating_pow(attempt.min(16));
        let delay = self.config.base_delay.saturating_mul(factor);

        if delay > self.config.max_delay {
            self.config.max_delay
        } else {
            delay
        }
    }
}

/// Counts successful cycles and signals when a link health check is due
#[derive(Debug)]
pub struct HealthCheck {
    every: u32,
    cycles: u32,
}

impl HealthCheck {
    /// `every == 0` disables the check
    pub fn new(every: u32) -> Self {
        Self { every, cycles: 0 }
    }

    /// Count one cycle; true when a check is due
    pub fn tick(&mut self) -> bool {
        if self.every == 0 {
            return false;
        }
        self.cycles += 1;
        if self.cycles >= self.every {
            self.cycles = 0;
            true
        } else {
            false
        }
    }
}
