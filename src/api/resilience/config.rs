//! Resilience configuration with builder pattern
//!
//! Bundles the retry window and the structured-logging switches with sane
//! defaults.

use super::retry::RetryConfig;
use std::time::Duration;

#[derive(Debug, Clone, Default)]
pub struct ResilienceConfig {
    pub retry: RetryConfig,
    pub monitoring: MonitoringConfig,
}

/// Monitoring and logging configuration
#[derive(Debug, Clone)]
pub struct MonitoringConfig {
    pub request_logging: bool,
    pub log_level: LogLevel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            request_logging: true,
            log_level: LogLevel::Info,
        }
    }
}

impl ResilienceConfig {
    pub fn builder() -> ResilienceConfigBuilder {
        ResilienceConfigBuilder::new()
    }
}

#[derive(Debug, Default)]
pub struct ResilienceConfigBuilder {
    config: ResilienceConfig,
}

impl ResilienceConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn retry_config(mut self, retry: RetryConfig) -> Self {
        self.config.retry = retry;
        self
    }

    /// Randomized wait used when the server sends no retry hint
    pub fn default_retry_window(mut self, min: Duration, max: Duration) -> Self {
        self.config.retry.min_delay = min;
        self.config.retry.max_delay = max;
        self
    }

    pub fn retryable_statuses(mut self, statuses: &[u16]) -> Self {
        self.config.retry.retryable_statuses = statuses.to_vec();
        self
    }

    pub fn monitoring_config(mut self, monitoring: MonitoringConfig) -> Self {
        self.config.monitoring = monitoring;
        self
    }

    pub fn request_logging(mut self, enabled: bool) -> Self {
        self.config.monitoring.request_logging = enabled;
        self
    }

    pub fn log_level(mut self, level: LogLevel) -> Self {
        self.config.monitoring.log_level = level;
        self
    }

    pub fn build(self) -> ResilienceConfig {
        self.config
    }
}
