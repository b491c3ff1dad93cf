//! Retry policy and monitoring for API calls
//!
//! Provides the retry/backoff controller and the structured request logger
//! used by the executor and the operation poller.

pub mod config;
pub mod logging;
pub mod retry;

pub use config::{LogLevel, MonitoringConfig, ResilienceConfig, ResilienceConfigBuilder};
pub use logging::ApiLogger;
pub use retry::{RetryConfig, RetryPolicy, RetryReason, parse_retry_after};
