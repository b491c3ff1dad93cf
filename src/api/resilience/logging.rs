//! Structured logging with correlation tracking for API operations
//!
//! Every event is a JSON object carrying the correlation id of the logical
//! operation it belongs to, emitted through the `log` facade.

use super::config::{LogLevel, MonitoringConfig};
use super::retry::RetryReason;
use crate::api::telemetry::RequestContext;
use log::{debug, info, warn};
use reqwest::header::HeaderMap;
use serde_json::{Map, Value, json};
use std::time::Duration;

/// Structured logger for API operations with correlation tracking
#[derive(Debug, Clone, Default)]
pub struct ApiLogger {
    config: MonitoringConfig,
}

impl ApiLogger {
    pub fn new(config: MonitoringConfig) -> Self {
        Self { config }
    }

    /// Log HTTP request details
    pub fn log_request(
        &self,
        ctx: &RequestContext,
        attempt: u32,
        method: &str,
        url: &str,
        headers: &HeaderMap,
    ) {
        if !self.config.request_logging || !self.should_log(LogLevel::Debug) {
            return;
        }

        let log_data = json!({
            "event": "http_request",
            "correlation_id": ctx.correlation_id(),
            "attempt": attempt,
            "method": method,
            "url": url,
            "headers": self.sanitize_headers(headers),
            "timestamp": chrono::Utc::now().to_rfc3339()
        });

        debug!("HTTP Request: {}", log_data);
    }

    /// Log HTTP response details
    pub fn log_response(
        &self,
        ctx: &RequestContext,
        attempt: u32,
        status_code: u16,
        headers: &HeaderMap,
        duration: Duration,
    ) {
        if !self.config.request_logging || !self.should_log(LogLevel::Debug) {
            return;
        }

        let log_data = json!({
            "event": "http_response",
            "correlation_id": ctx.correlation_id(),
            "attempt": attempt,
            "status_code": status_code,
            "duration_ms": duration.as_millis(),
            "headers": self.sanitize_headers(headers),
            "timestamp": chrono::Utc::now().to_rfc3339()
        });

        if status_code >= 400 {
            warn!("HTTP Response (Error): {}", log_data);
        } else {
            debug!("HTTP Response: {}", log_data);
        }
    }

    /// Log a scheduled retry
    pub fn log_retry(&self, ctx: &RequestContext, attempt: u32, status_code: u16, delay: Duration) {
        if !self.should_log(LogLevel::Warn) {
            return;
        }

        warn!("Retry Scheduled: {}", retry_event(ctx, attempt, status_code, delay));
    }

    /// Log one poll of a long-running operation
    pub fn log_poll(
        &self,
        ctx: &RequestContext,
        poll: u32,
        status_code: u16,
        operation_status: Option<&str>,
        location: &str,
    ) {
        if !self.should_log(LogLevel::Info) {
            return;
        }

        let log_data = json!({
            "event": "operation_poll",
            "correlation_id": ctx.correlation_id(),
            "poll": poll,
            "status_code": status_code,
            "operation_status": operation_status,
            "location": location,
            "timestamp": chrono::Utc::now().to_rfc3339()
        });

        info!("Operation Poll: {}", log_data);
    }

    fn should_log(&self, level: LogLevel) -> bool {
        level <= self.config.log_level
    }

    /// Sanitize headers to remove sensitive information
    fn sanitize_headers(&self, headers: &HeaderMap) -> Value {
        let mut sanitized = Map::new();

        for (name, value) in headers {
            let key = name.as_str();
            let value = if key.contains("authorization") || key.contains("token") || key.contains("key") {
                "[REDACTED]".to_string()
            } else {
                value.to_str().unwrap_or("[binary]").to_string()
            };
            sanitized.insert(key.to_string(), Value::String(value));
        }

        Value::Object(sanitized)
    }
}

fn retry_event(ctx: &RequestContext, attempt: u32, status_code: u16, delay: Duration) -> Value {
    json!({
        "event": "retry_scheduled",
        "correlation_id": ctx.correlation_id(),
        "attempt": attempt,
        "status_code": status_code,
        "reason": RetryReason::from_status_code(status_code).as_str(),
        "delay_ms": delay.as_millis(),
        "timestamp": chrono::Utc::now().to_rfc3339()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    fn logger(level: LogLevel) -> ApiLogger {
        ApiLogger::new(MonitoringConfig {
            request_logging: true,
            log_level: level,
        })
    }

    #[test]
    fn test_header_sanitization() {
        let mut headers = HeaderMap::new();
        headers.insert("Authorization", HeaderValue::from_static("Bearer secret-token"));
        headers.insert("Content-Type", HeaderValue::from_static("application/json"));
        headers.insert("X-API-Key", HeaderValue::from_static("secret-key"));
        headers.insert("x-ms-client-token", HeaderValue::from_static("abc"));

        let sanitized = logger(LogLevel::Debug).sanitize_headers(&headers);

        assert_eq!(sanitized["authorization"], "[REDACTED]");
        assert_eq!(sanitized["content-type"], "application/json");
        assert_eq!(sanitized["x-api-key"], "[REDACTED]");
        assert_eq!(sanitized["x-ms-client-token"], "[REDACTED]");
        assert!(!sanitized.to_string().contains("secret"));
    }

    #[test]
    fn test_log_level_filtering() {
        let logger = logger(LogLevel::Warn);

        assert!(logger.should_log(LogLevel::Error));
        assert!(logger.should_log(LogLevel::Warn));
        assert!(!logger.should_log(LogLevel::Info));
        assert!(!logger.should_log(LogLevel::Debug));
        assert!(!logger.should_log(LogLevel::Trace));
    }

    #[test]
    fn test_trace_logs_everything() {
        let logger = logger(LogLevel::Trace);
        assert!(logger.should_log(LogLevel::Debug));
        assert!(logger.should_log(LogLevel::Error));
    }

    #[test]
    fn test_retry_event_carries_reason() {
        let ctx = RequestContext::unbounded().with_correlation_id("corr-1");

        let event = retry_event(&ctx, 2, 429, Duration::from_millis(1500));
        assert_eq!(event["event"], "retry_scheduled");
        assert_eq!(event["correlation_id"], "corr-1");
        assert_eq!(event["attempt"], 2);
        assert_eq!(event["reason"], "rate_limited");
        assert_eq!(event["delay_ms"], 1500);

        assert_eq!(retry_event(&ctx, 1, 503, Duration::ZERO)["reason"], "server_error");
        assert_eq!(retry_event(&ctx, 1, 409, Duration::ZERO)["reason"], "other");
    }
}
