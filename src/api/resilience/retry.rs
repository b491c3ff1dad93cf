//! Retry decisions and backoff for the request executor
//!
//! A response with a retryable status is retried after the server's
//! `Retry-After` hint, or after a random wait in the default window when the
//! hint is missing or unparsable. There is no attempt ceiling here; the
//! caller's cancellation and deadline bound the loop.

use crate::api::constants::{
    DEFAULT_RETRY_MAX_SECS, DEFAULT_RETRY_MIN_SECS, RETRYABLE_STATUS_CODES, headers,
};
use crate::api::request::ApiResponse;
use chrono::{DateTime, Utc};
use log::debug;
use rand::Rng;
use reqwest::StatusCode;
use std::time::Duration;

/// Configuration for retry behavior
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub retryable_statuses: Vec<u16>,
    /// Lower bound of the randomized wait used without a server hint.
    pub min_delay: Duration,
    /// Exclusive upper bound of the randomized wait.
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            retryable_statuses: RETRYABLE_STATUS_CODES.to_vec(),
            min_delay: Duration::from_secs_f64(DEFAULT_RETRY_MIN_SECS),
            max_delay: Duration::from_secs_f64(DEFAULT_RETRY_MAX_SECS),
        }
    }
}

/// Why a status is (or is not) worth retrying
#[derive(Debug, Clone, PartialEq)]
pub enum RetryReason {
    /// HTTP 401, the token may have expired mid-flight
    Unauthorized,
    /// HTTP 408 Request Timeout
    Timeout,
    /// HTTP 425 Too Early
    TooEarly,
    /// HTTP 429 Too Many Requests
    RateLimited,
    /// HTTP 500, 502, 503, 504
    ServerError(u16),
    /// Outside the default retryable set; only retried when a custom set
    /// names it
    Other(u16),
}

impl RetryReason {
    pub fn should_retry(&self) -> bool {
        !matches!(self, RetryReason::Other(_))
    }

    /// Short label used in structured logs
    pub fn as_str(&self) -> &'static str {
        match self {
            RetryReason::Unauthorized => "unauthorized",
            RetryReason::Timeout => "timeout",
            RetryReason::TooEarly => "too_early",
            RetryReason::RateLimited => "rate_limited",
            RetryReason::ServerError(_) => "server_error",
            RetryReason::Other(_) => "other",
        }
    }

    /// Classify an HTTP status code against the default retryable set
    pub fn from_status_code(status: u16) -> Self {
        match status {
            401 => RetryReason::Unauthorized,
            408 => RetryReason::Timeout,
            425 => RetryReason::TooEarly,
            429 => RetryReason::RateLimited,
            500 | 502 | 503 | 504 => RetryReason::ServerError(status),
            _ => RetryReason::Other(status),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct RetryPolicy {
    config: RetryConfig,
}

impl RetryPolicy {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    pub fn is_retryable(&self, status: StatusCode) -> bool {
        self.config.retryable_statuses.contains(&status.as_u16())
    }

    /// How long to wait before retrying after `response`.
    pub fn wait_before_retry(&self, response: &ApiResponse) -> Duration {
        let hint = response.header(headers::RETRY_AFTER);
        debug!("Retry-After header: {:?}", hint);

        hint.and_then(|value| parse_retry_after(value, Utc::now()))
            .unwrap_or_else(|| self.default_delay())
    }

    /// Uniformly random wait in `[min_delay, max_delay)`
    pub fn default_delay(&self) -> Duration {
        let min = self.config.min_delay.as_secs_f64();
        let max = self.config.max_delay.as_secs_f64();
        if max <= min {
            return self.config.min_delay;
        }
        Duration::from_secs_f64(rand::rng().random_range(min..max))
    }
}

/// Parses a `Retry-After` value: seconds (`"3"`, `"1.5"`), unit durations
/// (`"500ms"`, `"1m30s"`), or an HTTP date. Dates in the past yield zero.
pub fn parse_retry_after(value: &str, now: DateTime<Utc>) -> Option<Duration> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }

    if let Ok(seconds) = value.parse::<f64>() {
        return if seconds >= 0.0 {
            Duration::try_from_secs_f64(seconds).ok()
        } else {
            None
        };
    }

    if let Some(duration) = parse_unit_duration(value) {
        return Some(duration);
    }

    let date = DateTime::parse_from_rfc2822(value).ok()?;
    let remaining = date.with_timezone(&Utc) - now;
    Some(remaining.to_std().unwrap_or(Duration::ZERO))
}

fn parse_unit_duration(value: &str) -> Option<Duration> {
    let is_number = |c: char| c.is_ascii_digit() || c == '.';
    let mut rest = value;
    let mut total = 0.0;

    while !rest.is_empty() {
        let number_end = rest.find(|c: char| !is_number(c)).unwrap_or(rest.len());
        if number_end == 0 {
            return None;
        }
        let number: f64 = rest[..number_end].parse().ok()?;
        rest = &rest[number_end..];

        let unit_end = rest.find(is_number).unwrap_or(rest.len());
        let factor = match &rest[..unit_end] {
            "ns" => 1e-9,
            "us" | "µs" => 1e-6,
            "ms" => 1e-3,
            "s" => 1.0,
            "m" => 60.0,
            "h" => 3600.0,
            _ => return None,
        };
        total += number * factor;
        rest = &rest[unit_end..];
    }

    Duration::try_from_secs_f64(total).ok()
}
