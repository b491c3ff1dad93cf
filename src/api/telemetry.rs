//! Per-call context (cancellation, deadline, telemetry metadata) and the
//! telemetry headers derived from it.

use super::constants::{PRODUCT_NAME, PRODUCT_VERSION, headers as names};
use super::error::ApiError;
use crate::config::ProviderConfig;
use log::warn;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, USER_AGENT};
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

const RUNTIME_NAME: &str = "rust";
// rustc that built the crate, captured by build.rs
const RUNTIME_VERSION: &str = env!("PPC_RUSTC_VERSION");

/// Names the caller-level object and action a request belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestMetadata {
    pub object_name: String,
    pub action: String,
}

impl RequestMetadata {
    pub fn new(object_name: impl Into<String>, action: impl Into<String>) -> Self {
        Self {
            object_name: object_name.into(),
            action: action.into(),
        }
    }
}

/// Everything one logical operation (a request with its retries, or a poll
/// sequence) carries through every suspension point.
#[derive(Debug, Clone)]
pub struct RequestContext {
    cancel: CancellationToken,
    deadline: Option<Instant>,
    metadata: Option<RequestMetadata>,
    correlation_id: String,
}

impl RequestContext {
    /// Context that gives up after `timeout`. A timeout too large to
    /// represent as an instant means no deadline.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            deadline: Instant::now().checked_add(timeout),
            ..Self::unbounded()
        }
    }

    /// Context bounded by the configured operation timeout.
    pub fn for_config(config: &ProviderConfig) -> Self {
        Self::with_timeout(config.operation_timeout)
    }

    /// No deadline at all: retries and polls continue until canceled.
    pub fn unbounded() -> Self {
        Self {
            cancel: CancellationToken::new(),
            deadline: None,
            metadata: None,
            correlation_id: uuid::Uuid::new_v4().to_string(),
        }
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn with_metadata(mut self, metadata: RequestMetadata) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = correlation_id.into();
        self
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn metadata(&self) -> Option<&RequestMetadata> {
        self.metadata.as_ref()
    }

    pub fn correlation_id(&self) -> &str {
        &self.correlation_id
    }

    /// Fails fast if the context is already canceled or past its deadline.
    pub fn check(&self) -> Result<(), ApiError> {
        if self.cancel.is_cancelled() {
            return Err(ApiError::Canceled);
        }
        if self.deadline.is_some_and(|deadline| Instant::now() >= deadline) {
            return Err(ApiError::DeadlineExceeded);
        }
        Ok(())
    }

    /// Runs `fut` unless cancellation or the deadline fires first.
    pub async fn guard<F: Future>(&self, fut: F) -> Result<F::Output, ApiError> {
        let deadline = async {
            match self.deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => std::future::pending().await,
            }
        };

        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(ApiError::Canceled),
            _ = deadline => Err(ApiError::DeadlineExceeded),
            output = fut => Ok(output),
        }
    }

    /// Interruptible sleep.
    pub async fn sleep(&self, duration: Duration) -> Result<(), ApiError> {
        self.guard(tokio::time::sleep(duration)).await
    }
}

/// `<product>/<version> (<os>; <arch>) <runtime>/<version>[ <object> <action>][ pid-<partner>]`
pub fn user_agent(metadata: Option<&RequestMetadata>, partner_id: Option<&str>) -> String {
    let mut agent = format!(
        "{}/{} ({}; {}) {}/{}",
        PRODUCT_NAME,
        PRODUCT_VERSION,
        std::env::consts::OS,
        std::env::consts::ARCH,
        RUNTIME_NAME,
        RUNTIME_VERSION
    );

    if let Some(metadata) = metadata {
        agent.push_str(&format!(" {} {}", metadata.object_name, metadata.action));
    }
    if let Some(partner_id) = partner_id.filter(|id| !id.is_empty()) {
        agent.push_str(&format!(" pid-{}", partner_id));
    }
    agent
}

/// `|<correlation id>.<16 hex>.`, fresh for every attempt.
pub fn request_id(correlation_id: &str) -> String {
    format!("|{}.{:016x}.", correlation_id, rand::random::<u64>())
}

pub fn correlation_context(metadata: &RequestMetadata) -> String {
    format!(
        "objectName={},requestType={}",
        metadata.object_name, metadata.action
    )
}

/// Sets the user agent and correlation headers for one attempt.
pub(crate) fn apply_telemetry_headers(
    headers: &mut HeaderMap,
    ctx: &RequestContext,
    partner_id: Option<&str>,
) {
    set_header(headers, USER_AGENT, &user_agent(ctx.metadata(), partner_id));
    set_header(
        headers,
        HeaderName::from_static(names::CORRELATION_ID),
        ctx.correlation_id(),
    );
    set_header(
        headers,
        HeaderName::from_static(names::REQUEST_ID),
        &request_id(ctx.correlation_id()),
    );
    if let Some(metadata) = ctx.metadata() {
        set_header(
            headers,
            HeaderName::from_static(names::CORRELATION_CONTEXT),
            &correlation_context(metadata),
        );
    }
}

fn set_header(headers: &mut HeaderMap, name: HeaderName, value: &str) {
    match HeaderValue::from_str(value) {
        Ok(value) => {
            headers.insert(name, value);
        }
        Err(_) => warn!("Skipping {} header with invalid value", name),
    }
}
