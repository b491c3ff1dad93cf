//! Resilient HTTP client for the Power Platform administration APIs.
//!
//! [`ApiClient::execute`] is the single entry point for requests; it resolves
//! scopes, attaches tokens and telemetry, and absorbs transient failures.
//! [`ApiClient::poll_until_terminal`] follows long-running operations.

pub mod client;
pub mod constants;
pub mod error;
pub mod lifecycle;
pub mod request;
pub mod resilience;
pub mod scope;
pub mod telemetry;
pub mod transport;

pub use client::{ApiClient, cae_challenge};
pub use error::{ApiError, ErrorKind, TransportError};
pub use lifecycle::{OperationRecord, OperationState};
pub use request::{ApiRequest, ApiResponse, RequestBody};
pub use resilience::{
    ApiLogger, LogLevel, MonitoringConfig, ResilienceConfig, RetryConfig, RetryPolicy, RetryReason,
};
pub use scope::{parse_absolute_url, resolve_scope};
pub use telemetry::{RequestContext, RequestMetadata};
pub use transport::{HttpRequest, HttpTransport, ReqwestTransport};
