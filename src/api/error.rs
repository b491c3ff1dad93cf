//! Typed failures surfaced by the request executor and the operation poller.

use crate::auth::AuthError;
use reqwest::StatusCode;
use reqwest::header::HeaderMap;
use thiserror::Error;

/// Coarse classification of an [`ApiError`], for callers that branch on the
/// kind of failure rather than its details.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Malformed or relative URL, or an initial response that cannot start polling.
    InputValidation,
    Authentication,
    UnexpectedStatus,
    PolicyViolation,
    Transport,
    Canceled,
    DeadlineExceeded,
    Decode,
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to build request: {0}")]
    Build(String),
    #[error("request failed: {0}")]
    Send(#[source] reqwest::Error),
    #[error("failed to read response body: {0}")]
    Body(#[source] reqwest::Error),
    #[error("{0}")]
    Other(String),
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("invalid url '{url}': {reason}")]
    UrlFormat { url: String, reason: String },

    #[error("authentication failed: {0}")]
    Auth(#[from] AuthError),

    #[error("unexpected HTTP status {status_text} (expected {expected:?})")]
    UnexpectedStatus {
        expected: Vec<u16>,
        status: StatusCode,
        status_text: String,
        body: Vec<u8>,
    },

    #[error("continuous access evaluation challenge: {message}")]
    PolicyViolation {
        message: String,
        status: StatusCode,
        headers: HeaderMap,
    },

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("operation was canceled")]
    Canceled,

    #[error("operation deadline exceeded")]
    DeadlineExceeded,

    #[error("failed to decode response body: {0}")]
    Decode(#[source] serde_json::Error),

    #[error("failed to encode request body: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("operation response has no status field")]
    OperationStatusMissing,

    #[error("response carries neither a location header nor a terminal status")]
    MissingOperationLocation,
}

impl ApiError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ApiError::UrlFormat { .. } | ApiError::Encode(_) | ApiError::MissingOperationLocation => {
                ErrorKind::InputValidation
            }
            ApiError::Auth(_) => ErrorKind::Authentication,
            ApiError::UnexpectedStatus { .. } => ErrorKind::UnexpectedStatus,
            ApiError::PolicyViolation { .. } => ErrorKind::PolicyViolation,
            ApiError::Transport(_) => ErrorKind::Transport,
            ApiError::Canceled => ErrorKind::Canceled,
            ApiError::DeadlineExceeded => ErrorKind::DeadlineExceeded,
            ApiError::Decode(_) | ApiError::OperationStatusMissing => ErrorKind::Decode,
        }
    }

    pub(crate) fn url_format(url: &str, reason: impl Into<String>) -> Self {
        ApiError::UrlFormat {
            url: url.to_string(),
            reason: reason.into(),
        }
    }

    /// Status code of the response that produced this error, if any.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            ApiError::UnexpectedStatus { status, .. } | ApiError::PolicyViolation { status, .. } => {
                Some(*status)
            }
            _ => None,
        }
    }

    /// Raw response body, lossily decoded, for unexpected-status failures.
    pub fn body_text(&self) -> Option<String> {
        match self {
            ApiError::UnexpectedStatus { body, .. } => Some(String::from_utf8_lossy(body).into_owned()),
            _ => None,
        }
    }
}
