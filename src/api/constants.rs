//! Wire-level constants shared by the executor, retry controller and poller.

/// Product token at the start of the user agent.
pub const PRODUCT_NAME: &str = "powerplatform-client";

pub const PRODUCT_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Statuses that trigger a retry of the same logical request.
pub const RETRYABLE_STATUS_CODES: [u16; 8] = [401, 408, 425, 429, 500, 502, 503, 504];

/// Default retry window, in seconds, when the server gives no hint.
pub const DEFAULT_RETRY_MIN_SECS: f64 = 5.0;
pub const DEFAULT_RETRY_MAX_SECS: f64 = 10.0;

/// Terminal states of a long-running operation.
pub mod operation {
    pub const SUCCEEDED: &str = "Succeeded";
    pub const FAILED: &str = "Failed";

    pub const POLL_ACCEPTED_STATUSES: [u16; 2] = [200, 409];
}

pub mod headers {
    pub const CONTENT_TYPE_JSON: &str = "application/json";

    pub const RETRY_AFTER: &str = "Retry-After";
    pub const LOCATION: &str = "Location";
    pub const OPERATION_LOCATION: &str = "Operation-Location";
    pub const WWW_AUTHENTICATE: &str = "WWW-Authenticate";

    // Lowercase so they can be used with `HeaderName::from_static`
    pub const CORRELATION_ID: &str = "x-ms-correlation-id";
    pub const REQUEST_ID: &str = "request-id";
    pub const CORRELATION_CONTEXT: &str = "correlation-context";
}

/// Markers of a continuous access evaluation challenge in `WWW-Authenticate`.
pub mod cae {
    pub const CLAIMS_MARKER: &str = "claims=";
    pub const INSUFFICIENT_CLAIMS: &str = "insufficient_claims";
}
