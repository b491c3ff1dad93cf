//! Resilient HTTP client layer for the Power Platform administration APIs:
//! credential strategies, scope resolution, retrying request execution and
//! long-running operation polling.

pub mod api;
pub mod auth;
pub mod config;

pub use api::{
    ApiClient, ApiError, ApiRequest, ApiResponse, ErrorKind, OperationRecord, RequestContext,
    RequestMetadata,
};
pub use auth::{AuthError, CredentialProvider, CredentialStrategy, TokenCredential};
pub use config::{CloudType, ProviderConfig, ProviderCredentials};
