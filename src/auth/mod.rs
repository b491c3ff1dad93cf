//! Credential strategies and bearer-token acquisition.

mod certificate;
mod cli;
mod confidential;
mod federated;
mod managed_identity;
pub mod provider;
pub mod strategy;
pub mod token;

pub use provider::{CredentialProvider, TEST_MODE_TOKEN, TokenCredential};
pub use strategy::{AssertionSource, CertificateSource, CredentialStrategy, Secret};
pub use token::{AccessToken, Clock, ManualClock, SystemClock, TokenCache};

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("no credential strategy matches the configuration")]
    NoCredentials,

    #[error("invalid credential configuration: {0}")]
    InvalidConfiguration(String),

    #[error("token endpoint returned HTTP {status}: {body}")]
    TokenRequest { status: u16, body: String },

    #[error("token request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("azure cli: {0}")]
    Cli(String),

    #[error("client certificate: {0}")]
    Certificate(String),

    #[error("client assertion: {0}")]
    Assertion(String),

    #[error("failed to read {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed token response: {0}")]
    MalformedTokenResponse(String),

    #[error("failed to sign client assertion: {0}")]
    Jwt(#[from] jsonwebtoken::errors::Error),
}
