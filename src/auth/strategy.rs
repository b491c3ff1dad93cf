//! Credential strategy selection.
//!
//! The configuration is inspected once, at session build time, and mapped to
//! exactly one [`CredentialStrategy`]. Precedence is fixed:
//! secret > CLI > pipeline > OIDC > certificate > user MI > system MI.

use super::AuthError;
use crate::config::ProviderCredentials;
use std::fmt;
use std::path::PathBuf;

/// A credential value that never shows up in `Debug` output.
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[REDACTED]")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CertificateSource {
    Inline(Secret),
    File(PathBuf),
}

/// Where a federated (OIDC) assertion comes from, in the order they are tried.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssertionSource {
    Static(Secret),
    File(PathBuf),
    Request { url: String, token: Secret },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CredentialStrategy {
    ClientSecret {
        tenant_id: String,
        client_id: String,
        client_secret: Secret,
    },
    AzureCli {
        tenant_id: Option<String>,
    },
    Pipeline {
        tenant_id: String,
        client_id: String,
        service_connection_id: String,
        request_url: String,
        request_token: Secret,
    },
    Oidc {
        tenant_id: String,
        client_id: String,
        source: AssertionSource,
    },
    ClientCertificate {
        tenant_id: String,
        client_id: String,
        certificate: CertificateSource,
        password: Option<Secret>,
    },
    UserManagedIdentity {
        client_id: String,
        endpoint: String,
    },
    SystemManagedIdentity {
        endpoint: String,
    },
}

impl CredentialStrategy {
    /// Picks the strategy for `creds`. Pure: no I/O, no environment access.
    pub fn select(creds: &ProviderCredentials) -> Result<Self, AuthError> {
        if creds.is_client_secret_provided() {
            return Ok(CredentialStrategy::ClientSecret {
                tenant_id: creds.tenant_id.clone(),
                client_id: creds.client_id.clone(),
                client_secret: Secret::new(&creds.client_secret),
            });
        }

        if creds.is_cli_provided() {
            return Ok(CredentialStrategy::AzureCli {
                tenant_id: non_empty(&creds.tenant_id),
            });
        }

        if creds.is_pipeline_provided() {
            let (tenant_id, client_id) = require_app_identity(creds, "pipeline")?;
            let request_url = require(&creds.oidc_request_url, "pipeline", "oidc_request_url")?;
            let request_token = require(&creds.oidc_request_token, "pipeline", "oidc_request_token")?;
            return Ok(CredentialStrategy::Pipeline {
                tenant_id,
                client_id,
                service_connection_id: creds.azdo_service_connection_id.clone(),
                request_url,
                request_token: Secret::new(request_token),
            });
        }

        if creds.is_oidc_provided() {
            let (tenant_id, client_id) = require_app_identity(creds, "oidc")?;
            let source = if !creds.oidc_token.is_empty() {
                AssertionSource::Static(Secret::new(&creds.oidc_token))
            } else if !creds.oidc_token_file_path.is_empty() {
                AssertionSource::File(PathBuf::from(&creds.oidc_token_file_path))
            } else if !creds.oidc_request_url.is_empty() && !creds.oidc_request_token.is_empty() {
                AssertionSource::Request {
                    url: creds.oidc_request_url.clone(),
                    token: Secret::new(&creds.oidc_request_token),
                }
            } else {
                return Err(AuthError::InvalidConfiguration(
                    "oidc requires a token, a token file, or a request url and request token".into(),
                ));
            };
            return Ok(CredentialStrategy::Oidc {
                tenant_id,
                client_id,
                source,
            });
        }

        if creds.is_client_certificate_provided() {
            let (tenant_id, client_id) = require_app_identity(creds, "client certificate")?;
            let certificate = if !creds.client_certificate.is_empty() {
                CertificateSource::Inline(Secret::new(&creds.client_certificate))
            } else {
                CertificateSource::File(PathBuf::from(&creds.client_certificate_file_path))
            };
            return Ok(CredentialStrategy::ClientCertificate {
                tenant_id,
                client_id,
                certificate,
                password: non_empty(&creds.client_certificate_password).map(Secret::new),
            });
        }

        if creds.is_user_managed_identity_provided() {
            return Ok(CredentialStrategy::UserManagedIdentity {
                client_id: creds.client_id.clone(),
                endpoint: creds.msi_endpoint().to_string(),
            });
        }

        if creds.is_system_managed_identity_provided() {
            return Ok(CredentialStrategy::SystemManagedIdentity {
                endpoint: creds.msi_endpoint().to_string(),
            });
        }

        // Partially filled secret fields are a configuration mistake, not an absence.
        if !creds.client_secret.is_empty() {
            return Err(AuthError::InvalidConfiguration(
                "client secret requires both tenant_id and client_id".into(),
            ));
        }

        Err(AuthError::NoCredentials)
    }

    pub fn name(&self) -> &'static str {
        match self {
            CredentialStrategy::ClientSecret { .. } => "client_secret",
            CredentialStrategy::AzureCli { .. } => "azure_cli",
            CredentialStrategy::Pipeline { .. } => "azure_devops_pipeline",
            CredentialStrategy::Oidc { .. } => "oidc",
            CredentialStrategy::ClientCertificate { .. } => "client_certificate",
            CredentialStrategy::UserManagedIdentity { .. } => "user_managed_identity",
            CredentialStrategy::SystemManagedIdentity { .. } => "system_managed_identity",
        }
    }

    /// Tenant used as part of the token cache key.
    pub fn tenant_id(&self) -> &str {
        match self {
            CredentialStrategy::ClientSecret { tenant_id, .. }
            | CredentialStrategy::Pipeline { tenant_id, .. }
            | CredentialStrategy::Oidc { tenant_id, .. }
            | CredentialStrategy::ClientCertificate { tenant_id, .. } => tenant_id,
            CredentialStrategy::AzureCli { tenant_id } => tenant_id.as_deref().unwrap_or(""),
            CredentialStrategy::UserManagedIdentity { .. }
            | CredentialStrategy::SystemManagedIdentity { .. } => "",
        }
    }
}

impl fmt::Display for CredentialStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

fn non_empty(value: &str) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

fn require(value: &str, strategy: &str, field: &str) -> Result<String, AuthError> {
    non_empty(value).ok_or_else(|| {
        AuthError::InvalidConfiguration(format!("{} requires {}", strategy, field))
    })
}

fn require_app_identity(
    creds: &ProviderCredentials,
    strategy: &str,
) -> Result<(String, String), AuthError> {
    Ok((
        require(&creds.tenant_id, strategy, "tenant_id")?,
        require(&creds.client_id, strategy, "client_id")?,
    ))
}
