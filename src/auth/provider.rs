//! The credential provider: one selected strategy, an optional cache, and the
//! explicit test-mode bypass.

use super::certificate::ClientCertificate;
use super::confidential::{self, ClientAuth};
use super::strategy::CredentialStrategy;
use super::token::{AccessToken, TokenCache};
use super::{AuthError, cli, federated, managed_identity};
use crate::config::ProviderConfig;
use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use log::{debug, info};
use std::sync::Arc;
use std::time::Duration;

/// Sentinel bearer token handed out in test mode.
pub const TEST_MODE_TOKEN: &str = "test_mode_mock_token_value";

/// Anything that can produce a bearer token for a set of scopes.
#[async_trait]
pub trait TokenCredential: Send + Sync {
    async fn get_token(&self, scopes: &[String]) -> Result<AccessToken, AuthError>;

    /// Drops any cached token for `scopes`, so the next call re-acquires.
    fn invalidate(&self, _scopes: &[String]) {}
}

pub struct CredentialProvider {
    // `None` only in test mode with no usable credentials.
    strategy: Option<CredentialStrategy>,
    http: reqwest::Client,
    authority_host: String,
    enable_cae: bool,
    test_mode: bool,
    cache: Option<Arc<TokenCache>>,
}

impl CredentialProvider {
    /// Selects the credential strategy for `config`. Fails when no strategy
    /// matches, unless the config is in test mode.
    pub fn new(config: &ProviderConfig) -> Result<Self, AuthError> {
        let strategy = match CredentialStrategy::select(&config.credentials) {
            Ok(strategy) => Some(strategy),
            Err(_) if config.is_test_mode() => None,
            Err(e) => return Err(e),
        };

        if let Some(strategy) = &strategy {
            info!("Using {} credentials", strategy);
        }

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self {
            strategy,
            http,
            authority_host: config.urls.authority_host.clone(),
            enable_cae: config.enable_cae,
            test_mode: config.is_test_mode(),
            cache: None,
        })
    }

    pub fn with_cache(mut self, cache: Arc<TokenCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn with_http_client(mut self, http: reqwest::Client) -> Self {
        self.http = http;
        self
    }

    pub fn strategy(&self) -> Option<&CredentialStrategy> {
        self.strategy.as_ref()
    }

    fn tenant_id(&self) -> &str {
        self.strategy.as_ref().map_or("", |s| s.tenant_id())
    }

    async fn acquire(&self, scopes: &[String]) -> Result<AccessToken, AuthError> {
        let strategy = self.strategy.as_ref().ok_or(AuthError::NoCredentials)?;
        debug!("Acquiring token via {} for [{}]", strategy, scopes.join(", "));

        match strategy {
            CredentialStrategy::ClientSecret {
                tenant_id,
                client_id,
                client_secret,
            } => {
                let endpoint = confidential::token_endpoint(&self.authority_host, tenant_id);
                confidential::request_token(
                    &self.http,
                    &endpoint,
                    client_id,
                    scopes,
                    ClientAuth::Secret(client_secret.expose()),
                    self.enable_cae,
                )
                .await
            }
            CredentialStrategy::AzureCli { tenant_id } => {
                cli::get_token(tenant_id.as_deref(), scopes).await
            }
            CredentialStrategy::Pipeline {
                tenant_id,
                client_id,
                service_connection_id,
                request_url,
                request_token,
            } => {
                let assertion = federated::fetch_pipeline_assertion(
                    &self.http,
                    request_url,
                    request_token.expose(),
                    service_connection_id,
                )
                .await?;
                self.exchange_assertion(tenant_id, client_id, scopes, &assertion)
                    .await
            }
            CredentialStrategy::Oidc {
                tenant_id,
                client_id,
                source,
            } => {
                let assertion = federated::fetch_assertion(&self.http, source).await?;
                self.exchange_assertion(tenant_id, client_id, scopes, &assertion)
                    .await
            }
            CredentialStrategy::ClientCertificate {
                tenant_id,
                client_id,
                certificate,
                password,
            } => {
                let certificate =
                    ClientCertificate::load(certificate, password.as_ref().map(|p| p.expose()))
                        .await?;
                let endpoint = confidential::token_endpoint(&self.authority_host, tenant_id);
                let assertion = certificate.assertion(client_id, &endpoint)?;
                self.exchange_assertion(tenant_id, client_id, scopes, &assertion)
                    .await
            }
            CredentialStrategy::UserManagedIdentity {
                client_id,
                endpoint,
            } => managed_identity::get_token(&self.http, endpoint, Some(client_id), scopes).await,
            CredentialStrategy::SystemManagedIdentity { endpoint } => {
                managed_identity::get_token(&self.http, endpoint, None, scopes).await
            }
        }
    }

    async fn exchange_assertion(
        &self,
        tenant_id: &str,
        client_id: &str,
        scopes: &[String],
        assertion: &str,
    ) -> Result<AccessToken, AuthError> {
        let endpoint = confidential::token_endpoint(&self.authority_host, tenant_id);
        confidential::request_token(
            &self.http,
            &endpoint,
            client_id,
            scopes,
            ClientAuth::Assertion(assertion),
            self.enable_cae,
        )
        .await
    }
}

#[async_trait]
impl TokenCredential for CredentialProvider {
    async fn get_token(&self, scopes: &[String]) -> Result<AccessToken, AuthError> {
        if self.test_mode {
            return Ok(AccessToken::new(
                TEST_MODE_TOKEN,
                Utc::now() + ChronoDuration::hours(1),
            ));
        }

        if let Some(cache) = &self.cache {
            if let Some(token) = cache.get(self.tenant_id(), scopes) {
                debug!("Using cached token for [{}]", scopes.join(", "));
                return Ok(token);
            }
        }

        let token = self.acquire(scopes).await?;
        debug!("Token acquired (expires: {}): **********", token.expires_on());

        if let Some(cache) = &self.cache {
            cache.insert(self.tenant_id(), scopes, token.clone());
        }
        Ok(token)
    }

    fn invalidate(&self, scopes: &[String]) {
        if let Some(cache) = &self.cache {
            cache.invalidate(self.tenant_id(), scopes);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProviderCredentials;

    #[tokio::test]
    async fn test_test_mode_returns_sentinel() {
        let config = ProviderConfig::default().with_test_mode();
        let provider = CredentialProvider::new(&config).unwrap();

        let token = provider
            .get_token(&["https://api.powerplatform.com/.default".to_string()])
            .await
            .unwrap();
        assert_eq!(token.secret(), TEST_MODE_TOKEN);
        assert!(provider.strategy().is_none());
    }

    #[test]
    fn test_no_credentials_outside_test_mode() {
        let err = CredentialProvider::new(&ProviderConfig::default()).err().unwrap();
        assert!(matches!(err, AuthError::NoCredentials));
    }

    #[test]
    fn test_strategy_exposed() {
        let config = ProviderConfig::default().with_credentials(ProviderCredentials {
            use_cli: true,
            ..Default::default()
        });
        let provider = CredentialProvider::new(&config).unwrap();
        assert_eq!(provider.strategy().map(|s| s.name()), Some("azure_cli"));
    }
}
