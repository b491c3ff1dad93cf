use super::constants::{cae, headers as names};
use super::error::ApiError;
use super::request::{ApiRequest, ApiResponse};
use super::resilience::{ApiLogger, ResilienceConfig, RetryPolicy};
use super::scope::{parse_absolute_url, resolve_scope};
use super::telemetry::{RequestContext, apply_telemetry_headers};
use super::transport::{HttpRequest, HttpTransport, ReqwestTransport};
use crate::auth::{AuthError, CredentialProvider, TokenCache, TokenCredential};
use crate::config::ProviderConfig;
use log::{debug, warn};
use reqwest::StatusCode;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Instant;

/// Request executor for the Power Platform APIs (cheap to clone)
#[derive(Clone)]
pub struct ApiClient {
    inner: Arc<ClientInner>,
}

#[derive(Clone)]
struct ClientInner {
    config: ProviderConfig,
    credential: Arc<dyn TokenCredential>,
    transport: Arc<dyn HttpTransport>,
    retry: RetryPolicy,
    logger: ApiLogger,
}

impl ApiClient {
    /// Builds a client with the configured credential strategy, a token
    /// cache and a pooled reqwest transport.
    pub fn new(config: ProviderConfig) -> Result<Self, ApiError> {
        let credential =
            CredentialProvider::new(&config)?.with_cache(Arc::new(TokenCache::default()));
        let transport = ReqwestTransport::new()?;
        Ok(Self::with_parts(config, Arc::new(credential), Arc::new(transport)))
    }

    /// Builds a client from explicit collaborators.
    pub fn with_parts(
        config: ProviderConfig,
        credential: Arc<dyn TokenCredential>,
        transport: Arc<dyn HttpTransport>,
    ) -> Self {
        let resilience = ResilienceConfig::default();
        Self {
            inner: Arc::new(ClientInner {
                config,
                credential,
                transport,
                retry: RetryPolicy::new(resilience.retry),
                logger: ApiLogger::new(resilience.monitoring),
            }),
        }
    }

    pub fn with_resilience(mut self, resilience: ResilienceConfig) -> Self {
        let inner = Arc::make_mut(&mut self.inner);
        inner.retry = RetryPolicy::new(resilience.retry);
        inner.logger = ApiLogger::new(resilience.monitoring);
        self
    }

    pub fn config(&self) -> &ProviderConfig {
        &self.inner.config
    }

    pub(crate) fn retry_policy(&self) -> &RetryPolicy {
        &self.inner.retry
    }

    pub(crate) fn logger(&self) -> &ApiLogger {
        &self.inner.logger
    }

    /// Fresh context bounded by the configured operation timeout.
    pub fn context(&self) -> RequestContext {
        RequestContext::for_config(&self.inner.config)
    }

    /// Scopes for `request`: the explicit ones, or the one resolved from its URL.
    pub fn resolve_scopes(&self, request: &ApiRequest) -> Result<Vec<String>, ApiError> {
        if request.scopes.is_empty() {
            Ok(vec![resolve_scope(&request.url, &self.inner.config.urls)?])
        } else {
            Ok(request.scopes.clone())
        }
    }

    /// Executes `request`, retrying retryable statuses until an acceptable
    /// response arrives, a non-retryable status is seen, or `ctx` gives up.
    pub async fn execute(
        &self,
        ctx: &RequestContext,
        request: ApiRequest,
    ) -> Result<ApiResponse, ApiError> {
        let inner = &self.inner;
        let url = parse_absolute_url(&request.url)?;
        let scopes = self.resolve_scopes(&request)?;
        let body = request.body.to_bytes()?;

        let mut attempt = 0u32;
        loop {
            attempt += 1;
            ctx.check()?;

            let token = ctx.guard(inner.credential.get_token(&scopes)).await??;
            let headers = self.build_headers(ctx, &request.headers, token.secret())?;

            inner.logger.log_request(
                ctx,
                attempt,
                request.method.as_str(),
                url.as_str(),
                &headers,
            );

            let started = Instant::now();
            let response = ctx
                .guard(inner.transport.send(HttpRequest {
                    method: request.method.clone(),
                    url: url.clone(),
                    headers,
                    body: body.clone(),
                }))
                .await??;

            inner.logger.log_response(
                ctx,
                attempt,
                response.status.as_u16(),
                &response.headers,
                started.elapsed(),
            );

            if request.is_acceptable(response.status) {
                return Ok(response);
            }

            if inner.config.enable_cae {
                if let Some(challenge) = cae_challenge(&response) {
                    warn!("Continuous access evaluation challenge for {}", url);
                    return Err(ApiError::PolicyViolation {
                        message: challenge,
                        status: response.status,
                        headers: response.headers,
                    });
                }
            }

            if !inner.retry.is_retryable(response.status) {
                return Err(ApiError::UnexpectedStatus {
                    expected: request.acceptable_statuses.clone(),
                    status: response.status,
                    status_text: response.status_text(),
                    body: response.body,
                });
            }

            if response.status == StatusCode::UNAUTHORIZED {
                debug!("Dropping cached token after 401");
                inner.credential.invalidate(&scopes);
            }

            let delay = inner.retry.wait_before_retry(&response);
            inner
                .logger
                .log_retry(ctx, attempt, response.status.as_u16(), delay);

            if !inner.config.is_test_mode() {
                ctx.sleep(delay).await?;
            }
        }
    }

    /// Executes `request` and decodes an acceptable response into `target`.
    pub async fn execute_into<T: DeserializeOwned>(
        &self,
        ctx: &RequestContext,
        request: ApiRequest,
        target: &mut T,
    ) -> Result<ApiResponse, ApiError> {
        let response = self.execute(ctx, request).await?;
        response.decode_into(target)?;
        Ok(response)
    }

    fn build_headers(
        &self,
        ctx: &RequestContext,
        base: &HeaderMap,
        token: &str,
    ) -> Result<HeaderMap, ApiError> {
        let mut headers = base.clone();

        if !headers.contains_key(CONTENT_TYPE) {
            headers.insert(CONTENT_TYPE, HeaderValue::from_static(names::CONTENT_TYPE_JSON));
        }

        if !headers.contains_key(AUTHORIZATION) {
            let mut value = HeaderValue::from_str(&format!("Bearer {}", token)).map_err(|_| {
                AuthError::MalformedTokenResponse("token is not a valid header value".into())
            })?;
            value.set_sensitive(true);
            headers.insert(AUTHORIZATION, value);
        }

        if !self.inner.config.telemetry_optout {
            apply_telemetry_headers(&mut headers, ctx, self.inner.config.partner_id.as_deref());
        }

        Ok(headers)
    }
}

/// The `WWW-Authenticate` value of a 401 continuous access evaluation
/// challenge, if `response` is one.
pub fn cae_challenge(response: &ApiResponse) -> Option<String> {
    if response.status != StatusCode::UNAUTHORIZED {
        return None;
    }
    response
        .headers
        .get_all(names::WWW_AUTHENTICATE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .find(|value| value.contains(cae::CLAIMS_MARKER) && value.contains(cae::INSUFFICIENT_CLAIMS))
        .map(str::to_string)
}
