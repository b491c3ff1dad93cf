//! Assertion sources for workload identity federation.

use super::AuthError;
use super::strategy::AssertionSource;
use log::debug;
use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use serde::Deserialize;
use url::Url;

pub(crate) const TOKEN_EXCHANGE_AUDIENCE: &str = "api://AzureADTokenExchange";
const PIPELINE_API_VERSION: &str = "7.1";

#[derive(Debug, Deserialize)]
struct OidcResponse {
    value: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PipelineResponse {
    oidc_token: Option<String>,
}

pub(crate) async fn fetch_assertion(
    http: &reqwest::Client,
    source: &AssertionSource,
) -> Result<String, AuthError> {
    match source {
        AssertionSource::Static(token) => Ok(token.expose().to_string()),
        AssertionSource::File(path) => {
            let content = tokio::fs::read_to_string(path)
                .await
                .map_err(|source| AuthError::Io {
                    path: path.clone(),
                    source,
                })?;
            let assertion = content.trim();
            if assertion.is_empty() {
                return Err(AuthError::Assertion(format!("token file {:?} is empty", path)));
            }
            Ok(assertion.to_string())
        }
        AssertionSource::Request { url, token } => {
            let url = with_audience(url)?;
            debug!("Requesting OIDC assertion from {}", url);

            let response = http
                .get(url)
                .header(ACCEPT, "application/json")
                .header(AUTHORIZATION, format!("Bearer {}", token.expose()))
                .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
                .send()
                .await?;

            let status = response.status();
            let body = response.text().await?;
            if !status.is_success() {
                return Err(AuthError::TokenRequest {
                    status: status.as_u16(),
                    body,
                });
            }

            let parsed: OidcResponse = serde_json::from_str(&body)
                .map_err(|e| AuthError::Assertion(format!("cannot decode response: {}", e)))?;
            parsed
                .value
                .ok_or_else(|| AuthError::Assertion("no assertion received from OIDC provider".into()))
        }
    }
}

pub(crate) async fn fetch_pipeline_assertion(
    http: &reqwest::Client,
    request_url: &str,
    request_token: &str,
    service_connection_id: &str,
) -> Result<String, AuthError> {
    let separator = if request_url.contains('?') { '&' } else { '?' };
    let url = format!(
        "{}{}api-version={}&serviceConnectionId={}",
        request_url,
        separator,
        PIPELINE_API_VERSION,
        urlencoding::encode(service_connection_id)
    );

    debug!("Requesting pipeline OIDC token for service connection {}", service_connection_id);

    let response = http
        .post(&url)
        .header(ACCEPT, "application/json")
        .header(AUTHORIZATION, format!("Bearer {}", request_token))
        .header(CONTENT_TYPE, "application/json")
        .send()
        .await?;

    let status = response.status();
    let body = response.text().await?;
    if !status.is_success() {
        return Err(AuthError::TokenRequest {
            status: status.as_u16(),
            body,
        });
    }

    let parsed: PipelineResponse = serde_json::from_str(&body)
        .map_err(|e| AuthError::Assertion(format!("cannot decode pipeline response: {}", e)))?;
    parsed
        .oidc_token
        .filter(|t| !t.is_empty())
        .ok_or_else(|| AuthError::Assertion("pipeline response has no oidcToken".into()))
}

/// Adds `audience=api://AzureADTokenExchange` unless the URL already names one.
fn with_audience(raw: &str) -> Result<Url, AuthError> {
    let mut url = Url::parse(raw)
        .map_err(|e| AuthError::InvalidConfiguration(format!("invalid oidc request url: {}", e)))?;

    if !url.query_pairs().any(|(key, value)| key == "audience" && !value.is_empty()) {
        url.query_pairs_mut()
            .append_pair("audience", TOKEN_EXCHANGE_AUDIENCE);
    }
    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_audience_added_when_missing() {
        let url = with_audience("https://token.actions.example/req?api-version=2.0").unwrap();
        let audience = url
            .query_pairs()
            .find(|(k, _)| k == "audience")
            .map(|(_, v)| v.into_owned());
        assert_eq!(audience.as_deref(), Some(TOKEN_EXCHANGE_AUDIENCE));
    }

    #[test]
    fn test_existing_audience_kept() {
        let url = with_audience("https://token.actions.example/req?audience=custom").unwrap();
        let audiences: Vec<_> = url
            .query_pairs()
            .filter(|(k, _)| k == "audience")
            .map(|(_, v)| v.into_owned())
            .collect();
        assert_eq!(audiences, vec!["custom".to_string()]);
    }
}
