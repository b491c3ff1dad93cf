//! Confidential-client credential flow against the v2 token endpoint.

use super::AuthError;
use super::token::{AccessToken, lenient_u64};
use chrono::{Duration as ChronoDuration, Utc};
use log::debug;
use serde::Deserialize;

pub(crate) const JWT_BEARER_ASSERTION_TYPE: &str =
    "urn:ietf:params:oauth:client-assertion-type:jwt-bearer";

/// Advertises the `cp1` client capability so the service may issue CAE tokens.
const CAE_CLIENT_CAPABILITY_CLAIMS: &str = r#"{"access_token":{"xms_cc":{"values":["cp1"]}}}"#;

const MAX_TOKEN_LIFETIME_SECS: u64 = 24 * 60 * 60;

pub(crate) enum ClientAuth<'a> {
    Secret(&'a str),
    Assertion(&'a str),
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    #[serde(default, deserialize_with = "lenient_u64")]
    expires_in: Option<u64>,
}

pub(crate) fn token_endpoint(authority_host: &str, tenant_id: &str) -> String {
    format!(
        "{}/{}/oauth2/v2.0/token",
        authority_host.trim_end_matches('/'),
        tenant_id
    )
}

pub(crate) async fn request_token(
    http: &reqwest::Client,
    endpoint: &str,
    client_id: &str,
    scopes: &[String],
    auth: ClientAuth<'_>,
    enable_cae: bool,
) -> Result<AccessToken, AuthError> {
    let scope = scopes.join(" ");
    let mut form: Vec<(&str, &str)> = vec![
        ("grant_type", "client_credentials"),
        ("client_id", client_id),
        ("scope", &scope),
    ];

    match auth {
        ClientAuth::Secret(secret) => form.push(("client_secret", secret)),
        ClientAuth::Assertion(assertion) => {
            form.push(("client_assertion_type", JWT_BEARER_ASSERTION_TYPE));
            form.push(("client_assertion", assertion));
        }
    }

    if enable_cae {
        form.push(("claims", CAE_CLIENT_CAPABILITY_CLAIMS));
    }

    debug!("Requesting token from {} for scopes [{}]", endpoint, scope);

    let response = http.post(endpoint).form(&form).send().await?;
    let status = response.status();
    let body = response.text().await?;

    debug!("Token request status: {}", status);

    if !status.is_success() {
        return Err(AuthError::TokenRequest {
            status: status.as_u16(),
            body,
        });
    }

    parse_token_response(&body)
}

pub(crate) fn parse_token_response(body: &str) -> Result<AccessToken, AuthError> {
    let parsed: TokenResponse = serde_json::from_str(body)
        .map_err(|e| AuthError::MalformedTokenResponse(e.to_string()))?;

    let token = parsed
        .access_token
        .filter(|t| !t.is_empty())
        .ok_or_else(|| AuthError::MalformedTokenResponse("no access_token in response".into()))?;

    // Default to one hour when the endpoint omits a lifetime
    let expires_in = parsed.expires_in.unwrap_or(3600).min(MAX_TOKEN_LIFETIME_SECS);
    let expires_on = Utc::now() + ChronoDuration::seconds(expires_in as i64);

    Ok(AccessToken::new(token, expires_on))
}
