//! Managed identity tokens from the instance metadata service.

use super::AuthError;
use super::token::{AccessToken, lenient_u64};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use log::debug;
use serde::Deserialize;

const IMDS_API_VERSION: &str = "2018-02-01";

#[derive(Debug, Deserialize)]
struct ImdsToken {
    access_token: String,
    #[serde(default, deserialize_with = "lenient_u64")]
    expires_on: Option<u64>,
    #[serde(default, deserialize_with = "lenient_u64")]
    expires_in: Option<u64>,
}

/// IMDS speaks v1 resources, not v2 scopes.
pub(crate) fn scope_to_resource(scope: &str) -> &str {
    scope.strip_suffix("/.default").unwrap_or(scope)
}

pub(crate) async fn get_token(
    http: &reqwest::Client,
    endpoint: &str,
    client_id: Option<&str>,
    scopes: &[String],
) -> Result<AccessToken, AuthError> {
    let resource = match scopes {
        [scope] => scope_to_resource(scope),
        _ => {
            return Err(AuthError::InvalidConfiguration(format!(
                "managed identity requires exactly one scope, got {}",
                scopes.len()
            )));
        }
    };

    let mut query = vec![("api-version", IMDS_API_VERSION), ("resource", resource)];
    if let Some(client_id) = client_id {
        query.push(("client_id", client_id));
    }

    debug!("Requesting managed identity token for {}", resource);

    let response = http
        .get(endpoint)
        .query(&query)
        .header("Metadata", "true")
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

    let token: ImdsToken = serde_json::from_str(&body)
        .map_err(|e| AuthError::MalformedTokenResponse(e.to_string()))?;

    let expires_on = token
        .expires_on
        .and_then(|epoch| DateTime::from_timestamp(epoch as i64, 0))
        .or_else(|| {
            token
                .expires_in
                .map(|secs| Utc::now() + ChronoDuration::seconds(secs.min(86_400) as i64))
        })
        .unwrap_or_else(|| Utc::now() + ChronoDuration::hours(1));

    Ok(AccessToken::new(token.access_token, expires_on))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scope_to_resource() {
        assert_eq!(
            scope_to_resource("https://api.powerplatform.com/.default"),
            "https://api.powerplatform.com"
        );
        assert_eq!(
            scope_to_resource("065d9450-1e87-434e-ac2f-69af271549ed/.default"),
            "065d9450-1e87-434e-ac2f-69af271549ed"
        );
        assert_eq!(scope_to_resource("https://host"), "https://host");
    }
}
