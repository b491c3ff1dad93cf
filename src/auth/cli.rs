//! Tokens from a signed-in Azure CLI session.

use super::AuthError;
use super::token::{AccessToken, lenient_u64};
use chrono::{DateTime, Duration as ChronoDuration, Local, NaiveDateTime, TimeZone, Utc};
use log::debug;
use serde::Deserialize;
use std::path::Path;
use tokio::process::Command;

const AZ_PROGRAM: &str = "az";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CliToken {
    access_token: String,
    expires_on: Option<String>,
    #[serde(rename = "expires_on", default, deserialize_with = "lenient_u64")]
    expires_on_epoch: Option<u64>,
}

pub(crate) async fn get_token(
    tenant_id: Option<&str>,
    scopes: &[String],
) -> Result<AccessToken, AuthError> {
    get_token_from(Path::new(AZ_PROGRAM), tenant_id, scopes).await
}

async fn get_token_from(
    program: &Path,
    tenant_id: Option<&str>,
    scopes: &[String],
) -> Result<AccessToken, AuthError> {
    let scope = match scopes {
        [scope] => scope,
        _ => {
            return Err(AuthError::Cli(format!(
                "exactly one scope is required, got {}",
                scopes.len()
            )));
        }
    };

    let mut command = Command::new(program);
    command.args(["account", "get-access-token", "--output", "json", "--scope", scope]);
    if let Some(tenant) = tenant_id {
        command.args(["--tenant", tenant]);
    }

    debug!("Requesting token from azure cli for scope {}", scope);

    let output = command
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|e| AuthError::Cli(format!("failed to run '{}': {}", program.display(), e)))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(AuthError::Cli(stderr.trim().to_string()));
    }

    parse_cli_output(&output.stdout)
}

pub(crate) fn parse_cli_output(stdout: &[u8]) -> Result<AccessToken, AuthError> {
    let token: CliToken = serde_json::from_slice(stdout)
        .map_err(|e| AuthError::MalformedTokenResponse(e.to_string()))?;

    let expires_on = match (token.expires_on_epoch, token.expires_on.as_deref()) {
        (Some(epoch), _) => DateTime::from_timestamp(epoch as i64, 0),
        (None, Some(local)) => parse_local_time(local),
        (None, None) => None,
    }
    .unwrap_or_else(|| Utc::now() + ChronoDuration::hours(1));

    Ok(AccessToken::new(token.access_token, expires_on))
}

/// `expiresOn` is printed in the machine's local time zone without an offset.
fn parse_local_time(value: &str) -> Option<DateTime<Utc>> {
    let naive = NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S%.f").ok()?;
    Local
        .from_local_datetime(&naive)
        .earliest()
        .map(|local| local.with_timezone(&Utc))
}
