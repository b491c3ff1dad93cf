//! Maps a target URL to the authorization scope needed to call it.

use super::error::ApiError;
use crate::config::{CloudUrls, PPAC_SCOPE};
use url::Url;

const ANALYTICS_HOST_MARKER: &str = "csanalytics";

/// Parses `raw` and rejects anything that is not an absolute URL with a host.
pub fn parse_absolute_url(raw: &str) -> Result<Url, ApiError> {
    let url = Url::parse(raw).map_err(|e| ApiError::url_format(raw, e.to_string()))?;
    if !url.has_host() {
        return Err(ApiError::url_format(raw, "URL has no host"));
    }
    Ok(url)
}

/// Resolves the scope for `raw_url` against the cloud tables in `urls`.
///
/// Host entries are matched as substrings of the full URL; an empty entry
/// never matches. URLs that match no table entry get `scheme://host/.default`.
pub fn resolve_scope(raw_url: &str, urls: &CloudUrls) -> Result<String, ApiError> {
    let url = parse_absolute_url(raw_url)?;
    let contains = |host: &str| !host.is_empty() && raw_url.contains(host);

    if contains(&urls.bapi_url) || contains(&urls.powerapps_url) {
        return Ok(urls.powerapps_scope.clone());
    }
    if contains(&urls.powerplatform_url) {
        return Ok(urls.powerplatform_scope.clone());
    }
    if contains(&urls.powerapps_advisor_url) {
        return Ok(urls.powerapps_advisor_scope.clone());
    }
    if contains(&urls.admin_powerplatform_url) {
        return Ok(PPAC_SCOPE.to_string());
    }
    if raw_url.contains(ANALYTICS_HOST_MARKER) && !urls.analytics_scope.is_empty() {
        return Ok(urls.analytics_scope.clone());
    }

    Ok(origin_scope(&url))
}

fn origin_scope(url: &Url) -> String {
    let host = url.host_str().unwrap_or_default();
    match url.port() {
        Some(port) => format!("{}://{}:{}/.default", url.scheme(), host, port),
        None => format!("{}://{}/.default", url.scheme(), host),
    }
}
