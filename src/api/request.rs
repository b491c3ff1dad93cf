//! Request and response envelopes.

use super::error::ApiError;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Method, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

#[derive(Debug, Clone, Default, PartialEq)]
pub enum RequestBody {
    #[default]
    Empty,
    /// Sent verbatim.
    Raw(String),
    Json(Value),
}

impl RequestBody {
    /// Serialized payload, or `None` when nothing should be sent.
    pub fn to_bytes(&self) -> Result<Option<Vec<u8>>, ApiError> {
        match self {
            RequestBody::Empty => Ok(None),
            RequestBody::Raw(raw) => Ok(Some(raw.clone().into_bytes())),
            RequestBody::Json(value) => serde_json::to_vec(value).map(Some).map_err(ApiError::Encode),
        }
    }
}

/// A logical request: executed, and possibly retried, as one unit.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    pub url: String,
    /// Empty means the scope is resolved from the URL.
    pub scopes: Vec<String>,
    pub headers: HeaderMap,
    pub body: RequestBody,
    /// Empty means every status is acceptable.
    pub acceptable_statuses: Vec<u16>,
}

impl ApiRequest {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            scopes: Vec::new(),
            headers: HeaderMap::new(),
            body: RequestBody::Empty,
            acceptable_statuses: Vec::new(),
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::GET, url)
    }

    pub fn post(url: impl Into<String>) -> Self {
        Self::new(Method::POST, url)
    }

    pub fn put(url: impl Into<String>) -> Self {
        Self::new(Method::PUT, url)
    }

    pub fn patch(url: impl Into<String>) -> Self {
        Self::new(Method::PATCH, url)
    }

    pub fn delete(url: impl Into<String>) -> Self {
        Self::new(Method::DELETE, url)
    }

    pub fn scope(mut self, scope: impl Into<String>) -> Self {
        self.scopes.push(scope.into());
        self
    }

    pub fn scopes<I, S>(mut self, scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.scopes.extend(scopes.into_iter().map(Into::into));
        self
    }

    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn headers(mut self, headers: HeaderMap) -> Self {
        self.headers.extend(headers);
        self
    }

    pub fn raw_body(mut self, body: impl Into<String>) -> Self {
        self.body = RequestBody::Raw(body.into());
        self
    }

    pub fn json_body<T: Serialize>(mut self, body: &T) -> Result<Self, ApiError> {
        self.body = RequestBody::Json(serde_json::to_value(body).map_err(ApiError::Encode)?);
        Ok(self)
    }

    pub fn accept(mut self, statuses: &[u16]) -> Self {
        self.acceptable_statuses.extend_from_slice(statuses);
        self
    }

    pub fn is_acceptable(&self, status: StatusCode) -> bool {
        self.acceptable_statuses.is_empty() || self.acceptable_statuses.contains(&status.as_u16())
    }
}

/// Fully buffered response.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl ApiResponse {
    pub fn new(status: StatusCode, headers: HeaderMap, body: Vec<u8>) -> Self {
        Self {
            status,
            headers,
            body,
        }
    }

    /// Case-insensitive header lookup; `None` for absent or non-UTF-8 values.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, ApiError> {
        serde_json::from_slice(&self.body).map_err(ApiError::Decode)
    }

    /// Decodes the body into an existing target, replacing it wholesale.
    pub fn decode_into<T: DeserializeOwned>(&self, target: &mut T) -> Result<(), ApiError> {
        *target = self.decode()?;
        Ok(())
    }

    /// `"404 Not Found"` style status line.
    pub fn status_text(&self) -> String {
        match self.status.canonical_reason() {
            Some(reason) => format!("{} {}", self.status.as_u16(), reason),
            None => self.status.as_u16().to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, Default, Deserialize, PartialEq)]
    struct Environment {
        name: String,
        location: String,
        properties: Value,
    }

    #[test]
    fn test_empty_acceptable_set_accepts_everything() {
        let request = ApiRequest::get("https://host/x");
        assert!(request.is_acceptable(StatusCode::OK));
        assert!(request.is_acceptable(StatusCode::INTERNAL_SERVER_ERROR));

        let request = request.accept(&[200, 204]);
        assert!(request.is_acceptable(StatusCode::NO_CONTENT));
        assert!(!request.is_acceptable(StatusCode::ACCEPTED));
    }

    #[test]
    fn test_body_serialization() {
        assert_eq!(RequestBody::Empty.to_bytes().unwrap(), None);
        assert_eq!(
            RequestBody::Raw("{\"a\": 1 }".into()).to_bytes().unwrap(),
            Some(b"{\"a\": 1 }".to_vec())
        );
        assert_eq!(
            RequestBody::Json(json!({"a": 1})).to_bytes().unwrap(),
            Some(b"{\"a\":1}".to_vec())
        );
    }

    #[test]
    fn test_decode_into_two_targets_is_idempotent() {
        let response = ApiResponse::new(
            StatusCode::OK,
            HeaderMap::new(),
            br#"{"name":"env-1","location":"europe","properties":{"sku":"Sandbox"}}"#.to_vec(),
        );

        let mut first = Environment::default();
        let mut second = Environment::default();
        response.decode_into(&mut first).unwrap();
        response.decode_into(&mut second).unwrap();

        assert_eq!(first, second);
        assert_eq!(first.name, "env-1");
    }

    #[test]
    fn test_decode_failure() {
        let response = ApiResponse::new(StatusCode::OK, HeaderMap::new(), b"not json".to_vec());
        let mut target = Environment::default();
        let err = response.decode_into(&mut target).unwrap_err();
        assert!(matches!(err, ApiError::Decode(_)));
    }

    #[test]
    fn test_case_insensitive_header_lookup() {
        let mut headers = HeaderMap::new();
        headers.insert("operation-location", HeaderValue::from_static("https://host/op"));
        let response = ApiResponse::new(StatusCode::ACCEPTED, headers, Vec::new());

        assert_eq!(response.header("Operation-Location"), Some("https://host/op"));
        assert_eq!(response.status_text(), "202 Accepted");
    }
}
