//! Shared fakes for the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use powerplatform_client::api::{
    ApiClient, ApiResponse, HttpRequest, HttpTransport, ResilienceConfig, TransportError,
};
use powerplatform_client::auth::{AccessToken, AuthError, TokenCredential};
use powerplatform_client::config::{CloudType, ProviderConfig};
use reqwest::StatusCode;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const BAPI_URL: &str =
    "https://api.bap.microsoft.com/providers/Microsoft.BusinessAppPlatform/environments";

pub fn response(status: u16, body: &str) -> ApiResponse {
    ApiResponse::new(
        StatusCode::from_u16(status).unwrap(),
        HeaderMap::new(),
        body.as_bytes().to_vec(),
    )
}

pub fn response_with_headers(status: u16, headers: &[(&str, &str)], body: &str) -> ApiResponse {
    let mut map = HeaderMap::new();
    for (name, value) in headers {
        map.append(
            HeaderName::from_bytes(name.as_bytes()).unwrap(),
            HeaderValue::from_str(value).unwrap(),
        );
    }
    ApiResponse::new(StatusCode::from_u16(status).unwrap(), map, body.as_bytes().to_vec())
}

/// Replays canned responses in order; the last one repeats forever.
#[derive(Default)]
pub struct FakeTransport {
    responses: Mutex<VecDeque<ApiResponse>>,
    requests: Mutex<Vec<HttpRequest>>,
    calls: AtomicUsize,
}

impl FakeTransport {
    pub fn new(responses: Vec<ApiResponse>) -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(responses.into()),
            ..Self::default()
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl HttpTransport for FakeTransport {
    async fn send(&self, request: HttpRequest) -> Result<ApiResponse, TransportError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request);

        let mut responses = self.responses.lock().unwrap();
        let next = if responses.len() > 1 {
            responses.pop_front()
        } else {
            responses.front().cloned()
        };
        next.ok_or_else(|| TransportError::Other("no canned response".into()))
    }
}

/// Hands out numbered tokens and counts acquisitions and invalidations.
#[derive(Default)]
pub struct CountingCredential {
    acquisitions: AtomicUsize,
    invalidations: AtomicUsize,
    scopes: Mutex<Vec<Vec<String>>>,
}

impl CountingCredential {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn acquisitions(&self) -> usize {
        self.acquisitions.load(Ordering::SeqCst)
    }

    pub fn invalidations(&self) -> usize {
        self.invalidations.load(Ordering::SeqCst)
    }

    pub fn scopes(&self) -> Vec<Vec<String>> {
        self.scopes.lock().unwrap().clone()
    }
}

#[async_trait]
impl TokenCredential for CountingCredential {
    async fn get_token(&self, scopes: &[String]) -> Result<AccessToken, AuthError> {
        let n = self.acquisitions.fetch_add(1, Ordering::SeqCst) + 1;
        self.scopes.lock().unwrap().push(scopes.to_vec());
        Ok(AccessToken::new(
            format!("token-{}", n),
            Utc::now() + ChronoDuration::hours(1),
        ))
    }

    fn invalidate(&self, _scopes: &[String]) {
        self.invalidations.fetch_add(1, Ordering::SeqCst);
    }
}

/// Test-mode config: retry and poll sleeps are skipped.
pub fn test_config() -> ProviderConfig {
    ProviderConfig::new(CloudType::Public).with_test_mode()
}

pub fn client(
    config: ProviderConfig,
    credential: Arc<CountingCredential>,
    transport: Arc<FakeTransport>,
) -> ApiClient {
    ApiClient::with_parts(config, credential, transport).with_resilience(
        ResilienceConfig::builder()
            .default_retry_window(Duration::from_millis(5), Duration::from_millis(10))
            .build(),
    )
}
