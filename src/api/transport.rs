//! The HTTP round trip, behind a trait so the executor can be driven by fakes.

use super::error::TransportError;
use super::request::ApiResponse;
use async_trait::async_trait;
use reqwest::Method;
use reqwest::header::HeaderMap;
use std::time::Duration;
use url::Url;

/// One fully built attempt, ready to send.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: Option<Vec<u8>>,
}

#[async_trait]
pub trait HttpTransport: Send + Sync {
    /// Sends `request` and buffers the whole response body.
    async fn send(&self, request: HttpRequest) -> Result<ApiResponse, TransportError>;
}

/// [`HttpTransport`] over a pooled `reqwest::Client`.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new() -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .pool_max_idle_per_host(10)
            .pool_idle_timeout(Duration::from_secs(90))
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| TransportError::Build(e.to_string()))?;

        Ok(Self { client })
    }

    /// Wraps an existing client (cheap clone of the shared pool).
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(&self, request: HttpRequest) -> Result<ApiResponse, TransportError> {
        let mut builder = self
            .client
            .request(request.method, request.url)
            .headers(request.headers);
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let response = builder.send().await.map_err(TransportError::Send)?;
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.bytes().await.map_err(TransportError::Body)?;

        Ok(ApiResponse::new(status, headers, body.to_vec()))
    }
}
