//! Outbound HTTP seam

use async_trait::async_trait;
use ipfetch_core::FetchError;
use ipfetch_http::{PreparedRequest, TransportResponse};
use std::time::Duration;

use crate::ConfigError;

/// Performs a single HTTP exchange
///
/// Implementations do no retrying and no status mapping; both happen in the
/// client. Only failures to complete the exchange are errors.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    async fn send(&self, request: PreparedRequest) -> Result<TransportResponse, FetchError>;
}

/// `reqwest`-backed transport owning the connection pool
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    /// Build a transport with a default timeout and redirect limit
    pub fn new(timeout: Duration, max_redirects: usize) -> Result<Self, ConfigError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::limited(max_redirects))
            .build()
            .map_err(|e| ConfigError::Transport(e.to_string()))?;
        Ok(Self { client })
    }

    /// Wrap an existing client
    pub fn from_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

fn map_error(error: reqwest::Error) -> FetchError {
    if error.is_timeout() {
        FetchError::Timeout(error.to_string())
    } else if error.is_builder() {
        FetchError::Validation(error.to_string())
    } else {
        FetchError::Transport(error.to_string())
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, request: PreparedRequest) -> Result<TransportResponse, FetchError> {
        let mut builder = self
            .client
            .request(request.method, request.url)
            .headers(request.headers);
        if let Some(body) = request.body {
            builder = builder.body(body);
        }
        if let Some(timeout) = request.timeout {
            builder = builder.timeout(timeout);
        }

        let response = builder.send().await.map_err(map_error)?;
        let status = response.status();
        let headers = response.headers().clone();
        let url = response.url().to_string();
        let body = response.bytes().await.map_err(map_error)?;

        Ok(TransportResponse {
            status,
            headers,
            body,
            url,
        })
    }
}
