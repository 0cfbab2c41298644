//! Outbound HTTP plumbing for step functions.
//!
//! [`HttpTransport`] is the seam every API client goes through.
//! [`RetryTransport`] decorates any transport with exponential backoff on
//! server errors, so call sites never have to retry by hand.

mod retry;

pub use retry::{RetryPolicy, RetryTransport};

use async_trait::async_trait;
use reqwest::{Client, Request, RequestBuilder, Response};

use crate::config::HttpConfig;
use crate::errors::Result;

/// Executes HTTP requests.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    /// Sends one request and returns the raw response.
    async fn execute(&self, request: Request) -> reqwest::Result<Response>;

    /// Builds and sends a request.
    async fn send(&self, builder: RequestBuilder) -> reqwest::Result<Response> {
        let request = builder.build()?;
        self.execute(request).await
    }
}

/// Transport backed by a `reqwest::Client`.
#[derive(Debug, Clone, Default)]
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    /// Wraps an existing client.
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Builds a client with the configured request timeout.
    pub fn from_config(config: &HttpConfig) -> Result<Self> {
        let client = Client::builder().timeout(config.request_timeout()).build()?;
        Ok(Self::new(client))
    }

    /// Returns the underlying client, e.g. to create request builders.
    #[must_use]
    pub fn client(&self) -> &Client {
        &self.client
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn execute(&self, request: Request) -> reqwest::Result<Response> {
        self.client.execute(request).await
    }
}

/// Builds the retrying transport used by platform API clients.
pub fn build_transport(config: &HttpConfig) -> Result<RetryTransport<ReqwestTransport>> {
    let inner = ReqwestTransport::from_config(config)?;
    Ok(RetryTransport::new(inner, RetryPolicy::from_config(config)))
}
