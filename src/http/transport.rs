//! Outbound HTTP transport.

use super::request::{FanoutRequestSpec, HttpMethod, HttpResponse};
use anyhow::Context;
use async_trait::async_trait;
use std::time::Duration;

/// Sends a single request. Any received response, whatever its status, is `Ok`;
/// only transport-level failures are `Err`. The fan-out client applies the status
/// check.
#[async_trait]
pub trait HttpTransport: Send + Sync + 'static {
    async fn send(&self, request: &FanoutRequestSpec) -> anyhow::Result<HttpResponse>;
}

/// [`HttpTransport`] backed by a shared `reqwest` connection pool
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(default_timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(default_timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self { client }
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

fn to_reqwest_method(method: HttpMethod) -> reqwest::Method {
    match method {
        HttpMethod::Get => reqwest::Method::GET,
        HttpMethod::Post => reqwest::Method::POST,
        HttpMethod::Put => reqwest::Method::PUT,
        HttpMethod::Patch => reqwest::Method::PATCH,
        HttpMethod::Delete => reqwest::Method::DELETE,
        HttpMethod::Head => reqwest::Method::HEAD,
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(&self, request: &FanoutRequestSpec) -> anyhow::Result<HttpResponse> {
        let url = reqwest::Url::parse(&request.url)
            .with_context(|| format!("invalid request URL '{}'", request.url))?;

        let mut builder = self
            .client
            .request(to_reqwest_method(request.method), url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }
        if let Some(timeout) = request.timeout {
            builder = builder.timeout(timeout);
        }

        let response = builder
            .send()
            .await
            .with_context(|| format!("{} {} failed", request.method, request.url))?;
        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .with_context(|| format!("failed reading response body from {}", request.url))?;

        Ok(HttpResponse { status, body })
    }
}
