use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method};
use serde_json::Value;
use url::Url;

use crate::error::HttpError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
  Get,
  Post,
}

/// An outgoing request with an optional JSON body.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
  pub method: HttpMethod,
  pub url: Url,
  pub headers: HashMap<String, String>,
  pub body: Option<Value>,
}

/// A response whose body has already been read.
///
/// Bodies that are not JSON are kept as a JSON string.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
  pub status: u16,
  pub body: Value,
}

impl HttpResponse {
  pub fn new(status: u16, body: Value) -> Self {
    Self { status, body }
  }

  pub fn is_success(&self) -> bool {
    (200..300).contains(&self.status)
  }
}

/// Sends requests to backends.
///
/// Non-success statuses are returned as responses, not errors; turning them
/// into failures is the caller's job.
#[async_trait]
pub trait HttpClient: Send + Sync {
  async fn send(&self, request: HttpRequest) -> Result<HttpResponse, HttpError>;
}

/// [`HttpClient`] backed by `reqwest` with a per-request timeout.
#[derive(Debug, Clone)]
pub struct ReqwestClient {
  client: Client,
  timeout: Duration,
}

impl ReqwestClient {
  pub fn new(timeout: Duration) -> Self {
    Self {
      client: Client::new(),
      timeout,
    }
  }
}

#[async_trait]
impl HttpClient for ReqwestClient {
  async fn send(&self, request: HttpRequest) -> Result<HttpResponse, HttpError> {
    let method = match request.method {
      HttpMethod::Get => Method::GET,
      HttpMethod::Post => Method::POST,
    };

    let mut builder = self
      .client
      .request(method, request.url.clone())
      .timeout(self.timeout);

    for (key, value) in &request.headers {
      builder = builder.header(key, value);
    }

    if let Some(body) = &request.body {
      builder = builder.json(body);
    }

    let response = builder.send().await?;
    let status = response.status().as_u16();
    let text = response.text().await?;

    tracing::debug!(url = %request.url, status, "backend responded");

    // Fall back to a string body for non-JSON payloads.
    let body = if text.is_empty() {
      Value::Null
    } else {
      serde_json::from_str(&text).unwrap_or(Value::String(text))
    };

    Ok(HttpResponse { status, body })
  }
}
