use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use url::Url;

use crate::client::{HttpClient, HttpMethod, HttpRequest, HttpResponse};
use crate::error::HttpError;

/// One backend: a base URL, an optional API key and the client to reach it.
#[derive(Clone)]
pub struct Endpoint {
  base: Url,
  api_key: Option<String>,
  client: Arc<dyn HttpClient>,
}

impl std::fmt::Debug for Endpoint {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Endpoint")
      .field("base", &self.base.as_str())
      .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
      .finish()
  }
}

impl Endpoint {
  pub fn new(base: &str, client: Arc<dyn HttpClient>) -> Result<Self, HttpError> {
    let base = Url::parse(base).map_err(|e| HttpError::InvalidUrl {
      url: base.to_string(),
      message: e.to_string(),
    })?;
    Ok(Self {
      base,
      api_key: None,
      client,
    })
  }

  pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
    self.api_key = Some(api_key.into());
    self
  }

  pub fn base(&self) -> &Url {
    &self.base
  }

  /// `POST {base}` with a JSON body.
  pub async fn post(&self, body: &Value) -> Result<Value, HttpError> {
    let request = self.request(HttpMethod::Post, self.base.clone(), Some(body.clone()));
    self.call(request).await
  }

  /// `GET {base}/{id}`.
  pub async fn get_child(&self, id: &str) -> Result<Value, HttpError> {
    let url = self.child_url(id)?;
    let request = self.request(HttpMethod::Get, url, None);
    self.call(request).await
  }

  /// Append one path segment, percent-encoding it.
  pub fn child_url(&self, id: &str) -> Result<Url, HttpError> {
    let mut url = self.base.clone();
    url
      .path_segments_mut()
      .map_err(|_| HttpError::InvalidUrl {
        url: self.base.to_string(),
        message: "url cannot be a base".to_string(),
      })?
      .pop_if_empty()
      .push(id);
    Ok(url)
  }

  fn request(&self, method: HttpMethod, url: Url, body: Option<Value>) -> HttpRequest {
    let mut headers = HashMap::new();
    if let Some(key) = &self.api_key {
      headers.insert("authorization".to_string(), format!("Bearer {}", key));
    }
    HttpRequest {
      method,
      url,
      headers,
      body,
    }
  }

  async fn call(&self, request: HttpRequest) -> Result<Value, HttpError> {
    let response = self.client.send(request).await?;
    into_body(response)
  }
}

/// Map a non-success response to [`HttpError::Status`], using the body's
/// `error` string as the message when there is one.
fn into_body(response: HttpResponse) -> Result<Value, HttpError> {
  if response.is_success() {
    return Ok(response.body);
  }

  let message = response
    .body
    .get("error")
    .and_then(Value::as_str)
    .map(str::to_string)
    .or_else(|| response.body.as_str().map(str::to_string))
    .unwrap_or_else(|| format!("request failed with status {}", response.status));

  Err(HttpError::Status {
    status: response.status,
    message,
    body: response.body,
  })
}
