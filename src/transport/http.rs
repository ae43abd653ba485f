//! HTTP transport posting GraphQL requests as JSON.

use futures::future::BoxFuture;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;
use url::Url;

use super::{Transport, TransportError};
use crate::Variables;

#[derive(Serialize)]
struct RequestBody<'a> {
  query: &'a str,
  variables: &'a Variables,
}

#[derive(Debug, Default, Deserialize)]
struct ResponseBody {
  #[serde(default)]
  data: Option<Value>,
  #[serde(default)]
  errors: Vec<ResponseError>,
}

#[derive(Debug, Deserialize)]
struct ResponseError {
  message: String,
}

/// Transport that POSTs `{"query", "variables"}` to a GraphQL endpoint.
#[derive(Clone, Debug)]
pub struct HttpTransport {
  client: reqwest::Client,
  url: Url,
  headers: HeaderMap,
}

impl HttpTransport {
  pub fn new(url: &str) -> Result<Self, TransportError> {
    let url =
      Url::parse(url).map_err(|e| TransportError::with_source(format!("Invalid URL {url}"), e))?;

    let client = reqwest::Client::builder()
      .build()
      .map_err(|e| TransportError::with_source("Failed to create HTTP client", e))?;

    Ok(Self {
      client,
      url,
      headers: HeaderMap::new(),
    })
  }

  /// Add a header sent with every request.
  pub fn with_header(mut self, name: &str, value: &str) -> Result<Self, TransportError> {
    let name = HeaderName::from_bytes(name.as_bytes())
      .map_err(|e| TransportError::with_source(format!("Invalid header name {name}"), e))?;
    let value = HeaderValue::from_str(value)
      .map_err(|e| TransportError::with_source(format!("Invalid value for header {name}"), e))?;
    self.headers.insert(name, value);
    Ok(self)
  }

  /// Authenticate with `Authorization: Bearer <token>`.
  pub fn with_bearer_token(self, token: &str) -> Result<Self, TransportError> {
    self.with_header(AUTHORIZATION.as_str(), &format!("Bearer {token}"))
  }

  pub fn url(&self) -> &Url {
    &self.url
  }

  async fn post(&self, query: &str, variables: &Variables) -> Result<Value, TransportError> {
    let body = serde_json::to_vec(&RequestBody { query, variables })
      .map_err(|e| TransportError::with_source("Failed to serialize request", e))?;

    debug!(url = %self.url, bytes = body.len(), "Sending GraphQL request");

    let response = self
      .client
      .post(self.url.clone())
      .headers(self.headers.clone())
      .header(CONTENT_TYPE, "application/json")
      .body(body)
      .send()
      .await
      .map_err(|e| TransportError::with_source(format!("Request to {} failed", self.url), e))?;

    let status = response.status();
    let bytes = response
      .bytes()
      .await
      .map_err(|e| TransportError::with_source("Failed to read response body", e))?;

    if !status.is_success() {
      return Err(TransportError::new(format!(
        "Endpoint answered with {}: {}",
        status,
        String::from_utf8_lossy(&bytes)
      )));
    }

    parse_response(&bytes)
  }
}

/// Turn a GraphQL response document into a payload or an error.
fn parse_response(bytes: &[u8]) -> Result<Value, TransportError> {
  let body: ResponseBody = serde_json::from_slice(bytes)
    .map_err(|e| TransportError::with_source("Failed to parse response", e))?;

  if !body.errors.is_empty() {
    let messages: Vec<&str> = body.errors.iter().map(|e| e.message.as_str()).collect();
    return Err(TransportError::new(messages.join("; ")));
  }

  Ok(body.data.unwrap_or(Value::Null))
}

impl Transport for HttpTransport {
  fn send<'a>(
    &'a self,
    query: &'a str,
    variables: &'a Variables,
  ) -> BoxFuture<'a, Result<Value, TransportError>> {
    Box::pin(self.post(query, variables))
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn test_parse_data() {
    let body = br#"{"data": {"post": {"title": "hello"}}}"#;
    assert_eq!(
      parse_response(body).unwrap(),
      json!({"post": {"title": "hello"}})
    );
  }

  #[test]
  fn test_parse_errors_are_joined() {
    let body = br#"{"data": null, "errors": [{"message": "a"}, {"message": "b"}]}"#;
    let err = parse_response(body).unwrap_err();
    assert_eq!(err.message(), "a; b");
  }

  #[test]
  fn test_parse_garbage() {
    assert!(parse_response(b"<html>").is_err());
  }

  #[test]
  fn test_invalid_url() {
    assert!(HttpTransport::new("not a url").is_err());
  }

  #[test]
  fn test_headers() {
    let transport = HttpTransport::new("http://localhost:4000/graphql")
      .unwrap()
      .with_bearer_token("secret")
      .unwrap()
      .with_header("x-client", "gqlkit")
      .unwrap();

    assert_eq!(transport.headers[AUTHORIZATION], "Bearer secret");
    assert_eq!(transport.headers["x-client"], "gqlkit");
    assert_eq!(transport.url().path(), "/graphql");
  }
}
