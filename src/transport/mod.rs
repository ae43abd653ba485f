//! Transport abstraction used by the client to deliver query text.
//!
//! The client never interprets payloads; a transport receives the final
//! query text (fragments already appended) and the variables, and resolves
//! to whatever JSON value the endpoint answered with.

mod echo;
mod http;

pub use echo::EchoTransport;
pub use http::HttpTransport;

use futures::future::BoxFuture;
use serde_json::Value;
use thiserror::Error;

use crate::Variables;

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Failure reported by a transport.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct TransportError {
  message: String,
  #[source]
  source: Option<BoxError>,
}

impl TransportError {
  pub fn new(message: impl Into<String>) -> Self {
    Self {
      message: message.into(),
      source: None,
    }
  }

  /// Wrap an underlying error with a message describing what failed.
  pub fn with_source(message: impl Into<String>, source: impl Into<BoxError>) -> Self {
    Self {
      message: message.into(),
      source: Some(source.into()),
    }
  }

  pub fn message(&self) -> &str {
    &self.message
  }
}

/// Something that can deliver a query to a GraphQL endpoint.
pub trait Transport: Send + Sync {
  fn send<'a>(
    &'a self,
    query: &'a str,
    variables: &'a Variables,
  ) -> BoxFuture<'a, Result<Value, TransportError>>;
}
