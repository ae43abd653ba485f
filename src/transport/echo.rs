use std::sync::atomic::{AtomicUsize, Ordering};

use futures::future::BoxFuture;
use serde_json::Value;

use super::{Transport, TransportError};
use crate::Variables;

/// Transport that answers every request with the query text it was given.
///
/// Handy for dry runs and for checking the exact text the client composes.
#[derive(Debug, Default)]
pub struct EchoTransport {
  calls: AtomicUsize,
}

impl EchoTransport {
  pub fn new() -> Self {
    Self::default()
  }

  /// Number of requests sent through this transport so far.
  pub fn calls(&self) -> usize {
    self.calls.load(Ordering::SeqCst)
  }
}

impl Transport for EchoTransport {
  fn send<'a>(
    &'a self,
    query: &'a str,
    _variables: &'a Variables,
  ) -> BoxFuture<'a, Result<Value, TransportError>> {
    self.calls.fetch_add(1, Ordering::SeqCst);
    Box::pin(async move { Ok(Value::String(query.to_string())) })
  }
}
