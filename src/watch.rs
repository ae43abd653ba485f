//! Channel-backed view of a watched query.
//!
//! Instead of handling callbacks, a `WatchedQuery` buffers every update in
//! a channel and tracks the latest state, so it can be polled from an
//! event loop tick or consumed as a `Stream`.
//!
//! # Example
//!
//! ```ignore
//! let mut watched = client.watch("{ posts { title } }", &Variables::new())?;
//!
//! // In event loop tick
//! if watched.poll() {
//!     // State changed, trigger re-render
//! }
//!
//! // In render
//! match watched.state() {
//!     QueryState::Loading => render_spinner(),
//!     QueryState::Success(data) => render_data(data),
//!     QueryState::Error(e) => render_error(e),
//! }
//! ```

use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Instant;

use futures::Stream;
use serde_json::Value;
use tokio::sync::mpsc;

use crate::cache::{CacheKey, Subscription};
use crate::error::Error;

/// The state of a watched query
#[derive(Debug, Clone)]
pub enum QueryState<T> {
  /// Waiting for the first result
  Loading,
  /// Latest result
  Success(T),
  /// Latest fetch failed
  Error(String),
}

type Update = Result<Value, Error>;

/// A watched query whose updates arrive through a channel.
pub struct WatchedQuery {
  state: QueryState<Value>,
  receiver: mpsc::UnboundedReceiver<Update>,
  subscription: Subscription,
  updated_at: Option<Instant>,
}

impl WatchedQuery {
  pub(crate) fn new(
    subscription: Subscription,
    receiver: mpsc::UnboundedReceiver<Update>,
  ) -> Self {
    Self {
      state: QueryState::Loading,
      receiver,
      subscription,
      updated_at: None,
    }
  }

  pub fn key(&self) -> &CacheKey {
    self.subscription.key()
  }

  /// Get the current state of the query.
  pub fn state(&self) -> &QueryState<Value> {
    &self.state
  }

  /// Get the data if the latest update was a result.
  pub fn data(&self) -> Option<&Value> {
    match &self.state {
      QueryState::Success(data) => Some(data),
      _ => None,
    }
  }

  /// Get the error message if the latest update was a failure.
  pub fn error(&self) -> Option<&str> {
    match &self.state {
      QueryState::Error(message) => Some(message),
      _ => None,
    }
  }

  pub fn is_loading(&self) -> bool {
    matches!(self.state, QueryState::Loading)
  }

  pub fn is_success(&self) -> bool {
    self.data().is_some()
  }

  pub fn is_error(&self) -> bool {
    self.error().is_some()
  }

  /// When the latest update arrived.
  pub fn updated_at(&self) -> Option<Instant> {
    self.updated_at
  }

  /// Drain pending updates without blocking.
  ///
  /// Returns `true` if the state changed. Call this in your event loop
  /// tick handler.
  pub fn poll(&mut self) -> bool {
    let mut changed = false;
    while let Ok(update) = self.receiver.try_recv() {
      self.apply(&update);
      changed = true;
    }
    changed
  }

  /// Stop watching. The cache entry expires once nobody watches it.
  pub fn stop(self) {
    self.subscription.stop();
  }

  fn apply(&mut self, update: &Update) {
    self.state = match update {
      Ok(data) => QueryState::Success(data.clone()),
      Err(error) => QueryState::Error(error.to_string()),
    };
    self.updated_at = Some(Instant::now());
  }
}

impl Stream for WatchedQuery {
  type Item = Update;

  fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
    let this = self.get_mut();
    match this.receiver.poll_recv(cx) {
      Poll::Ready(Some(update)) => {
        this.apply(&update);
        Poll::Ready(Some(update))
      }
      other => other,
    }
  }
}

impl std::fmt::Debug for WatchedQuery {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("WatchedQuery")
      .field("state", &self.state)
      .field("updated_at", &self.updated_at)
      .finish_non_exhaustive()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::transport::{EchoTransport, Transport, TransportError};
  use crate::{Client, Variables};
  use futures::future::BoxFuture;
  use futures::StreamExt;
  use serde_json::json;

  struct Unreachable;

  impl Transport for Unreachable {
    fn send<'a>(
      &'a self,
      _query: &'a str,
      _variables: &'a Variables,
    ) -> BoxFuture<'a, Result<Value, TransportError>> {
      Box::pin(async { Err(TransportError::new("Something went wrong")) })
    }
  }

  #[tokio::test]
  async fn test_watch_success() {
    let client = Client::new(EchoTransport::new());
    let mut watched = client.watch("{a}", &Variables::new()).unwrap();
    assert!(watched.is_loading());

    let update = watched.next().await.unwrap();
    assert_eq!(update.unwrap(), json!("{a}\n"));
    assert!(watched.is_success());
    assert_eq!(watched.data(), Some(&json!("{a}\n")));
    assert!(watched.updated_at().is_some());
  }

  #[tokio::test]
  async fn test_watch_error() {
    let client = Client::new(Unreachable);
    let mut watched = client.watch("{a}", &Variables::new()).unwrap();

    assert!(watched.next().await.unwrap().is_err());
    assert!(watched.is_error());
    assert_eq!(watched.error(), Some("Something went wrong"));
  }

  #[tokio::test]
  async fn test_poll_replayed_payload() {
    let client = Client::new(Unreachable);
    client
      .cache()
      .set_item_payload("{a}", &Variables::new(), json!(42));

    let mut watched = client.watch("{a}", &Variables::new()).unwrap();
    // Replay happens during registration, so it is already buffered
    assert!(watched.poll());
    assert_eq!(watched.data(), Some(&json!(42)));
    assert!(!watched.poll());
  }

  #[tokio::test]
  async fn test_poll_keeps_latest() {
    let client = Client::new(Unreachable);
    let vars = Variables::new();
    client.cache().set_item_payload("{a}", &vars, json!(1));

    let mut watched = client.watch("{a}", &vars).unwrap();
    client.cache().set_item_payload("{a}", &vars, json!(2));
    client.cache().set_item_payload("{a}", &vars, json!(3));

    assert!(watched.poll());
    assert_eq!(watched.data(), Some(&json!(3)));
  }

  #[tokio::test]
  async fn test_state_follows_latest_update() {
    let client = Client::new(Unreachable);
    let vars = Variables::new();
    client.cache().set_item_payload("{a}", &vars, json!(1));

    let mut watched = client.watch("{a}", &vars).unwrap();
    assert!(watched.poll());
    assert!(matches!(watched.state(), QueryState::Success(data) if *data == json!(1)));
    assert_eq!(watched.error(), None);

    client.refetch_query("{a}", &vars).unwrap();
    let update = watched.next().await.unwrap();
    assert!(update.is_err());
    assert!(!watched.is_success());
    assert_eq!(watched.data(), None);
    assert_eq!(watched.error(), Some("Something went wrong"));
  }

  #[tokio::test]
  async fn test_stop_unregisters() {
    let client = Client::new(EchoTransport::new());
    let watched = client.watch("{a}", &Variables::new()).unwrap();
    let key = watched.key().clone();
    watched.stop();

    let item = client.cache().get_item("{a}", &Variables::new()).unwrap();
    assert_eq!(item.key, key);
    assert_eq!(item.subscriber_count, 0);
    assert!(item.expiring);
  }
}
