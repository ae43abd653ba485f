use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use super::CacheKey;
use crate::error::Error;
use crate::Variables;

/// Subscriber callback: `Ok(payload)` on every result, `Err` on every failure.
pub(crate) type Callback = Arc<dyn Fn(Result<Value, Error>) + Send + Sync>;

pub(crate) struct Subscriber {
  pub id: u64,
  pub callback: Callback,
}

/// Pending removal of an unwatched entry.
///
/// Owned by exactly one entry. Dropping it (the entry gets a new
/// subscriber, is removed, or is rescheduled) aborts the reaper task.
pub(crate) struct ExpiryTimer {
  pub generation: u64,
  pub deadline: Instant,
  task: Option<JoinHandle<()>>,
}

impl ExpiryTimer {
  pub fn new(generation: u64, deadline: Instant, task: Option<JoinHandle<()>>) -> Self {
    Self {
      generation,
      deadline,
      task,
    }
  }

  /// Let go of the reaper task without aborting it.
  pub fn detach(&mut self) {
    self.task = None;
  }
}

impl Drop for ExpiryTimer {
  fn drop(&mut self) {
    if let Some(task) = self.task.take() {
      task.abort();
    }
  }
}

pub(crate) struct CacheEntry {
  pub query: String,
  pub vars: Variables,
  pub payload: Option<Value>,
  /// Stamp of the latest write, unique across the whole cache
  pub published: u64,
  pub updated_at: Option<DateTime<Utc>>,
  pub subscribers: Vec<Subscriber>,
  pub expiry: Option<ExpiryTimer>,
}

impl CacheEntry {
  pub fn new(query: &str, vars: &Variables) -> Self {
    Self {
      query: query.to_string(),
      vars: vars.clone(),
      payload: None,
      published: 0,
      updated_at: None,
      subscribers: Vec::new(),
      expiry: None,
    }
  }

  pub fn is_expired(&self, now: Instant) -> bool {
    self.expiry.as_ref().is_some_and(|t| t.deadline <= now)
  }

  pub fn callbacks(&self) -> Vec<Callback> {
    self.subscribers.iter().map(|s| Arc::clone(&s.callback)).collect()
  }

  pub fn snapshot(&self, key: &CacheKey) -> CacheItem {
    CacheItem {
      key: key.clone(),
      query: self.query.clone(),
      vars: self.vars.clone(),
      payload: self.payload.clone(),
      subscriber_count: self.subscribers.len(),
      updated_at: self.updated_at,
      expiring: self.expiry.is_some(),
    }
  }
}

/// Point-in-time copy of a cache entry.
#[derive(Debug, Clone)]
pub struct CacheItem {
  pub key: CacheKey,
  /// The query text the entry was created for
  pub query: String,
  pub vars: Variables,
  /// Last successfully fetched result, if any
  pub payload: Option<Value>,
  pub subscriber_count: usize,
  /// When the payload was last written
  pub updated_at: Option<DateTime<Utc>>,
  /// Whether the entry is unwatched and waiting to be reclaimed
  pub expiring: bool,
}
