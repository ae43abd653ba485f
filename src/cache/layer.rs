//! Subscription and storage engine behind watched queries.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use chrono::Utc;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::time::Instant;
use tracing::{debug, trace};

use super::entry::{CacheEntry, CacheItem, Callback, ExpiryTimer, Subscriber};
use super::CacheKey;
use crate::error::Error;
use crate::Variables;

/// How long an unwatched entry is kept before it is reclaimed.
pub const DEFAULT_EXPIRATION_TIMEOUT: Duration = Duration::from_secs(60);

type Entries = HashMap<CacheKey, CacheEntry>;

struct Shared {
  entries: Mutex<Entries>,
  expiration_timeout: Duration,
  /// Source of subscriber ids and expiry generations
  next_id: AtomicU64,
}

impl Shared {
  fn next_id(&self) -> u64 {
    self.next_id.fetch_add(1, Ordering::Relaxed)
  }
}

/// Cache of query results that multicasts updates to its watchers.
///
/// Callbacks are always invoked after the internal lock is released, so a
/// callback may freely call back into the cache. Cloning is cheap and
/// yields a handle to the same cache.
#[derive(Clone)]
pub struct ReactiveCache {
  shared: Arc<Shared>,
}

impl Default for ReactiveCache {
  fn default() -> Self {
    Self::new()
  }
}

impl ReactiveCache {
  pub fn new() -> Self {
    Self::with_expiration_timeout(DEFAULT_EXPIRATION_TIMEOUT)
  }

  pub fn with_expiration_timeout(expiration_timeout: Duration) -> Self {
    Self {
      shared: Arc::new(Shared {
        entries: Mutex::new(HashMap::new()),
        expiration_timeout,
        next_id: AtomicU64::new(1),
      }),
    }
  }

  pub fn expiration_timeout(&self) -> Duration {
    self.shared.expiration_timeout
  }

  /// Watch the result of `query` run with `vars`.
  ///
  /// If a payload is already cached, `callback` receives a copy of it before
  /// this returns. Afterwards it receives every payload and error written
  /// for the same key until the returned subscription is stopped. Watching
  /// an entry that is waiting to expire keeps it alive.
  pub fn watch_item<F>(&self, query: &str, vars: &Variables, callback: F) -> Subscription
  where
    F: Fn(Result<Value, Error>) + Send + Sync + 'static,
  {
    let key = CacheKey::derive(query, vars);
    let callback: Callback = Arc::new(callback);

    let (replay, seen) = {
      let mut entries = self.shared.entries.lock();
      let entry = ensure_entry(&mut entries, &key, query, vars);
      if entry.expiry.take().is_some() {
        debug!(key = %key.digest(), "Cancelled pending expiry");
      }
      (entry.payload.clone(), entry.published)
    };

    if let Some(payload) = replay {
      callback(Ok(payload));
    }

    let id = self.shared.next_id();
    let missed = {
      let mut entries = self.shared.entries.lock();
      let entry = ensure_entry(&mut entries, &key, query, vars);
      entry.expiry = None;
      entry.subscribers.push(Subscriber {
        id,
        callback: Arc::clone(&callback),
      });
      trace!(
        key = %key.digest(),
        subscribers = entry.subscribers.len(),
        "Registered subscriber"
      );
      // A write that landed during the replay only reached older subscribers
      if entry.published != seen {
        entry.payload.clone()
      } else {
        None
      }
    };

    if let Some(payload) = missed {
      trace!(key = %key.digest(), "Replaying payload written during registration");
      callback(Ok(payload));
    }

    Subscription {
      cache: Arc::downgrade(&self.shared),
      key,
      id,
    }
  }

  /// Store `payload` and deliver a copy of it to every current watcher.
  ///
  /// Watchers are notified in registration order before this returns.
  pub fn set_item_payload(&self, query: &str, vars: &Variables, payload: Value) {
    let key = CacheKey::derive(query, vars);

    let callbacks = {
      let mut entries = self.shared.entries.lock();
      let entry = ensure_entry(&mut entries, &key, query, vars);
      entry.payload = Some(payload.clone());
      entry.published = self.shared.next_id();
      entry.updated_at = Some(Utc::now());
      entry.callbacks()
    };

    trace!(key = %key.digest(), subscribers = callbacks.len(), "Publishing payload");
    for callback in callbacks {
      callback(Ok(payload.clone()));
    }
  }

  /// Deliver `error` to every current watcher of the key.
  ///
  /// Does nothing, and creates nothing, when the key has no entry.
  pub fn fire_error(&self, query: &str, vars: &Variables, error: Error) {
    let key = CacheKey::derive(query, vars);

    let callbacks = {
      let mut entries = self.shared.entries.lock();
      purge_if_expired(&mut entries, &key);
      match entries.get(&key) {
        Some(entry) => entry.callbacks(),
        None => return,
      }
    };

    trace!(key = %key.digest(), subscribers = callbacks.len(), %error, "Publishing error");
    for callback in callbacks {
      callback(Err(error.clone()));
    }
  }

  /// A copy of the cached payload, if the entry exists and has one.
  pub fn get_item_payload(&self, query: &str, vars: &Variables) -> Option<Value> {
    let key = CacheKey::derive(query, vars);
    let mut entries = self.shared.entries.lock();
    purge_if_expired(&mut entries, &key);
    entries.get(&key).and_then(|entry| entry.payload.clone())
  }

  /// Drop the entry right away, watched or not.
  pub fn remove_item(&self, query: &str, vars: &Variables) {
    let key = CacheKey::derive(query, vars);
    let removed = self.shared.entries.lock().remove(&key);
    if removed.is_some() {
      debug!(key = %key.digest(), "Removed cache entry");
    }
  }

  /// Look up an entry without creating it.
  pub fn get_item(&self, query: &str, vars: &Variables) -> Option<CacheItem> {
    let key = CacheKey::derive(query, vars);
    let mut entries = self.shared.entries.lock();
    purge_if_expired(&mut entries, &key);
    entries.get(&key).map(|entry| entry.snapshot(&key))
  }

  /// Number of entries currently held, including ones waiting to expire.
  pub fn len(&self) -> usize {
    self.shared.entries.lock().len()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  /// Drop every entry.
  pub fn clear(&self) {
    let removed = std::mem::take(&mut *self.shared.entries.lock());
    debug!(entries = removed.len(), "Cleared cache");
  }
}

impl fmt::Debug for ReactiveCache {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("ReactiveCache")
      .field("entries", &self.len())
      .field("expiration_timeout", &self.shared.expiration_timeout)
      .finish()
  }
}

fn purge_if_expired(entries: &mut Entries, key: &CacheKey) {
  if entries.get(key).is_some_and(|e| e.is_expired(Instant::now())) {
    entries.remove(key);
    debug!(key = %key.digest(), "Expired cache entry");
  }
}

fn ensure_entry<'a>(
  entries: &'a mut Entries,
  key: &CacheKey,
  query: &str,
  vars: &Variables,
) -> &'a mut CacheEntry {
  purge_if_expired(entries, key);
  entries.entry(key.clone()).or_insert_with(|| {
    debug!(key = %key.digest(), "Created cache entry");
    CacheEntry::new(query, vars)
  })
}

/// Handle to a registration made by [`ReactiveCache::watch_item`].
///
/// Dropping the handle does not unsubscribe; call [`Subscription::stop`].
#[must_use = "the callback stays registered until `stop` is called"]
pub struct Subscription {
  cache: Weak<Shared>,
  key: CacheKey,
  id: u64,
}

impl Subscription {
  pub fn key(&self) -> &CacheKey {
    &self.key
  }

  /// Remove this registration.
  ///
  /// When it was the last one, the entry is scheduled for removal after
  /// the cache's expiration timeout. Stopping after the entry was removed
  /// is a no-op.
  pub fn stop(self) {
    let Some(shared) = self.cache.upgrade() else {
      return;
    };

    let mut entries = shared.entries.lock();
    let Some(entry) = entries.get_mut(&self.key) else {
      return;
    };
    let Some(index) = entry.subscribers.iter().position(|s| s.id == self.id) else {
      return;
    };

    entry.subscribers.remove(index);
    if !entry.subscribers.is_empty() {
      return;
    }

    let generation = shared.next_id();
    let timeout = shared.expiration_timeout;
    let deadline = Instant::now() + timeout;
    // Outside a runtime the deadline is still honoured on the next lookup
    let task = tokio::runtime::Handle::try_current().ok().map(|handle| {
      handle.spawn(reap(
        Arc::downgrade(&shared),
        self.key.clone(),
        generation,
        timeout,
      ))
    });

    debug!(key = %self.key.digest(), ?timeout, "Scheduled expiry of unwatched entry");
    entry.expiry = Some(ExpiryTimer::new(generation, deadline, task));
  }
}

impl fmt::Debug for Subscription {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Subscription")
      .field("key", &self.key.digest())
      .field("id", &self.id)
      .finish()
  }
}

/// Remove the entry once `after` elapses, unless it was re-watched or
/// rescheduled in the meantime.
async fn reap(cache: Weak<Shared>, key: CacheKey, generation: u64, after: Duration) {
  tokio::time::sleep(after).await;

  let Some(shared) = cache.upgrade() else {
    return;
  };

  let removed = {
    let mut entries = shared.entries.lock();
    let due = entries.get(&key).is_some_and(|entry| {
      entry.subscribers.is_empty()
        && entry
          .expiry
          .as_ref()
          .is_some_and(|t| t.generation == generation)
    });
    if !due {
      return;
    }
    entries.remove(&key)
  };

  if let Some(mut entry) = removed {
    // This task is the reaper; dropping the timer must not abort it
    if let Some(timer) = entry.expiry.as_mut() {
      timer.detach();
    }
    debug!(key = %key.digest(), "Expired cache entry");
  }
}
