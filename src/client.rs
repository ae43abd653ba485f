//! GraphQL client that composes fragments into queries and keeps watched
//! queries up to date through the reactive cache.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::Value;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::cache::{ReactiveCache, Subscription, DEFAULT_EXPIRATION_TIMEOUT};
use crate::error::{Error, Result};
use crate::fragment::{find_dependencies, FragmentStore};
use crate::transport::Transport;
use crate::watch::WatchedQuery;
use crate::Variables;

/// Client settings.
#[derive(Debug, Clone)]
pub struct ClientConfig {
  /// How long a watched query's cache entry survives its last watcher
  pub cache_expiration_timeout: Duration,
}

impl Default for ClientConfig {
  fn default() -> Self {
    Self {
      cache_expiration_timeout: DEFAULT_EXPIRATION_TIMEOUT,
    }
  }
}

/// GraphQL client.
///
/// Argument validation and fragment resolution always happen before the
/// transport is contacted, so a rejected call has no side effects. Cloning
/// is cheap; clones share fragments, cache and transport.
#[derive(Clone)]
pub struct Client {
  transport: Arc<dyn Transport>,
  fragments: Arc<Mutex<FragmentStore>>,
  cache: ReactiveCache,
}

impl Client {
  pub fn new(transport: impl Transport + 'static) -> Self {
    Self::with_config(transport, ClientConfig::default())
  }

  pub fn with_config(transport: impl Transport + 'static, config: ClientConfig) -> Self {
    Self::from_shared(Arc::new(transport), config)
  }

  /// Build a client around a transport the caller keeps a handle to.
  pub fn from_shared(transport: Arc<dyn Transport>, config: ClientConfig) -> Self {
    Self {
      transport,
      fragments: Arc::new(Mutex::new(FragmentStore::new())),
      cache: ReactiveCache::with_expiration_timeout(config.cache_expiration_timeout),
    }
  }

  /// Direct access to the cache, e.g. to prime or invalidate entries.
  pub fn cache(&self) -> &ReactiveCache {
    &self.cache
  }

  /// Send `raw_query` as-is, without fragment expansion.
  pub async fn send(&self, raw_query: &str, vars: &Variables) -> Result<Value> {
    if raw_query.is_empty() {
      return Err(Error::InvalidArgument("rawQuery"));
    }

    debug!(bytes = raw_query.len(), "Dispatching operation");
    Ok(self.transport.send(raw_query, vars).await?)
  }

  /// Name and register an anonymous `fragment on Type { ... }`.
  ///
  /// Returns the generated name, to be referenced as `...name`.
  pub fn create_fragment(&self, fragment: &str) -> Result<String> {
    self.fragments.lock().create(fragment)
  }

  /// Register a fragment under a name of the caller's choosing.
  pub fn register_fragment(&self, name: &str, fragment: &str) -> Result<()> {
    if fragment.is_empty() {
      return Err(Error::InvalidArgument("fragment"));
    }
    self.fragments.lock().register(name, fragment)
  }

  /// Run a query, appending every fragment it depends on.
  pub async fn query(&self, query: &str, vars: &Variables) -> Result<Value> {
    let composed = self.compose_query(query)?;
    self.send(&composed, vars).await
  }

  /// Run a mutation given as a bare selection set, e.g. `{ createPost { id } }`.
  pub async fn mutate(&self, mutation: &str, vars: &Variables) -> Result<Value> {
    if mutation.is_empty() {
      return Err(Error::InvalidArgument("query"));
    }

    let composed = self.with_fragments(format!("mutation _ {}", mutation.trim()))?;
    self.send(&composed, vars).await
  }

  /// Watch a query that takes no variables. See [`Client::watch_query_with_vars`].
  pub fn watch_query<F>(&self, query: &str, callback: F) -> Result<Subscription>
  where
    F: Fn(Result<Value>) + Send + Sync + 'static,
  {
    self.watch_query_with_vars(query, &Variables::new(), callback)
  }

  /// Watch the result of a query.
  ///
  /// A cached result is replayed to `callback` immediately. When nothing
  /// is cached yet, the query is fetched in the background and its outcome
  /// delivered to every watcher of the same query and variables.
  ///
  /// # Errors
  ///
  /// [`Error::NoRuntime`] when a fetch is needed outside a Tokio runtime.
  /// Nothing is registered in that case.
  pub fn watch_query_with_vars<F>(
    &self,
    query: &str,
    vars: &Variables,
    callback: F,
  ) -> Result<Subscription>
  where
    F: Fn(Result<Value>) + Send + Sync + 'static,
  {
    if query.is_empty() {
      return Err(Error::InvalidArgument("query"));
    }

    let fetch = match self.cache.get_item(query, vars) {
      Some(_) => None,
      None => Some((self.compose_query(query)?, runtime()?)),
    };

    let subscription = self.cache.watch_item(query, vars, callback);
    if let Some((composed, handle)) = fetch {
      self.fetch_to_cache(&handle, query, composed, vars);
    }

    Ok(subscription)
  }

  /// Watch a query through a [`WatchedQuery`] instead of a callback.
  pub fn watch(&self, query: &str, vars: &Variables) -> Result<WatchedQuery> {
    let (tx, rx) = mpsc::unbounded_channel();
    let subscription = self.watch_query_with_vars(query, vars, move |result| {
      // Ignore send errors - the receiver may have been dropped
      let _ = tx.send(result);
    })?;

    Ok(WatchedQuery::new(subscription, rx))
  }

  /// Fetch a query again and publish the outcome to its watchers.
  ///
  /// # Errors
  ///
  /// [`Error::NoRuntime`] when called outside a Tokio runtime.
  pub fn refetch_query(&self, query: &str, vars: &Variables) -> Result<()> {
    let composed = self.compose_query(query)?;
    let handle = runtime()?;
    self.fetch_to_cache(&handle, query, composed, vars);
    Ok(())
  }

  fn compose_query(&self, query: &str) -> Result<String> {
    if query.is_empty() {
      return Err(Error::InvalidArgument("query"));
    }
    self.with_fragments(query.to_string())
  }

  /// Append the fragments `operation` depends on, one per line.
  fn with_fragments(&self, operation: String) -> Result<String> {
    let store = self.fragments.lock();
    let fragments = find_dependencies(&operation, &store)?;
    Ok(format!("{}\n{}", operation, fragments.join("\n")))
  }

  /// Fire-and-forget fetch whose result or error lands in the cache.
  ///
  /// Concurrent fetches of the same query are not deduplicated; the last
  /// one to complete wins.
  fn fetch_to_cache(&self, handle: &Handle, query: &str, composed: String, vars: &Variables) {
    let client = self.clone();
    let query = query.to_string();
    let vars = vars.clone();

    handle.spawn(async move {
      match client.send(&composed, &vars).await {
        Ok(payload) => client.cache.set_item_payload(&query, &vars, payload),
        Err(error) => {
          warn!(%error, "Background fetch failed");
          client.cache.fire_error(&query, &vars, error);
        }
      }
    });
  }
}

fn runtime() -> Result<Handle> {
  Handle::try_current().map_err(|_| Error::NoRuntime)
}

impl std::fmt::Debug for Client {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Client")
      .field("fragments", &self.fragments.lock().len())
      .field("cache", &self.cache)
      .finish_non_exhaustive()
  }
}
