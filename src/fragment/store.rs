use std::collections::HashMap;

use sha2::{Digest, Sha256};
use tracing::debug;

use crate::error::{Error, Result};

/// Fragment sources keyed by fragment name.
///
/// Names are unique for the lifetime of the store; registering a name twice
/// is rejected instead of silently replacing the earlier definition.
#[derive(Debug, Default)]
pub struct FragmentStore {
  fragments: HashMap<String, String>,
  generated: u64,
}

impl FragmentStore {
  pub fn new() -> Self {
    Self::default()
  }

  /// Register `text` under `name`.
  pub fn register(&mut self, name: &str, text: &str) -> Result<()> {
    if name.is_empty() {
      return Err(Error::InvalidArgument("fragment name"));
    }
    if self.fragments.contains_key(name) {
      return Err(Error::FragmentConflict(name.to_string()));
    }

    debug!(fragment = name, "Registered fragment");
    self.fragments.insert(name.to_string(), text.to_string());
    Ok(())
  }

  /// Look up the source text of a fragment.
  pub fn resolve(&self, name: &str) -> Result<&str> {
    self
      .fragments
      .get(name)
      .map(String::as_str)
      .ok_or_else(|| Error::UnknownFragment(name.to_string()))
  }

  /// Name an anonymous `fragment on Type { ... }` body and register it.
  ///
  /// The generated name is spliced in after the first `fragment` keyword
  /// and returned so callers can reference it as `...name`.
  pub fn create(&mut self, body: &str) -> Result<String> {
    if body.is_empty() {
      return Err(Error::InvalidArgument("fragment"));
    }

    let name = self.next_name(body);
    let text = body.replacen("fragment", &format!("fragment {name}"), 1);
    self.register(&name, &text)?;
    Ok(name)
  }

  pub fn contains(&self, name: &str) -> bool {
    self.fragments.contains_key(name)
  }

  pub fn len(&self) -> usize {
    self.fragments.len()
  }

  pub fn is_empty(&self) -> bool {
    self.fragments.is_empty()
  }

  /// `f` + 8 hex digits of the body digest + a per-store counter.
  ///
  /// The digest prefix has a fixed width, so the counter suffix alone keeps
  /// names unique within this store.
  fn next_name(&mut self, body: &str) -> String {
    self.generated += 1;

    let mut hasher = Sha256::new();
    hasher.update(body.as_bytes());
    hasher.update(self.generated.to_le_bytes());
    let digest = hex::encode(hasher.finalize());

    format!("f{}{}", &digest[..8], self.generated)
  }
}
