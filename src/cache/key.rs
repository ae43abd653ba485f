use std::fmt;

use sha2::{Digest, Sha256};

use crate::Variables;

/// Separator between the query text and the serialized variables.
///
/// A query whose text itself ends in `::` followed by a JSON object could
/// collide with another (query, variables) pair. That is a known limitation.
const SEPARATOR: &str = "::";

/// Identity of a cached query: its text plus its serialized variables.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(String);

impl CacheKey {
  /// Derive the key for `query` run with `vars`.
  ///
  /// `Variables` is ordered by key, so two mappings with the same entries
  /// always serialize, and therefore key, identically.
  pub fn derive(query: &str, vars: &Variables) -> Self {
    // String-keyed maps of JSON values cannot fail to serialize
    let vars_json = serde_json::to_string(vars).unwrap_or_default();
    Self(format!("{query}{SEPARATOR}{vars_json}"))
  }

  pub fn as_str(&self) -> &str {
    &self.0
  }

  /// Short stable fingerprint, used to refer to the key in logs.
  pub fn digest(&self) -> String {
    let mut hasher = Sha256::new();
    hasher.update(self.0.as_bytes());
    hex::encode(&hasher.finalize()[..6])
  }
}

impl fmt::Display for CacheKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.0)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  fn vars(value: serde_json::Value) -> Variables {
    match value {
      serde_json::Value::Object(map) => map,
      _ => unreachable!(),
    }
  }

  #[test]
  fn test_format() {
    let key = CacheKey::derive("{posts}", &vars(json!({"limit": 10})));
    assert_eq!(key.as_str(), r#"{posts}::{"limit":10}"#);
  }

  #[test]
  fn test_empty_variables() {
    let key = CacheKey::derive("{posts}", &Variables::new());
    assert_eq!(key.to_string(), "{posts}::{}");
  }

  #[test]
  fn test_variable_order_does_not_matter() {
    let mut a = Variables::new();
    a.insert("a".into(), json!(1));
    a.insert("b".into(), json!(2));
    let mut b = Variables::new();
    b.insert("b".into(), json!(2));
    b.insert("a".into(), json!(1));

    assert_eq!(CacheKey::derive("{x}", &a), CacheKey::derive("{x}", &b));
  }

  #[test]
  fn test_distinct_inputs() {
    let v1 = vars(json!({"id": 1}));
    let v2 = vars(json!({"id": 2}));

    assert_ne!(CacheKey::derive("{x}", &v1), CacheKey::derive("{x}", &v2));
    assert_ne!(CacheKey::derive("{x}", &v1), CacheKey::derive("{y}", &v1));
  }

  #[test]
  fn test_digest_is_stable() {
    let key = CacheKey::derive("{x}", &Variables::new());
    assert_eq!(key.digest(), key.clone().digest());
    assert_eq!(key.digest().len(), 12);
  }
}
