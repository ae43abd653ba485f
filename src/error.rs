//! Error types shared by the fragment registry, the cache and the client.

use std::sync::Arc;
use thiserror::Error;

use crate::transport::TransportError;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors surfaced by the client.
///
/// `Clone` so that a single transport failure can be delivered to every
/// subscriber watching the same query.
#[derive(Debug, Clone, Error)]
pub enum Error {
  /// A required argument was missing or empty.
  #[error("{0} is required!")]
  InvalidArgument(&'static str),

  /// A `...name` reference could not be resolved.
  #[error("There is no such fragment: {0}")]
  UnknownFragment(String),

  /// A fragment with the same name is already registered.
  #[error("Fragment already registered: {0}")]
  FragmentConflict(String),

  /// A background fetch was requested outside a Tokio runtime.
  #[error("A Tokio runtime is required to fetch in the background")]
  NoRuntime,

  /// The transport failed to deliver a result.
  #[error(transparent)]
  Transport(Arc<TransportError>),
}

impl From<TransportError> for Error {
  fn from(err: TransportError) -> Self {
    Error::Transport(Arc::new(err))
  }
}

impl Error {
  pub fn is_transport(&self) -> bool {
    matches!(self, Error::Transport(_))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_messages() {
    assert_eq!(
      Error::InvalidArgument("rawQuery").to_string(),
      "rawQuery is required!"
    );
    assert_eq!(
      Error::UnknownFragment("missing".into()).to_string(),
      "There is no such fragment: missing"
    );
    assert_eq!(
      Error::NoRuntime.to_string(),
      "A Tokio runtime is required to fetch in the background"
    );
  }

  #[test]
  fn test_transport_error_is_shared_on_clone() {
    let err: Error = TransportError::new("connection refused").into();
    let copy = err.clone();

    assert!(copy.is_transport());
    assert_eq!(copy.to_string(), "connection refused");
    match (err, copy) {
      (Error::Transport(a), Error::Transport(b)) => assert!(Arc::ptr_eq(&a, &b)),
      _ => unreachable!(),
    }
  }
}
