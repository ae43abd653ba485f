//! Reactive query cache.
//!
//! This module keeps the last known result of every watched query and
//! pushes updates to the callbacks watching it:
//! - One entry per (query, variables) pair, created on first watch or write
//! - Payloads are replaced wholesale and copied on every read and write
//! - Entries nobody watches are reclaimed after a grace period

mod entry;
mod key;
mod layer;

pub use entry::CacheItem;
pub use key::CacheKey;
pub use layer::{ReactiveCache, Subscription, DEFAULT_EXPIRATION_TIMEOUT};
