//! A small GraphQL client with reusable fragments and a reactive query cache.
//!
//! - [`Client`] sends queries and mutations through a pluggable [`Transport`],
//!   appending every fragment a query references via `...name`
//! - Watched queries are served from a [`ReactiveCache`] that keeps the last
//!   result per (query, variables) and pushes updates to every watcher
//! - Entries nobody watches anymore are reclaimed after a grace period
//!
//! ```ignore
//! let client = Client::new(HttpTransport::new("https://example.com/graphql")?);
//! let post = client.create_fragment("fragment on Post { title }")?;
//!
//! let subscription = client.watch_query(&format!("{{ posts {{ ...{post} }} }}"), |result| {
//!     println!("{result:?}");
//! })?;
//! ```

pub mod cache;
pub mod client;
mod error;
pub mod fragment;
pub mod transport;
pub mod watch;

pub use cache::{CacheItem, CacheKey, ReactiveCache, Subscription};
pub use client::{Client, ClientConfig};
pub use error::{Error, Result};
pub use transport::{EchoTransport, HttpTransport, Transport, TransportError};
pub use watch::{QueryState, WatchedQuery};

/// Variables passed alongside a query.
pub type Variables = serde_json::Map<String, serde_json::Value>;
