//! # Querent - deduplicated query cache with subscriptions
//!
//! Querent is the data layer behind a `useQuery`-style UI hook, similar to SWR
//! or TanStack Query. It fetches each logical resource once, caches the last
//! result, tracks whether it is loading, failed or loaded, and tells interested
//! consumers whenever that changes.
//!
//! ## Architecture
//!
//! 1. **Query**: one cached unit of data with a status state machine and a list
//!    of subscribers. It runs at most one fetch at a time.
//! 2. **QueryClient**: a registry mapping a canonical key hash to its query.
//!    Consumers asking for the same key share the same query.
//! 3. **QueryObserver**: created per consumer. It resolves the shared query,
//!    refetches when the cached data is stale, and turns change notifications
//!    into a re-render callback (or a stream).
//!
//! ## Core Components
//!
//! - [`QueryKey`](key::QueryKey) / [`QueryHash`](key::QueryHash): identity of a query
//! - [`Query`](query::Query) and [`QueryState`](query::QueryState): cached state and fetch coordination
//! - [`QueryClient`](client::QueryClient): registry and deduplication
//! - [`QueryObserver`](observer::QueryObserver): per-consumer subscription adapter
//! - [`provider`]: task-scoped access to a shared client
//! - [`mock`]: controllable fetch function for tests
//!
//! ## Example
//!
//! ```
//! use std::sync::Arc;
//! use std::sync::atomic::{AtomicUsize, Ordering};
//! use querent::prelude::*;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), QueryError> {
//! let client = QueryClient::new();
//! let observer = QueryObserver::new(
//!     &client,
//!     QueryOptions::new("posts", || async { Ok::<_, FetchError>(vec!["Post 1", "Post 2"]) }),
//! )?;
//!
//! let renders = Arc::new(AtomicUsize::new(0));
//! let counter = Arc::clone(&renders);
//! let unsubscribe = observer.subscribe(move || {
//!     counter.fetch_add(1, Ordering::SeqCst);
//! });
//!
//! while observer.query_state().is_fetching {
//!     tokio::task::yield_now().await;
//! }
//!
//! let state = observer.query_state();
//! assert_eq!(state.status, QueryStatus::Success);
//! assert_eq!(state.data(), Some(&vec!["Post 1", "Post 2"]));
//! assert!(renders.load(Ordering::SeqCst) >= 2);
//!
//! unsubscribe.unsubscribe();
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod config;
pub mod error;
pub mod key;
pub mod mock;
pub mod observer;
pub mod prelude;
pub mod provider;
pub mod query;

pub use client::QueryClient;
pub use config::QueryConfig;
pub use error::{FetchError, QueryError};
pub use key::{KeyPart, QueryHash, QueryKey};
pub use observer::{QueryObserver, QueryOptions, QueryStream};
pub use query::{
    FetchOutcome, FetchPhase, Fetcher, Query, QueryState, QueryStatus, Subscriber, SubscriberId,
    Unsubscribe,
};
