//! Per-consumer adapter between a shared [`Query`] and a re-render signal.
//!
//! # Design Pattern: one observer per mounted consumer
//!
//! A UI component creates a [`QueryObserver`] when it mounts, calls
//! [`subscribe`](QueryObserver::subscribe) with a callback that schedules a
//! re-render, reads [`query_state`](QueryObserver::query_state) while
//! rendering, and calls the returned [`Unsubscribe`] when it unmounts. The
//! query and its cached data stay in the client for the next consumer.
//!
//! Consumers that prefer streams can use [`watch`](QueryObserver::watch).
//!
//! # Example
//!
//! ```rust,ignore
//! use querent::prelude::*;
//!
//! let observer = QueryObserver::new(
//!     &client,
//!     QueryOptions::new("user-123", fetch_user).stale_time(Duration::from_secs(30)),
//! )?;
//!
//! let unsubscribe = observer.subscribe(move || redraw.notify_one());
//! // render with observer.query_state()
//! unsubscribe.unsubscribe();
//! ```

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use futures::{Stream, StreamExt};
use parking_lot::RwLock;
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;
use tracing::{debug, warn};

use crate::client::QueryClient;
use crate::error::QueryError;
use crate::key::QueryKey;
use crate::provider;
use crate::query::{Fetcher, Query, QueryState, Subscriber, Unsubscribe};

/// What an observer needs to resolve its query.
pub struct QueryOptions<T> {
    key: QueryKey,
    fetcher: Fetcher<T>,
    stale_time: Option<Duration>,
}

impl<T: Send + 'static> QueryOptions<T> {
    /// Creates options for `key`, fetched with `fetch` if the key is new.
    pub fn new<F, Fut, E>(key: impl Into<QueryKey>, fetch: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        E: fmt::Display + Send + 'static,
    {
        Self::with_fetcher(key, Fetcher::new(fetch))
    }

    /// Creates options from an already wrapped [`Fetcher`].
    pub fn with_fetcher(key: impl Into<QueryKey>, fetcher: Fetcher<T>) -> Self {
        Self {
            key: key.into(),
            fetcher,
            stale_time: None,
        }
    }

    /// Overrides the client's configured stale time for this observer.
    #[must_use]
    pub fn stale_time(mut self, stale_time: Duration) -> Self {
        self.stale_time = Some(stale_time);
        self
    }
}

impl<T> fmt::Debug for QueryOptions<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryOptions")
            .field("key", &self.key)
            .field("stale_time", &self.stale_time)
            .finish_non_exhaustive()
    }
}

type Rerender = Arc<dyn Fn() + Send + Sync>;

/// The observer's registration with its query; forwards to the current
/// re-render callback.
#[derive(Default)]
struct RerenderTarget {
    callback: RwLock<Option<Rerender>>,
}

impl Subscriber for RerenderTarget {
    fn notify(&self) {
        let callback = self.callback.read().clone();
        if let Some(callback) = callback {
            callback();
        }
    }
}

/// A consumer's view of one shared query.
pub struct QueryObserver<T> {
    client: QueryClient,
    query: Arc<Query<T>>,
    stale_time: Duration,
    target: Arc<RerenderTarget>,
}

impl<T> QueryObserver<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Resolves the shared query for `options.key` in `client`. Does not fetch.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::TypeMismatch`] if the key is registered with a
    /// different data type.
    pub fn new(client: &QueryClient, options: QueryOptions<T>) -> Result<Self, QueryError> {
        let query = client.get_query_with(options.key, options.fetcher)?;
        Ok(Self {
            client: client.clone(),
            query,
            stale_time: options.stale_time.unwrap_or(client.config().stale_time),
            target: Arc::default(),
        })
    }

    /// Like [`new`](Self::new), using the client of the enclosing
    /// [`provider`] scope.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::MissingClient`] outside a provider scope, or
    /// [`QueryError::TypeMismatch`] as `new` does.
    pub fn from_context(options: QueryOptions<T>) -> Result<Self, QueryError> {
        let client = provider::current_client()?;
        Self::new(&client, options)
    }

    /// Starts delivering change notifications to `rerender`.
    ///
    /// Replaces any previously stored callback. If the cached data is stale a
    /// fetch is started before this returns, so the callback has already run
    /// once for the switch to `is_fetching`. Waiting for the fetch function is
    /// left to the current tokio runtime; outside one, the fetch is skipped
    /// and a warning is logged.
    pub fn subscribe(&self, rerender: impl Fn() + Send + Sync + 'static) -> Unsubscribe {
        *self.target.callback.write() = Some(Arc::new(rerender));
        let unsubscribe = self.query.subscribe(self.target.clone());
        self.refetch_if_stale();
        unsubscribe
    }

    /// Invokes the stored callback. Does nothing before the first subscribe.
    pub fn notify(&self) {
        self.target.notify();
    }

    /// Returns the query's current state snapshot.
    pub fn query_state(&self) -> Arc<QueryState<T>> {
        self.query.state()
    }

    /// Whether a new subscription would trigger a fetch right now.
    pub fn is_stale(&self) -> bool {
        self.query.state().is_stale(self.stale_time)
    }

    /// Returns a stream of state snapshots.
    ///
    /// The stream yields the current state first, then the latest state after
    /// each change. Snapshots that are replaced before the stream is polled
    /// are skipped. Staleness is handled as in [`subscribe`](Self::subscribe).
    /// Dropping the stream unsubscribes it.
    pub fn watch(&self) -> QueryStream<T> {
        let (tx, rx) = watch::channel(self.query.state());
        let query = Arc::downgrade(&self.query);
        let unsubscribe = self.query.subscribe(Arc::new(move || {
            if let Some(query) = query.upgrade() {
                tx.send_replace(query.state());
            }
        }));
        self.refetch_if_stale();
        QueryStream {
            inner: WatchStream::new(rx),
            unsubscribe,
        }
    }

    /// Returns the shared query this observer reads from.
    pub fn query(&self) -> &Arc<Query<T>> {
        &self.query
    }

    /// Returns the client the query was resolved in.
    pub const fn client(&self) -> &QueryClient {
        &self.client
    }

    /// Returns the stale time in effect for this observer.
    pub const fn stale_time(&self) -> Duration {
        self.stale_time
    }

    fn refetch_if_stale(&self) {
        if !self.is_stale() {
            return;
        }
        debug!(query_hash = %self.query.query_hash(), "stale on subscribe, fetching");
        if let Err(error) = self.query.start_fetch() {
            warn!(%error, "stale query left unfetched");
        }
    }
}

impl<T> fmt::Debug for QueryObserver<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryObserver")
            .field("query_hash", self.query.query_hash())
            .field("stale_time", &self.stale_time)
            .finish_non_exhaustive()
    }
}

/// Stream of query state snapshots returned by [`QueryObserver::watch`].
pub struct QueryStream<T> {
    inner: WatchStream<Arc<QueryState<T>>>,
    unsubscribe: Unsubscribe,
}

impl<T> Stream for QueryStream<T>
where
    T: Send + Sync + 'static,
{
    type Item = Arc<QueryState<T>>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.poll_next_unpin(cx)
    }
}

impl<T> Drop for QueryStream<T> {
    fn drop(&mut self) {
        self.unsubscribe.unsubscribe();
    }
}
