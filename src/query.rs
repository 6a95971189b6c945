//! The cached unit of data behind one query key.
//!
//! A [`Query`] owns the latest [`QueryState`] for its key, the fetch function
//! that produces it, and the subscribers that want to hear about changes.
//!
//! # State machine
//!
//! ```text
//!            fetch ok
//! Pending ─────────────▶ Success ◀─┐
//!    │                      │       │ fetch ok
//!    │ fetch err            │ fetch err
//!    ▼                      ▼       │
//!  Error ◀──────────────── Error ───┘
//! ```
//!
//! `is_fetching` is an overlay on top of the status. Fetching is guarded by
//! [`FetchPhase`]: while one fetch is running, further calls to
//! [`Query::fetch`] return [`FetchOutcome::AlreadyInFlight`] and leave the
//! state alone. Their callers see the result through the next notification.
//!
//! Every change goes through [`Query::set_state`], which swaps in a new
//! snapshot and then notifies each registered subscriber once.

mod state;
mod subscriber;

pub use state::{QueryState, QueryStatus};
pub use subscriber::{Subscriber, SubscriberId, Unsubscribe};

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures::FutureExt;
use futures::future::BoxFuture;
use parking_lot::{Mutex, ReentrantMutex, RwLock};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{Instrument, debug, debug_span, instrument};

use crate::error::{FetchError, QueryError};
use crate::key::{QueryHash, QueryKey};

use subscriber::Subscribers;

/// Type-erased fetch function shared by a query for all its fetches.
pub struct Fetcher<T> {
    inner: Arc<dyn Fn() -> BoxFuture<'static, Result<T, FetchError>> + Send + Sync>,
}

impl<T: Send + 'static> Fetcher<T> {
    /// Wraps an async function. Its error type only needs `Display`; the
    /// error is normalized into a [`FetchError`] carrying that text.
    pub fn new<F, Fut, E>(fetch: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        E: fmt::Display + Send + 'static,
    {
        Self {
            inner: Arc::new(move || {
                fetch()
                    .map(|result| result.map_err(FetchError::from_display))
                    .boxed()
            }),
        }
    }

    fn call(&self) -> BoxFuture<'static, Result<T, FetchError>> {
        (self.inner)()
    }
}

impl<T> Clone for Fetcher<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> fmt::Debug for Fetcher<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Fetcher")
    }
}

/// Single-flight guard for a query's fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchPhase {
    /// No fetch is running; the next one may start.
    Idle,
    /// A fetch is running; further requests are absorbed.
    Fetching,
}

/// What a call to [`Query::fetch`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
    /// This call ran the fetch function and recorded its result.
    Settled,
    /// Another fetch was already running; nothing was started.
    AlreadyInFlight,
}

/// One cached query, shared by every consumer of its key.
pub struct Query<T> {
    key: QueryKey,
    hash: QueryHash,
    fetcher: Fetcher<T>,
    state: RwLock<Arc<QueryState<T>>>,
    phase: Mutex<FetchPhase>,
    // Serializes state changes together with their notification pass.
    // Reentrant so a subscriber may change state from inside `notify`.
    transition: ReentrantMutex<()>,
    subscribers: Arc<Subscribers>,
}

impl<T> Query<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Creates a query in the pending state. No fetch is started.
    pub fn new(key: impl Into<QueryKey>, fetcher: Fetcher<T>) -> Self {
        let key = key.into();
        let hash = key.query_hash();
        Self {
            key,
            hash,
            fetcher,
            state: RwLock::new(Arc::new(QueryState::pending())),
            phase: Mutex::new(FetchPhase::Idle),
            transition: ReentrantMutex::new(()),
            subscribers: Arc::default(),
        }
    }

    /// Returns the key this query was created with.
    pub fn key(&self) -> &QueryKey {
        &self.key
    }

    /// Returns the canonical hash the registry stores this query under.
    pub fn query_hash(&self) -> &QueryHash {
        &self.hash
    }

    /// Returns the current state snapshot.
    pub fn state(&self) -> Arc<QueryState<T>> {
        Arc::clone(&self.state.read())
    }

    /// Returns whether a fetch currently holds the single-flight slot.
    pub fn fetch_phase(&self) -> FetchPhase {
        *self.phase.lock()
    }

    /// Returns the number of registered notification targets.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    /// Registers a notification target.
    pub fn subscribe(&self, subscriber: Arc<dyn Subscriber>) -> Unsubscribe {
        self.subscribers.insert(subscriber)
    }

    /// Replaces the state with `updater(current)` and notifies every current
    /// subscriber once before returning.
    ///
    /// `updater` should be a pure function of the state it is given.
    pub fn set_state(&self, updater: impl FnOnce(&QueryState<T>) -> QueryState<T>) {
        let _transition = self.transition.lock();
        let next = updater(&self.state());
        *self.state.write() = Arc::new(next);
        self.subscribers.notify_all();
    }

    /// Runs the fetch function and records its result.
    ///
    /// If a fetch is already running this returns immediately with
    /// [`FetchOutcome::AlreadyInFlight`]. Failures never escape: they end up
    /// in [`QueryState::error`], and data from an earlier success is kept.
    #[instrument(level = "debug", skip(self), fields(query_hash = %self.hash))]
    pub async fn fetch(self: &Arc<Self>) -> FetchOutcome {
        let Some(flight) = self.begin_fetch() else {
            debug!("fetch already in flight");
            return FetchOutcome::AlreadyInFlight;
        };
        flight.run().await
    }

    /// Starts a fetch now and drives the rest of it on the current tokio
    /// runtime.
    ///
    /// The single-flight check and the switch to `is_fetching` (with its
    /// notification) happen before this returns; only waiting for the fetch
    /// function is left to the spawned task. Returns `Ok(None)` if a fetch is
    /// already running.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::NoRuntime`] outside a tokio runtime. The state is
    /// left untouched in that case.
    pub fn start_fetch(self: &Arc<Self>) -> Result<Option<JoinHandle<FetchOutcome>>, QueryError> {
        let runtime = Handle::try_current().map_err(|_| QueryError::NoRuntime {
            hash: self.hash.clone(),
        })?;
        let Some(flight) = self.begin_fetch() else {
            debug!(query_hash = %self.hash, "fetch already in flight");
            return Ok(None);
        };
        let span = debug_span!("fetch", query_hash = %self.hash);
        Ok(Some(runtime.spawn(flight.run().instrument(span))))
    }

    /// Runs [`fetch`](Self::fetch) entirely on the current tokio runtime.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime.
    pub fn spawn_fetch(self: &Arc<Self>) -> JoinHandle<FetchOutcome> {
        let query = Arc::clone(self);
        tokio::spawn(async move { query.fetch().await })
    }

    /// Claims the single-flight slot and publishes the fetching state.
    fn begin_fetch(self: &Arc<Self>) -> Option<Flight<T>> {
        let flight = {
            let mut phase = self.phase.lock();
            match *phase {
                FetchPhase::Fetching => return None,
                FetchPhase::Idle => {
                    *phase = FetchPhase::Fetching;
                    Flight {
                        query: Arc::clone(self),
                        settled: false,
                    }
                }
            }
        };
        debug!(query_hash = %self.hash, "fetch started");
        self.set_state(QueryState::begin_fetch);
        Some(flight)
    }
}

impl<T: fmt::Debug> fmt::Debug for Query<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Query")
            .field("hash", &self.hash)
            .field("state", &*self.state.read())
            .field("phase", &*self.phase.lock())
            .field("subscribers", &self.subscribers)
            .finish_non_exhaustive()
    }
}

/// Holds `FetchPhase::Fetching` for the duration of one fetch.
///
/// Dropping it returns the query to `Idle`. If the fetch future was dropped
/// before it settled, `is_fetching` is cleared here as well.
struct Flight<T>
where
    T: Clone + Send + Sync + 'static,
{
    query: Arc<Query<T>>,
    settled: bool,
}

impl<T> Flight<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Awaits the fetch function and records how it ended.
    async fn run(mut self) -> FetchOutcome {
        let query = Arc::clone(&self.query);
        match query.fetcher.call().await {
            Ok(data) => {
                debug!("fetch succeeded");
                let at = Instant::now();
                query.set_state(|state| state.succeed(data, at));
            }
            Err(error) => {
                debug!(%error, "fetch failed");
                query.set_state(|state| state.fail(error));
            }
        }
        self.settle();
        FetchOutcome::Settled
    }

    fn settle(&mut self) {
        self.settled = true;
        self.query.set_state(QueryState::settle);
    }
}

impl<T> Drop for Flight<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn drop(&mut self) {
        if !self.settled {
            debug!(query_hash = %self.query.hash, "fetch abandoned before settling");
            self.query.set_state(QueryState::settle);
        }
        *self.query.phase.lock() = FetchPhase::Idle;
    }
}
