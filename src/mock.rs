//! Controllable fetch function for tests.
//!
//! [`MockFetcher`] hands out a fetch function whose futures wait until the test
//! decides how they end. This makes overlap, ordering and failure cases
//! deterministic without real I/O or sleeps.
//!
//! ```
//! use querent::QueryClient;
//! use querent::mock::MockFetcher;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let client = QueryClient::new();
//! let mock = MockFetcher::<u32>::new();
//! let query = client.get_query("answer", mock.fetcher()).unwrap();
//!
//! let task = query.spawn_fetch();
//! mock.until_pending(1).await;
//! mock.resolve(42).unwrap();
//! task.await.unwrap();
//!
//! assert_eq!(query.state().data(), Some(&42));
//! assert_eq!(mock.calls(), 1);
//! # }
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use futures::FutureExt;
use futures::future::BoxFuture;
use tokio::sync::broadcast;

type Outcome<T> = Result<T, String>;

/// A fetch function resolved on demand.
///
/// Uses a broadcast channel internally: every invocation of the fetch function
/// subscribes, and [`resolve`](Self::resolve) or [`reject`](Self::reject)
/// completes all invocations waiting at that moment. Clones share the channel
/// and the call counter.
#[derive(Debug, Clone)]
pub struct MockFetcher<T> {
    sender: broadcast::Sender<Outcome<T>>,
    calls: Arc<AtomicUsize>,
}

impl<T: Clone + Send + 'static> MockFetcher<T> {
    /// Creates a mock that buffers up to `capacity` unread outcomes.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Creates a mock with default capacity (16).
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(16)
    }

    /// Returns a fetch function driven by this mock.
    ///
    /// Failures are plain strings, so they go through the same normalization
    /// as any non-error failure value.
    pub fn fetcher(&self) -> impl Fn() -> BoxFuture<'static, Outcome<T>> + Send + Sync + 'static {
        let sender = self.sender.clone();
        let calls = Arc::clone(&self.calls);
        move || {
            calls.fetch_add(1, Ordering::SeqCst);
            // Subscribe now, not on first poll, so an outcome sent right after
            // the call is not missed.
            let mut rx = sender.subscribe();
            async move {
                rx.recv()
                    .await
                    .unwrap_or_else(|err| Err(format!("mock fetcher stopped: {err}")))
            }
            .boxed()
        }
    }

    /// Completes every waiting invocation with `value`.
    ///
    /// # Errors
    ///
    /// Returns an error if no invocation is waiting.
    pub fn resolve(&self, value: T) -> Result<usize, broadcast::error::SendError<Outcome<T>>> {
        self.sender.send(Ok(value))
    }

    /// Fails every waiting invocation with `message`.
    ///
    /// # Errors
    ///
    /// Returns an error if no invocation is waiting.
    pub fn reject(
        &self,
        message: impl Into<String>,
    ) -> Result<usize, broadcast::error::SendError<Outcome<T>>> {
        self.sender.send(Err(message.into()))
    }

    /// How many times the fetch function has been invoked.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// How many invocations are waiting for an outcome.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Yields to the runtime until at least `count` invocations are waiting.
    pub async fn until_pending(&self, count: usize) {
        while self.pending() < count {
            tokio::task::yield_now().await;
        }
    }
}

impl<T: Clone + Send + 'static> Default for MockFetcher<T> {
    fn default() -> Self {
        Self::new()
    }
}
