//! Scoped access to a shared [`QueryClient`].
//!
//! UI trees usually want one client threaded through every component. Passing
//! it explicitly to [`QueryObserver::new`](crate::QueryObserver::new) is always
//! possible; this module offers a task-scoped alternative. Looking the client
//! up outside a scope fails immediately with [`QueryError::MissingClient`].
//!
//! ```
//! use querent::{QueryClient, QueryError, provider};
//!
//! let client = QueryClient::new();
//! provider::provide_sync(client, || {
//!     assert!(provider::current_client().is_ok());
//! });
//! assert_eq!(provider::current_client().unwrap_err(), QueryError::MissingClient);
//! ```
//!
//! The scope does not follow work handed to `tokio::spawn`; spawned tasks
//! need their own scope.

use std::future::Future;

use crate::client::QueryClient;
use crate::error::QueryError;

tokio::task_local! {
    static CURRENT_CLIENT: QueryClient;
}

/// Runs `future` with `client` available through [`current_client`].
pub async fn provide<F: Future>(client: QueryClient, future: F) -> F::Output {
    CURRENT_CLIENT.scope(client, future).await
}

/// Runs `f` with `client` available through [`current_client`].
pub fn provide_sync<R>(client: QueryClient, f: impl FnOnce() -> R) -> R {
    CURRENT_CLIENT.sync_scope(client, f)
}

/// Returns the client of the enclosing scope.
///
/// # Errors
///
/// Returns [`QueryError::MissingClient`] when called outside [`provide`] or
/// [`provide_sync`].
pub fn current_client() -> Result<QueryClient, QueryError> {
    CURRENT_CLIENT
        .try_with(QueryClient::clone)
        .map_err(|_| QueryError::MissingClient)
}
