//! Keyed registry of shared queries.

use std::any::Any;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use dashmap::DashMap;
use tracing::debug;

use crate::config::QueryConfig;
use crate::error::QueryError;
use crate::key::{QueryHash, QueryKey};
use crate::query::{Fetcher, Query};

type Entry = Arc<dyn Any + Send + Sync>;

/// Registry that hands out one [`Query`] per query hash.
///
/// The first request for a key creates the query; every later request for an
/// equivalent key gets the same instance back, so concurrent consumers share
/// one cache entry and one in-flight fetch. Queries are never evicted.
///
/// Cloning is cheap and clones share the registry.
///
/// # Example
///
/// ```
/// use querent::{QueryClient, QueryConfig};
/// use std::time::Duration;
///
/// let client = QueryClient::with_config(QueryConfig::new(Duration::from_secs(30)));
///
/// let a = client.get_query("user-123", || async { Ok::<_, String>(1) }).unwrap();
/// let b = client.get_query("user-123", || async { Ok::<_, String>(2) }).unwrap();
/// assert!(std::sync::Arc::ptr_eq(&a, &b));
/// ```
#[derive(Debug, Clone)]
pub struct QueryClient {
    queries: Arc<DashMap<QueryHash, Entry>>,
    config: QueryConfig,
}

impl QueryClient {
    /// Creates a client with default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(QueryConfig::default())
    }

    /// Creates a client with the given configuration.
    #[must_use]
    pub fn with_config(config: QueryConfig) -> Self {
        Self {
            queries: Arc::new(DashMap::new()),
            config,
        }
    }

    /// Returns the client-wide configuration.
    pub const fn config(&self) -> &QueryConfig {
        &self.config
    }

    /// Returns the query for `key`, creating it with `fetch` if needed.
    ///
    /// When the query already exists, `fetch` is ignored: the fetch function
    /// of the first registration is used for the life of the client.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::TypeMismatch`] if the key is registered with a
    /// different data type.
    pub fn get_query<T, F, Fut, E>(
        &self,
        key: impl Into<QueryKey>,
        fetch: F,
    ) -> Result<Arc<Query<T>>, QueryError>
    where
        T: Clone + Send + Sync + 'static,
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        E: fmt::Display + Send + 'static,
    {
        self.resolve(key.into(), || Fetcher::new(fetch))
    }

    /// Like [`get_query`](Self::get_query) with an already wrapped fetcher.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::TypeMismatch`] if the key is registered with a
    /// different data type.
    pub fn get_query_with<T>(
        &self,
        key: impl Into<QueryKey>,
        fetcher: Fetcher<T>,
    ) -> Result<Arc<Query<T>>, QueryError>
    where
        T: Clone + Send + Sync + 'static,
    {
        self.resolve(key.into(), move || fetcher)
    }

    /// Looks up an existing query without registering one.
    ///
    /// Returns `None` if the key is unknown or holds a different data type.
    pub fn find_query<T>(&self, key: &QueryKey) -> Option<Arc<Query<T>>>
    where
        T: Clone + Send + Sync + 'static,
    {
        let entry = Arc::clone(self.queries.get(&key.query_hash())?.value());
        entry.downcast::<Query<T>>().ok()
    }

    /// Returns `true` if a query is registered for `key`.
    pub fn contains(&self, key: &QueryKey) -> bool {
        self.queries.contains_key(&key.query_hash())
    }

    /// Number of queries registered so far.
    pub fn len(&self) -> usize {
        self.queries.len()
    }

    /// Returns `true` if no query has been registered yet.
    pub fn is_empty(&self) -> bool {
        self.queries.is_empty()
    }

    /// Hashes of every registered query, in no particular order.
    pub fn query_hashes(&self) -> Vec<QueryHash> {
        self.queries.iter().map(|entry| entry.key().clone()).collect()
    }

    fn resolve<T>(
        &self,
        key: QueryKey,
        fetcher: impl FnOnce() -> Fetcher<T>,
    ) -> Result<Arc<Query<T>>, QueryError>
    where
        T: Clone + Send + Sync + 'static,
    {
        let hash = key.query_hash();
        let entry = {
            let slot = self.queries.entry(hash.clone()).or_insert_with(|| {
                debug!(query_hash = %hash, "registering query");
                Arc::new(Query::new(key, fetcher())) as Entry
            });
            Arc::clone(slot.value())
        };
        entry
            .downcast::<Query<T>>()
            .map_err(|_| QueryError::TypeMismatch { hash })
    }
}

impl Default for QueryClient {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockFetcher;
    use std::time::Duration;

    #[test]
    fn test_query_client_new() {
        let client = QueryClient::new();
        assert!(client.is_empty());
        assert_eq!(client.config().stale_time, Duration::from_secs(0));
    }

    #[test]
    fn test_query_client_with_config() {
        let client = QueryClient::with_config(QueryConfig::new(Duration::from_secs(30)));
        assert_eq!(client.config().stale_time, Duration::from_secs(30));
    }

    #[test]
    fn test_same_key_returns_same_query() {
        let client = QueryClient::new();
        let first = MockFetcher::<i32>::new();
        let second = MockFetcher::<i32>::new();

        let a = client.get_query("posts", first.fetcher()).expect("first lookup");
        let b = client.get_query("posts", second.fetcher()).expect("second lookup");

        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(client.len(), 1);
    }

    #[test]
    fn test_equivalent_list_keys_share_query() {
        let client = QueryClient::new();
        let mock = MockFetcher::<i32>::new();

        let a = client
            .get_query(crate::query_key!["todos", 1], mock.fetcher())
            .expect("first lookup");
        let b = client
            .get_query(vec![crate::KeyPart::from("todos"), 1_i64.into()], mock.fetcher())
            .expect("second lookup");

        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn test_different_keys_create_different_queries() {
        let client = QueryClient::new();
        let mock = MockFetcher::<i32>::new();

        let a = client.get_query("user-123", mock.fetcher()).expect("lookup");
        let b = client.get_query("user-456", mock.fetcher()).expect("lookup");

        assert!(!Arc::ptr_eq(&a, &b));
        assert_eq!(client.len(), 2);

        let mut hashes = client.query_hashes();
        hashes.sort();
        assert_eq!(
            hashes,
            vec![
                QueryKey::from("user-123").query_hash(),
                QueryKey::from("user-456").query_hash(),
            ]
        );
    }

    #[test]
    fn test_same_key_different_type_is_rejected() {
        let client = QueryClient::new();
        let numbers = MockFetcher::<i32>::new();
        let strings = MockFetcher::<String>::new();

        client.get_query("data", numbers.fetcher()).expect("first lookup");
        let err = client
            .get_query("data", strings.fetcher())
            .expect_err("type differs");

        assert_eq!(
            err,
            QueryError::TypeMismatch {
                hash: QueryKey::from("data").query_hash()
            }
        );
        assert_eq!(client.len(), 1);
    }

    #[test]
    fn test_find_query_does_not_register() {
        let client = QueryClient::new();
        let key = QueryKey::from("posts");
        assert!(client.find_query::<i32>(&key).is_none());
        assert!(!client.contains(&key));

        let mock = MockFetcher::<i32>::new();
        let created = client.get_query(key.clone(), mock.fetcher()).expect("lookup");
        let found = client.find_query::<i32>(&key).expect("registered");
        assert!(Arc::ptr_eq(&created, &found));
        assert!(client.find_query::<String>(&key).is_none());
        assert!(client.contains(&key));
    }

    #[test]
    fn test_clones_share_registry() {
        let client = QueryClient::new();
        let clone = client.clone();
        let mock = MockFetcher::<i32>::new();

        let a = client.get_query("posts", mock.fetcher()).expect("lookup");
        let b = clone.get_query("posts", mock.fetcher()).expect("lookup");
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[tokio::test]
    async fn test_first_registration_fetcher_wins() {
        let client = QueryClient::new();
        let first = MockFetcher::<i32>::new();
        let second = MockFetcher::<i32>::new();

        client.get_query("posts", first.fetcher()).expect("lookup");
        let query = client.get_query("posts", second.fetcher()).expect("lookup");

        let task = query.spawn_fetch();
        first.until_pending(1).await;
        first.resolve(1).expect("fetch is waiting");
        task.await.expect("fetch task");

        assert_eq!(first.calls(), 1);
        assert_eq!(second.calls(), 0);
        assert_eq!(query.state().data(), Some(&1));
    }

    #[test]
    fn test_get_query_with_prebuilt_fetcher() {
        let client = QueryClient::new();
        let mock = MockFetcher::<i32>::new();
        let fetcher = Fetcher::new(mock.fetcher());

        let a = client.get_query_with("posts", fetcher.clone()).expect("lookup");
        let b = client.get_query_with("posts", fetcher).expect("lookup");
        assert!(Arc::ptr_eq(&a, &b));
    }
}
