use std::time::Duration;

use tokio::time::Instant;

use crate::error::FetchError;

/// Where a query is in its lifecycle.
///
/// `is_fetching` on [`QueryState`] is tracked separately, so a query can be
/// `Success` while a refetch is running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryStatus {
    /// No result has been resolved yet.
    Pending,
    /// The last fetch produced data.
    Success,
    /// The last fetch failed.
    Error,
}

/// Snapshot of a query's cached result.
#[derive(Debug, Clone)]
pub struct QueryState<T> {
    /// Outcome of the most recent completed fetch.
    pub status: QueryStatus,
    /// Whether a fetch is outstanding.
    pub is_fetching: bool,
    /// Data from the most recent success. Kept when a later fetch fails.
    pub data: Option<T>,
    /// Failure of the most recent fetch. Cleared when a new fetch starts.
    pub error: Option<FetchError>,
    /// When data last arrived. Only a successful fetch moves it.
    pub last_updated: Option<Instant>,
}

impl<T> QueryState<T> {
    /// The state of a query nobody has fetched yet.
    #[must_use]
    pub const fn pending() -> Self {
        Self {
            status: QueryStatus::Pending,
            is_fetching: true,
            data: None,
            error: None,
            last_updated: None,
        }
    }

    /// Returns the cached data, if any.
    pub const fn data(&self) -> Option<&T> {
        self.data.as_ref()
    }

    /// Returns `true` if no fetch has resolved yet.
    pub const fn is_pending(&self) -> bool {
        matches!(self.status, QueryStatus::Pending)
    }

    /// Returns `true` if the last fetch succeeded.
    pub const fn is_success(&self) -> bool {
        matches!(self.status, QueryStatus::Success)
    }

    /// Returns `true` if the last fetch failed.
    pub const fn is_error(&self) -> bool {
        matches!(self.status, QueryStatus::Error)
    }

    /// Checks whether this state should be refetched given a stale time.
    ///
    /// A state that never succeeded is always stale.
    #[must_use]
    pub fn is_stale(&self, stale_time: Duration) -> bool {
        self.last_updated
            .is_none_or(|updated| updated.elapsed() > stale_time)
    }
}

impl<T: Clone> QueryState<T> {
    /// A fetch started: clears the previous error.
    #[must_use]
    pub fn begin_fetch(&self) -> Self {
        Self {
            is_fetching: true,
            error: None,
            ..self.clone()
        }
    }

    /// A fetch resolved with `data` at `at`.
    #[must_use]
    pub fn succeed(&self, data: T, at: Instant) -> Self {
        Self {
            status: QueryStatus::Success,
            data: Some(data),
            last_updated: Some(at),
            ..self.clone()
        }
    }

    /// A fetch failed; previous data stays available.
    #[must_use]
    pub fn fail(&self, error: FetchError) -> Self {
        Self {
            status: QueryStatus::Error,
            error: Some(error),
            ..self.clone()
        }
    }

    /// The fetch is over, whatever its result.
    #[must_use]
    pub fn settle(&self) -> Self {
        Self {
            is_fetching: false,
            ..self.clone()
        }
    }
}

impl<T> Default for QueryState<T> {
    fn default() -> Self {
        Self::pending()
    }
}
