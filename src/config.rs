use std::time::Duration;

/// Client-wide defaults for query behavior.
///
/// Observers that do not set their own stale time use the one configured here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryConfig {
    /// How long a successful result is considered fresh.
    ///
    /// A new subscription to a query whose last success is older than this
    /// triggers a refetch. Zero means every new subscription refetches unless
    /// the data was loaded at this very instant.
    pub stale_time: Duration,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            stale_time: Duration::ZERO, // immediately stale
        }
    }
}

impl QueryConfig {
    /// Creates a configuration with the given stale time.
    #[must_use]
    pub const fn new(stale_time: Duration) -> Self {
        Self { stale_time }
    }

    /// Returns a copy with the stale time replaced.
    #[must_use]
    pub const fn with_stale_time(mut self, stale_time: Duration) -> Self {
        self.stale_time = stale_time;
        self
    }
}
