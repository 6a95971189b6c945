use std::fmt;

use thiserror::Error;

use crate::key::QueryHash;

/// Why a fetch function failed.
///
/// Every failure value a fetcher produces is normalized into this type by its
/// `Display` text, so `QueryState::error` is always either `None` or a
/// `FetchError` carrying a readable message.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct FetchError {
    message: String,
}

impl FetchError {
    /// Creates a fetch error with the given message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// Wraps any displayable failure value, keeping its description.
    pub fn from_display(failure: impl fmt::Display) -> Self {
        Self::new(failure.to_string())
    }

    /// The failure description.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<&str> for FetchError {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

impl From<String> for FetchError {
    fn from(message: String) -> Self {
        Self::new(message)
    }
}

/// Caller-facing configuration faults.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueryError {
    /// An observer was built from context outside a provider scope.
    #[error("no QueryClient in scope: run the caller inside `provide` or `provide_sync`")]
    MissingClient,

    /// The key is registered with a different data type.
    #[error("query {hash} is already registered with a different data type")]
    TypeMismatch { hash: QueryHash },

    /// A fetch was requested outside a tokio runtime.
    #[error("no tokio runtime to drive the fetch for query {hash}")]
    NoRuntime { hash: QueryHash },
}
