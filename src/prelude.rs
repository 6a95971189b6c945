//! Prelude module for convenient imports.
//!
//! ```
//! use querent::prelude::*;
//! ```
//!
//! # What's included
//!
//! - [`QueryClient`] - The shared query registry
//! - [`QueryObserver`] and [`QueryOptions`] - Per-consumer subscriptions
//! - [`QueryState`] and [`QueryStatus`] - What consumers render from
//! - [`FetchError`] and [`QueryError`] - Failure types
//! - [`query_key!`](crate::query_key) - Mixed string/number keys

pub use crate::client::QueryClient;
pub use crate::config::QueryConfig;
pub use crate::error::{FetchError, QueryError};
pub use crate::key::{KeyPart, QueryKey};
pub use crate::observer::{QueryObserver, QueryOptions};
pub use crate::query::{QueryState, QueryStatus, Unsubscribe};
pub use crate::query_key;
