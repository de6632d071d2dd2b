//! Voter search: query classification, phonetic expansion, dispatch and resolution.

use std::time::Duration;

use thiserror::Error;

/// Voter id versus name classification.
pub mod classify;
/// Query plan execution and deduplication.
pub mod dispatch;
/// Name alias table and variant generation.
pub mod phonetic;
/// Top-level resolver and presentation contract.
pub mod resolve;
/// Record store traits.
pub mod source;

pub use classify::{SearchQuery, ValidationError, classify};
pub use resolve::{FailureReason, Found, Resolver, SearchResult};

/// Default number of records returned to the caller.
pub const DEFAULT_RESULT_CAP: usize = 10;

/// Tunables for a single resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchConfig {
    /// Records returned after deduplication; `totalFound` is reported uncapped.
    pub result_cap: usize,
    /// Budget for every store call of one request, fallback included.
    pub deadline: Duration,
    /// Minimum name length for the "query contains name" fuzzy direction.
    pub min_fuzzy_len: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            result_cap: DEFAULT_RESULT_CAP,
            deadline: Duration::from_secs(5),
            min_fuzzy_len: 2,
        }
    }
}

/// Why a resolution produced no records.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SearchError {
    /// The query failed validation before any store access.
    #[error(transparent)]
    Invalid(#[from] ValidationError),
    /// Every lookup succeeded and nothing matched.
    #[error("no voter record found for {query:?}")]
    NotFound {
        /// Trimmed user input.
        query: String,
    },
    /// A required lookup failed or the deadline passed.
    #[error("voter store unavailable: {0}")]
    StoreUnavailable(String),
}
