//! Turns raw input into a [`SearchResult`].

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::voter::VoterRecord;

use super::{
    SearchConfig, SearchError,
    classify::classify,
    dispatch::dispatch,
    phonetic::{self, NameAliasTable},
    source::RecordSource,
};

/// Suggestions shown with a not-found answer.
pub const NOT_FOUND_TIPS: [&str; 3] = [
    "Try searching with full name",
    "Use Voter ID if available",
    "Names can be in English or Marathi",
];

/// Answer when the store cannot be searched.
pub const UNAVAILABLE_MESSAGE: &str =
    "I'm sorry, there was an error searching the voter database. Please try again in a moment.";

/// Answer to an empty query.
pub const BLANK_QUERY_MESSAGE: &str = "Please enter a Voter ID or a name to search.";

/// Why a search produced no records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    /// The query was blank.
    InvalidQuery,
    /// Nothing matched.
    NotFound,
    /// A required lookup failed or the deadline passed.
    StoreUnavailable,
}

/// The contract handed to the presentation layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum SearchResult {
    /// No records; `message` is shown to the user.
    Error {
        /// User-facing text.
        message: String,
        /// Search hints, present for not-found answers.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        tips: Option<Vec<String>>,
        /// Machine-readable cause.
        reason: FailureReason,
    },
    /// At least one record matched.
    Success {
        /// Capped records in discovery order.
        records: Vec<VoterRecord>,
        /// Match count before capping.
        #[serde(rename = "totalFound")]
        total_found: usize,
        /// The query as the user typed it, trimmed.
        query: String,
    },
}

impl SearchResult {
    /// True for [`SearchResult::Success`].
    pub fn is_success(&self) -> bool {
        matches!(self, SearchResult::Success { .. })
    }
}

impl From<Found> for SearchResult {
    fn from(found: Found) -> Self {
        SearchResult::Success {
            records: found.records,
            total_found: found.total_found,
            query: found.query,
        }
    }
}

impl From<SearchError> for SearchResult {
    fn from(err: SearchError) -> Self {
        match err {
            SearchError::Invalid(_) => SearchResult::Error {
                message: BLANK_QUERY_MESSAGE.to_string(),
                tips: None,
                reason: FailureReason::InvalidQuery,
            },
            SearchError::NotFound { query } => SearchResult::Error {
                message: format!(
                    "No voter record found for \"{query}\". Please check your input and try again."
                ),
                tips: Some(NOT_FOUND_TIPS.iter().map(|t| t.to_string()).collect()),
                reason: FailureReason::NotFound,
            },
            SearchError::StoreUnavailable(_) => SearchResult::Error {
                message: UNAVAILABLE_MESSAGE.to_string(),
                tips: None,
                reason: FailureReason::StoreUnavailable,
            },
        }
    }
}

/// A successful resolution before it is shaped for presentation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Found {
    /// At most `result_cap` records, in discovery order.
    pub records: Vec<VoterRecord>,
    /// Deduplicated match count before capping.
    pub total_found: usize,
    /// Trimmed user input.
    pub query: String,
    /// Whether the substring scan produced the records.
    pub fallback_used: bool,
}

/// Stateless voter search over a [`RecordSource`].
pub struct Resolver<S> {
    source: S,
    table: Arc<NameAliasTable>,
    config: SearchConfig,
}

impl<S: RecordSource> Resolver<S> {
    /// Uses the process-wide alias table and default tunables.
    pub fn new(source: S) -> Self {
        Self {
            source,
            table: phonetic::global(),
            config: SearchConfig::default(),
        }
    }

    /// Resolves names against `table` instead of the global one.
    pub fn with_table(mut self, table: Arc<NameAliasTable>) -> Self {
        self.table = table;
        self
    }

    /// Overrides cap, deadline and fuzzy threshold.
    pub fn with_config(mut self, config: SearchConfig) -> Self {
        self.config = config;
        self
    }

    /// The store being searched.
    pub fn source(&self) -> &S {
        &self.source
    }

    /// Active tunables.
    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    /// Classifies `raw`, runs the query plan under the configured deadline and
    /// caps the matches.
    pub async fn try_resolve(&self, raw: &str) -> Result<Found, SearchError> {
        let query = classify(raw)?;
        let original = raw.trim().to_string();

        let dispatched = tokio::time::timeout(
            self.config.deadline,
            dispatch(&self.source, &query, &self.table, &self.config),
        )
        .await
        .map_err(|_| {
            SearchError::StoreUnavailable(format!(
                "search deadline of {} ms exceeded",
                self.config.deadline.as_millis()
            ))
        })??;

        debug!(
            query = %original,
            matches = dispatched.records.len(),
            lookups = dispatched.lookups,
            failed = dispatched.failed_lookups,
            fallback = dispatched.fallback_used,
            "voter search dispatched"
        );

        if dispatched.records.is_empty() {
            return Err(SearchError::NotFound { query: original });
        }

        let total_found = dispatched.records.len();
        let mut records = dispatched.records;
        records.truncate(self.config.result_cap);

        Ok(Found {
            records,
            total_found,
            query: original,
            fallback_used: dispatched.fallback_used,
        })
    }

    /// Like [`Resolver::try_resolve`], mapped onto [`SearchResult`].
    pub async fn resolve(&self, raw: &str) -> SearchResult {
        match self.try_resolve(raw).await {
            Ok(found) => found.into(),
            Err(err) => {
                if let SearchError::StoreUnavailable(cause) = &err {
                    warn!(%cause, "voter search failed");
                }
                err.into()
            }
        }
    }
}
