use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::voter::normalize_voter_id;

/// Minimum length of a token treated as a voter id.
pub const MIN_VOTER_ID_LEN: usize = 6;

/// Input rejected before any lookup.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// Nothing but whitespace.
    #[error("query is blank")]
    BlankQuery,
}

/// A user query after classification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SearchQuery {
    /// Uppercased voter id.
    Id(String),
    /// Trimmed free-text name.
    Name(String),
}

/// Classifies raw input as a voter id (`^[A-Za-z0-9]{6,}$` after trimming) or a name.
pub fn classify(raw: &str) -> Result<SearchQuery, ValidationError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::BlankQuery);
    }

    if looks_like_voter_id(trimmed) {
        Ok(SearchQuery::Id(normalize_voter_id(trimmed)))
    } else {
        Ok(SearchQuery::Name(trimmed.to_string()))
    }
}

/// ASCII alphanumerics only, at least [`MIN_VOTER_ID_LEN`] long.
pub fn looks_like_voter_id(s: &str) -> bool {
    s.len() >= MIN_VOTER_ID_LEN && s.bytes().all(|b| b.is_ascii_alphanumeric())
}
