//! Record store boundary consumed by the resolver and by ingestion.

use async_trait::async_trait;
use thiserror::Error;

use crate::{
    core::store::StoreError,
    types::{DocId, Field},
    voter::{VoterDraft, VoterPatch, VoterRecord},
};

/// Maximal codepoint appended to a prefix to form an inclusive range upper bound.
pub const PREFIX_SENTINEL: char = '\u{f8ff}';

/// Upper bound for a "starts with `prefix`" range query.
pub fn prefix_upper_bound(prefix: &str) -> String {
    let mut upper = String::with_capacity(prefix.len() + PREFIX_SENTINEL.len_utf8());
    upper.push_str(prefix);
    upper.push(PREFIX_SENTINEL);
    upper
}

/// Read failure from a record source.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SourceError {
    /// The store could not serve the request.
    #[error("record store unavailable: {0}")]
    Unavailable(String),
}

/// Write failure from a record sink.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WriteError {
    /// The store refused this particular document.
    #[error("write rejected: {0}")]
    Rejected(#[from] StoreError),
    /// The caller may not write at all.
    #[error("permission denied: {0}")]
    PermissionDenied(String),
    /// The store could not be reached.
    #[error("record store unavailable: {0}")]
    Unavailable(String),
}

impl WriteError {
    /// True when retrying further documents is pointless.
    pub fn is_systemic(&self) -> bool {
        matches!(self, WriteError::PermissionDenied(_) | WriteError::Unavailable(_))
    }
}

/// Read side of the voter collection.
#[async_trait]
pub trait RecordSource: Send + Sync {
    /// Records whose `field` equals `value`.
    async fn exact_match(&self, field: Field, value: &str) -> Result<Vec<VoterRecord>, SourceError>;

    /// Records whose `field` lies within `[lower, upper]`.
    async fn range_match(
        &self,
        field: Field,
        lower: &str,
        upper: &str,
    ) -> Result<Vec<VoterRecord>, SourceError>;

    /// Every record in the collection.
    async fn fetch_all(&self) -> Result<Vec<VoterRecord>, SourceError>;
}

/// Write side of the voter collection.
#[async_trait]
pub trait RecordSink: Send + Sync {
    /// Inserts a new document and returns its id.
    async fn insert(&self, draft: VoterDraft) -> Result<DocId, WriteError>;

    /// Overwrites the fields set in `patch`.
    async fn update(&self, id: DocId, patch: VoterPatch) -> Result<(), WriteError>;

    /// Removes a document, returning it as it was.
    async fn delete(&self, id: DocId) -> Result<VoterRecord, WriteError>;
}

#[async_trait]
impl<T: RecordSource + ?Sized> RecordSource for std::sync::Arc<T> {
    async fn exact_match(&self, field: Field, value: &str) -> Result<Vec<VoterRecord>, SourceError> {
        (**self).exact_match(field, value).await
    }

    async fn range_match(
        &self,
        field: Field,
        lower: &str,
        upper: &str,
    ) -> Result<Vec<VoterRecord>, SourceError> {
        (**self).range_match(field, lower, upper).await
    }

    async fn fetch_all(&self) -> Result<Vec<VoterRecord>, SourceError> {
        (**self).fetch_all().await
    }
}
