//! Op journal abstraction and its SQLite implementation.

pub mod sqlite;

use thiserror::Error;

use crate::{
    core::store::{StoreError, StoreSnapshotV1},
    op::StoredOp,
    types::OpSeq,
};

/// Journal failure.
#[derive(Debug, Error)]
pub enum PersistError {
    /// SQLite reported an error.
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),
    /// A payload failed to encode or decode.
    #[error("serde: {0}")]
    Serde(#[from] serde_json::Error),
    /// Any other journal fault.
    #[error("{0}")]
    Message(String),
}

impl From<StoreError> for PersistError {
    fn from(value: StoreError) -> Self {
        Self::Message(format!("store error: {value}"))
    }
}

/// Result alias for journal operations.
pub type PersistResult<T> = Result<T, PersistError>;

/// Destination for journaled ops. Called from a blocking worker thread.
pub trait OpSink: Send {
    /// Appends `ops` in order and returns the last seq written.
    fn append_ops(&mut self, ops: &[StoredOp]) -> PersistResult<OpSeq>;
    /// Makes appended ops durable.
    fn flush(&mut self) -> PersistResult<()> {
        Ok(())
    }
    /// Stores a snapshot covering ops through `last_seq`.
    fn write_snapshot(&mut self, _snapshot: &StoreSnapshotV1, _last_seq: OpSeq) -> PersistResult<()> {
        Ok(())
    }
    /// Drops ops through `seq`, returning how many went.
    fn compact_through(&mut self, _seq: OpSeq) -> PersistResult<usize> {
        Ok(0)
    }
}
