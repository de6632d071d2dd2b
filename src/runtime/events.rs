//! Runtime event stream payloads.

use crate::types::{DocId, OpSeq};

/// Events emitted from the single-writer runtime loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VoterEvent {
    /// A new voter was inserted.
    Inserted {
        /// Inserted document id.
        id: DocId,
    },
    /// An existing voter was edited.
    Updated {
        /// Updated document id.
        id: DocId,
    },
    /// A voter was deleted.
    Deleted {
        /// Deleted document id.
        id: DocId,
    },
    /// Persistence has reached at least this op sequence.
    DurableUpTo {
        /// Highest sequence known durable.
        op_seq: OpSeq,
    },
}
