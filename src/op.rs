//! Mutation operation model and persistence wrappers.

use serde::{Deserialize, Serialize};

use crate::{
    types::{DocId, OpSeq},
    voter::{VoterPatch, VoterRecord},
};

/// Version number for serialized [`StoredOpEnvelope`] payloads.
pub const OP_FORMAT_VERSION: u16 = 1;

/// Immutable operation appended to the journal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Op {
    /// Insert a fully materialized voter.
    Insert {
        /// Inserted record.
        voter: VoterRecord,
    },
    /// Field-level overwrite of an existing voter.
    Patch {
        /// Document id to mutate.
        id: DocId,
        /// Normalized fields to overwrite.
        patch: VoterPatch,
    },
    /// Remove a voter.
    Delete {
        /// Record as it was at deletion time.
        voter: VoterRecord,
    },
}

/// Journal row metadata plus operation payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredOp {
    /// Monotonic operation sequence.
    pub seq: OpSeq,
    /// Operation timestamp in milliseconds.
    pub ts_ms: u64,
    /// Operation body.
    pub op: Op,
}

/// Versioned wrapper for stable on-disk payload decoding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredOpEnvelope {
    /// Payload format version.
    pub format_version: u16,
    /// Wrapped operation.
    pub stored: StoredOp,
}

impl StoredOpEnvelope {
    /// Constructs an envelope using [`OP_FORMAT_VERSION`].
    pub fn new(stored: StoredOp) -> Self {
        Self {
            format_version: OP_FORMAT_VERSION,
            stored,
        }
    }
}
