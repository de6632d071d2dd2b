//! Shared primitive IDs and field selectors.

use serde::{Deserialize, Serialize};

/// Store-assigned document identifier.
pub type DocId = u64;
/// Monotonic operation sequence number.
pub type OpSeq = u64;

/// Name of the single voter collection.
pub const VOTERS: &str = "voters";

/// Indexed record field that can be queried by value or range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Field {
    /// Unique, uppercased voter identifier.
    VoterId,
    /// Human name as stored.
    Name,
}
