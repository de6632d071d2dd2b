//! In-memory authoritative voter store and index helpers.

/// Ordered field indices.
pub mod indices;
/// Authoritative voter store.
pub mod store;
