//! Voter roll lookup: phonetic name and voter-id search over an authoritative
//! in-memory store, with SQLite journaling and bulk tabular ingestion.
//!
//! # Examples
//!
//! In-memory usage with [`core::store::VoterStore`]:
//! ```
//! use voterlookup::{core::store::VoterStore, types::Field, voter::VoterDraft};
//!
//! let mut store = VoterStore::new();
//! let (id, _op) = store.insert(VoterDraft {
//!     name: "राहुल शर्मा".to_string(),
//!     voter_id: "amb5778105".to_string(),
//!     ..VoterDraft::default()
//! }).expect("insert");
//! assert_eq!(id, 1);
//! assert_eq!(store.exact_match(Field::VoterId, "AMB5778105").len(), 1);
//! ```
//!
//! Searching through the runtime with a SQLite journal:
//! ```no_run
//! use voterlookup::{
//!     persist::sqlite::SqliteOpSink,
//!     runtime::handle::{spawn_voterdb, RuntimeConfig},
//!     search::{Resolver, SearchResult},
//! };
//!
//! # #[tokio::main]
//! # async fn main() {
//! let sink = SqliteOpSink::open("voters.db").expect("open sqlite");
//! let store = sink.load_store().expect("replay journal");
//! let handle = spawn_voterdb(store, Some(Box::new(sink)), RuntimeConfig::default());
//! let resolver = Resolver::new(handle.clone());
//! if let SearchResult::Success { records, .. } = resolver.resolve("Rahul").await {
//!     println!("{} matches", records.len());
//! }
//! handle.shutdown().await.expect("shutdown");
//! # }
//! ```
#![deny(missing_docs)]

/// Operator sessions and record maintenance.
pub mod admin;
/// Environment configuration.
pub mod config;
/// Core in-memory store and index helpers.
pub mod core;
/// Bulk CSV and spreadsheet ingestion.
pub mod ingest;
/// Mutation op model and persistence wrapper types.
pub mod op;
/// Persistence abstraction and SQLite implementation.
pub mod persist;
/// Voter information receipts.
pub mod receipt;
/// Single-writer runtime handle and events.
pub mod runtime;
/// Query classification, variant expansion and resolution.
pub mod search;
/// Shared primitive types.
pub mod types;
/// Voter records, drafts and patches.
pub mod voter;
