//! Executes a classified query against a [`RecordSource`].

use hashbrown::HashSet;
use tracing::{debug, warn};

use crate::{types::Field, voter::VoterRecord};

use super::{
    SearchConfig, SearchError,
    classify::SearchQuery,
    phonetic::NameAliasTable,
    source::{RecordSource, SourceError, prefix_upper_bound},
};

/// Variants shorter than this only get an exact lookup.
pub const MIN_PREFIX_LEN: usize = 2;

/// Deduplicated, uncapped matches in discovery order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Dispatched {
    /// Every match, deduplicated by voter id.
    pub records: Vec<VoterRecord>,
    /// Store calls issued, fallback scan included.
    pub lookups: usize,
    /// Variant lookups that failed and were skipped.
    pub failed_lookups: usize,
    /// Whether the substring scan ran.
    pub fallback_used: bool,
}

/// Accumulates records keyed by voter id; the first occurrence wins.
#[derive(Debug, Default)]
pub struct Dedup {
    seen: HashSet<String>,
    records: Vec<VoterRecord>,
}

impl Dedup {
    /// Keeps `record` unless its voter id was already seen.
    pub fn push(&mut self, record: VoterRecord) -> bool {
        if !self.seen.insert(record.voter_id.clone()) {
            return false;
        }
        self.records.push(record);
        true
    }

    /// Pushes every record, returning how many were new.
    pub fn extend(&mut self, batch: impl IntoIterator<Item = VoterRecord>) -> usize {
        let mut added = 0;
        for record in batch {
            if self.push(record) {
                added += 1;
            }
        }
        added
    }

    /// Records kept so far.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// True before the first record is kept.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Records in discovery order.
    pub fn into_records(self) -> Vec<VoterRecord> {
        self.records
    }
}

/// Runs the query plan for a classified query against `source`.
pub async fn dispatch<S: RecordSource + ?Sized>(
    source: &S,
    query: &SearchQuery,
    table: &NameAliasTable,
    config: &SearchConfig,
) -> Result<Dispatched, SearchError> {
    match query {
        SearchQuery::Id(id) => {
            let records = source
                .exact_match(Field::VoterId, id)
                .await
                .map_err(unavailable)?;
            let mut dedup = Dedup::default();
            dedup.extend(records);
            Ok(Dispatched {
                records: dedup.into_records(),
                lookups: 1,
                ..Dispatched::default()
            })
        }
        SearchQuery::Name(name) => dispatch_name(source, name, table, config).await,
    }
}

async fn dispatch_name<S: RecordSource + ?Sized>(
    source: &S,
    name: &str,
    table: &NameAliasTable,
    config: &SearchConfig,
) -> Result<Dispatched, SearchError> {
    let variants = table.generate_variants(name);
    debug!(?variants, "name query plan");

    let mut dedup = Dedup::default();
    let mut out = Dispatched::default();

    for variant in &variants {
        out.lookups += 1;
        match source.exact_match(Field::Name, variant).await {
            Ok(batch) => {
                dedup.extend(batch);
            }
            Err(err) => {
                out.failed_lookups += 1;
                warn!(%variant, error = %err, "exact name lookup failed, skipping");
            }
        }

        if variant.chars().count() < MIN_PREFIX_LEN {
            continue;
        }

        out.lookups += 1;
        let upper = prefix_upper_bound(variant);
        match source.range_match(Field::Name, variant, &upper).await {
            Ok(batch) => {
                dedup.extend(batch);
            }
            Err(err) => {
                out.failed_lookups += 1;
                warn!(%variant, error = %err, "prefix name lookup failed, skipping");
            }
        }
    }

    if dedup.is_empty() {
        out.lookups += 1;
        out.fallback_used = true;
        let query_lower = name.to_lowercase();
        let everyone = source.fetch_all().await.map_err(unavailable)?;
        let matched = dedup.extend(
            everyone
                .into_iter()
                .filter(|r| fuzzy_matches(&r.name, &query_lower, config.min_fuzzy_len)),
        );
        debug!(matched, "fuzzy fallback scan");
    }

    out.records = dedup.into_records();
    Ok(out)
}

/// Case-insensitive containment in either direction.
///
/// Empty names never match, and a name must have at least `min_reverse_len`
/// characters to match by being contained in the query.
pub fn fuzzy_matches(candidate: &str, query_lower: &str, min_reverse_len: usize) -> bool {
    let name = candidate.trim().to_lowercase();
    if name.is_empty() {
        return false;
    }
    name.contains(query_lower)
        || (name.chars().count() >= min_reverse_len && query_lower.contains(name.as_str()))
}

fn unavailable(err: SourceError) -> SearchError {
    SearchError::StoreUnavailable(err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rec(id: u64, voter_id: &str, name: &str) -> VoterRecord {
        VoterRecord {
            id,
            serial: None,
            name: name.to_string(),
            sex: None,
            voter_id: voter_id.to_string(),
            mobile: None,
        }
    }

    #[test]
    fn dedup_keeps_first_occurrence() {
        let mut dedup = Dedup::default();
        assert_eq!(dedup.extend([rec(1, "A1", "first"), rec(2, "B2", "b")]), 2);
        assert_eq!(dedup.extend([rec(3, "A1", "second"), rec(4, "C3", "c")]), 1);
        let out = dedup.into_records();
        assert_eq!(out.len(), 3);
        assert_eq!(out[0].name, "first");
    }

    #[test]
    fn fuzzy_both_directions_with_reverse_threshold() {
        assert!(fuzzy_matches("Rahul Sharma", "sharma", 2));
        assert!(fuzzy_matches("Rahul", "rahul kumar sharma", 2));
        assert!(!fuzzy_matches("R", "rahul", 2));
        assert!(fuzzy_matches("R", "rahul", 1));
        assert!(!fuzzy_matches("", "rahul", 0));
        assert!(!fuzzy_matches("Priya", "rahul", 2));
    }
}
