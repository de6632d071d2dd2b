//! Latin-to-Devanagari name alias table.
//!
//! This is a curated lookup, not a transliterator: only names present in the
//! table get alternatives, and lookup is by exact lowercase key.

use std::{
    fmt,
    path::Path,
    sync::{Arc, OnceLock},
};

use hashbrown::HashMap;
use serde::{Deserialize, Deserializer, de};
use thiserror::Error;
use tracing::error;

const BUILTIN_NAMES: &str = include_str!("names.json");

static GLOBAL_TABLE: OnceLock<Arc<NameAliasTable>> = OnceLock::new();

/// Failure loading a custom alias table.
#[derive(Debug, Error)]
pub enum AliasTableError {
    /// The file could not be read.
    #[error("reading alias table: {0}")]
    Io(#[from] std::io::Error),
    /// The file is not a valid table.
    #[error("parsing alias table: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Mapping of lowercase Latin name to its script alternatives, in table order.
///
/// Keys are trimmed and lowercased on load. Two keys that collapse to the
/// same name are rejected rather than merged.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NameAliasTable {
    aliases: HashMap<String, Vec<String>>,
}

impl<'de> Deserialize<'de> for NameAliasTable {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct AliasMapVisitor;

        impl<'de> de::Visitor<'de> for AliasMapVisitor {
            type Value = NameAliasTable;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("a map of Latin names to lists of alternative spellings")
            }

            fn visit_map<A: de::MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
                let mut aliases = HashMap::with_capacity(map.size_hint().unwrap_or(0));
                while let Some((key, alternatives)) = map.next_entry::<String, Vec<String>>()? {
                    let normalized = key.trim().to_lowercase();
                    if aliases.insert(normalized.clone(), alternatives).is_some() {
                        return Err(de::Error::custom(format!(
                            "alias key {key:?} collides with another entry for {normalized:?}"
                        )));
                    }
                }
                Ok(NameAliasTable { aliases })
            }
        }

        deserializer.deserialize_map(AliasMapVisitor)
    }
}

impl NameAliasTable {
    /// The table shipped with the crate.
    pub fn builtin() -> Self {
        Self::from_json_str(BUILTIN_NAMES).unwrap_or_else(|err| {
            error!(error = %err, "builtin name alias table is malformed");
            Self::default()
        })
    }

    /// Parses a JSON object of name to spellings.
    pub fn from_json_str(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Reads and parses a JSON table file.
    pub fn from_json_path(path: impl AsRef<Path>) -> Result<Self, AliasTableError> {
        let raw = std::fs::read_to_string(path)?;
        Ok(Self::from_json_str(&raw)?)
    }

    /// Number of names with alternatives.
    pub fn len(&self) -> usize {
        self.aliases.len()
    }

    /// True when no name has alternatives.
    pub fn is_empty(&self) -> bool {
        self.aliases.is_empty()
    }

    /// Alternatives for an exact lowercase key.
    pub fn alternatives(&self, key: &str) -> &[String] {
        self.aliases.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Lowercased input first, then the table alternatives for it in table order.
    pub fn generate_variants(&self, name: &str) -> Vec<String> {
        let lowered = name.to_lowercase();
        let alternatives = self.alternatives(lowered.trim());

        let mut variants = Vec::with_capacity(1 + alternatives.len());
        variants.push(lowered);
        variants.extend(alternatives.iter().cloned());
        variants
    }
}

/// Installs the process-wide table. Fails if one was already installed or
/// [`global`] already initialized the builtin one.
pub fn install_global(table: NameAliasTable) -> Result<(), NameAliasTable> {
    GLOBAL_TABLE
        .set(Arc::new(table))
        .map_err(Arc::unwrap_or_clone)
}

/// The process-wide read-only table, defaulting to [`NameAliasTable::builtin`].
pub fn global() -> Arc<NameAliasTable> {
    Arc::clone(GLOBAL_TABLE.get_or_init(|| Arc::new(NameAliasTable::builtin())))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_table_parses() {
        let table = NameAliasTable::builtin();
        assert_eq!(table.len(), 31);
        assert_eq!(table.alternatives("krishna"), ["कृष्णा", "कृष्ण"]);
    }

    #[test]
    fn variants_are_lowercased_original_then_table_order() {
        let table = NameAliasTable::builtin();
        assert_eq!(table.generate_variants("Rahul"), ["rahul", "राहुल", "राहूल"]);
        assert_eq!(table.generate_variants("Xyzabc"), ["xyzabc"]);
        assert_eq!(table.generate_variants("Rahul Sharma"), ["rahul sharma"]);
        assert_eq!(table.generate_variants("RAH"), ["rah"]);
    }

    #[test]
    fn custom_keys_are_normalized_on_load() {
        let table = NameAliasTable::from_json_str(r#"{" Pooja ": ["पूजा"]}"#).unwrap();
        assert_eq!(table.generate_variants("pooja"), ["pooja", "पूजा"]);
    }

    #[test]
    fn keys_differing_only_in_case_are_rejected() {
        let err = NameAliasTable::from_json_str(r#"{"Rahul": ["राहुल"], "rahul ": ["राहूल"]}"#)
            .unwrap_err();
        assert!(err.to_string().contains("collides"), "{err}");

        let exact_dup = NameAliasTable::from_json_str(r#"{"amit": ["अमित"], "amit": ["अमीत"]}"#);
        assert!(exact_dup.is_err());
    }
}
