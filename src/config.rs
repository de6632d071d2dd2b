//! Environment-driven application settings.

use std::{env, fmt::Display, path::PathBuf, str::FromStr, time::Duration};

use thiserror::Error;
use tracing::info;

use crate::{admin::AccessPolicy, search::SearchConfig};

/// A configuration variable that is set but unusable.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// The value failed to parse or is out of range.
    #[error("invalid {key} value {value:?}: {reason}")]
    Invalid {
        /// Environment variable name.
        key: &'static str,
        /// Offending value.
        value: String,
        /// Parser or range message.
        reason: String,
    },
}

/// Settings read from `VOTER_*` environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    /// SQLite journal location (`VOTER_DB_PATH`).
    pub db_path: PathBuf,
    /// Replacement name alias table; the builtin one is used when unset.
    pub names_path: Option<PathBuf>,
    /// Whole-request search deadline in milliseconds.
    pub search_deadline_ms: u64,
    /// Maximum records returned by one search.
    pub result_cap: usize,
    /// Shortest stored name the fuzzy fallback matches inside a query.
    pub min_fuzzy_len: usize,
    /// Operators allowed to sign in.
    pub admins: Vec<String>,
    /// Admin session lifetime in seconds.
    pub session_ttl_secs: u64,
}

impl AppConfig {
    /// Reads the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the config from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        Ok(Self {
            db_path: try_load(&lookup, "VOTER_DB_PATH", "voters.db")?,
            names_path: lookup("VOTER_NAMES_PATH")
                .filter(|v| !v.trim().is_empty())
                .map(PathBuf::from),
            search_deadline_ms: try_load_nonzero(&lookup, "VOTER_SEARCH_DEADLINE_MS", "5000")?,
            result_cap: try_load_nonzero(&lookup, "VOTER_RESULT_CAP", "10")?,
            min_fuzzy_len: try_load(&lookup, "VOTER_MIN_FUZZY_LEN", "2")?,
            admins: lookup("VOTER_ADMINS")
                .map(|raw| {
                    raw.split(',')
                        .map(str::trim)
                        .filter(|a| !a.is_empty())
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default(),
            session_ttl_secs: try_load(&lookup, "VOTER_SESSION_TTL_SECS", "3600")?,
        })
    }

    /// Search tuning derived from these settings.
    pub fn search_config(&self) -> SearchConfig {
        SearchConfig {
            result_cap: self.result_cap,
            deadline: Duration::from_millis(self.search_deadline_ms),
            min_fuzzy_len: self.min_fuzzy_len,
        }
    }

    /// Admin allow-list and session lifetime.
    pub fn access_policy(&self) -> AccessPolicy {
        AccessPolicy::new(&self.admins, Duration::from_secs(self.session_ttl_secs))
    }
}

fn try_load<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    default: &str,
) -> Result<T, ConfigError>
where
    T::Err: Display,
{
    let value = lookup(key).unwrap_or_else(|| {
        info!("{key} not set, using default: {default}");
        default.to_string()
    });
    value.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
        key,
        reason: e.to_string(),
        value,
    })
}

/// Like [`try_load`], but zero is rejected.
fn try_load_nonzero<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    default: &str,
) -> Result<T, ConfigError>
where
    T: FromStr + Default + PartialEq,
    T::Err: Display,
{
    let value: T = try_load(lookup, key, default)?;
    if value == T::default() {
        return Err(ConfigError::Invalid {
            key,
            value: "0".to_string(),
            reason: "must be greater than zero".to_string(),
        });
    }
    Ok(value)
}
