//! Operator access and record maintenance.
//!
//! The signed-in operator is an explicit [`AdminSession`] value carried by the
//! [`AdminDesk`], so every write is checked against it.

use std::{path::Path, time::Duration};

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use hashbrown::HashSet;
use thiserror::Error;
use tracing::{info, warn};

use crate::{
    ingest::{self, IngestError, IngestSummary},
    runtime::handle::VoterDbHandle,
    search::source::{RecordSink, SourceError, WriteError},
    types::DocId,
    voter::{VoterDraft, VoterPatch, VoterRecord},
};

/// Why an operator may not act.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    /// The operator is not on the admin list.
    #[error("{0} is not an authorized operator")]
    NotAuthorized(String),
    /// The session outlived its lifetime.
    #[error("session for {operator} expired at {expires_at}")]
    Expired {
        /// Operator the session belonged to.
        operator: String,
        /// When the session ended.
        expires_at: DateTime<Utc>,
    },
}

impl From<AuthError> for WriteError {
    fn from(err: AuthError) -> Self {
        WriteError::PermissionDenied(err.to_string())
    }
}

/// Who may sign in, and for how long.
#[derive(Debug, Clone)]
pub struct AccessPolicy {
    admins: HashSet<String>,
    session_ttl: Duration,
}

impl AccessPolicy {
    /// Lowercases and trims operator names; blank names are ignored.
    pub fn new<I, S>(admins: I, session_ttl: Duration) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            admins: admins
                .into_iter()
                .map(|a| a.as_ref().trim().to_lowercase())
                .filter(|a| !a.is_empty())
                .collect(),
            session_ttl,
        }
    }

    /// Case-insensitive membership check.
    pub fn is_admin(&self, operator: &str) -> bool {
        self.admins.contains(&operator.trim().to_lowercase())
    }

    /// Lifetime granted to new sessions.
    pub fn session_ttl(&self) -> Duration {
        self.session_ttl
    }

    /// Opens a session for a listed operator.
    pub fn sign_in(&self, operator: &str) -> Result<AdminSession, AuthError> {
        if !self.is_admin(operator) {
            warn!(operator, "rejected admin sign-in");
            return Err(AuthError::NotAuthorized(operator.to_string()));
        }
        let ttl = TimeDelta::from_std(self.session_ttl).unwrap_or(TimeDelta::MAX);
        let expires_at = Utc::now()
            .checked_add_signed(ttl)
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        info!(operator, %expires_at, "admin signed in");
        Ok(AdminSession {
            operator: operator.trim().to_string(),
            expires_at,
        })
    }
}

/// The signed-in operator. Every admin write carries one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdminSession {
    /// Operator name as entered at sign-in.
    pub operator: String,
    /// Writes are refused from this instant on.
    pub expires_at: DateTime<Utc>,
}

impl AdminSession {
    /// Whether the session is still valid at `now`.
    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }

    /// Fails with [`AuthError::Expired`] once the session has lapsed.
    pub fn check(&self) -> Result<(), AuthError> {
        if self.is_active_at(Utc::now()) {
            Ok(())
        } else {
            Err(AuthError::Expired {
                operator: self.operator.clone(),
                expires_at: self.expires_at,
            })
        }
    }

    /// Ends the session.
    pub fn sign_out(self) {
        info!(operator = %self.operator, "admin signed out");
    }
}

/// Keeps records whose name or voter id contains `filter`, ignoring case.
pub fn filter_records(records: Vec<VoterRecord>, filter: &str) -> Vec<VoterRecord> {
    let needle = filter.trim().to_lowercase();
    if needle.is_empty() {
        return records;
    }
    records
        .into_iter()
        .filter(|r| {
            r.name.to_lowercase().contains(&needle) || r.voter_id.to_lowercase().contains(&needle)
        })
        .collect()
}

/// Outcome of deleting several records.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BulkDeleteSummary {
    /// Ids that were removed.
    pub deleted: Vec<DocId>,
    /// Ids that were not removed, with the reason.
    pub failed: Vec<(DocId, WriteError)>,
}

/// Record maintenance on behalf of a signed-in operator.
#[derive(Clone)]
pub struct AdminDesk {
    handle: VoterDbHandle,
    session: AdminSession,
}

impl AdminDesk {
    /// Binds `session` to the store behind `handle`.
    pub fn new(handle: VoterDbHandle, session: AdminSession) -> Self {
        Self { handle, session }
    }

    /// The session writes are checked against.
    pub fn session(&self) -> &AdminSession {
        &self.session
    }

    /// Gives the session back, for example to sign out.
    pub fn into_session(self) -> AdminSession {
        self.session
    }

    /// Records whose name or voter id contains `filter`, ignoring case.
    /// A blank filter lists everything.
    pub async fn list(&self, filter: &str) -> Result<Vec<VoterRecord>, SourceError> {
        Ok(filter_records(self.handle.fetch_all().await?, filter))
    }

    /// Manual entry of one voter.
    pub async fn add(&self, draft: VoterDraft) -> Result<DocId, WriteError> {
        RecordSink::insert(self, draft).await
    }

    /// Overwrites the fields present in `patch`.
    pub async fn edit(&self, id: DocId, patch: VoterPatch) -> Result<(), WriteError> {
        RecordSink::update(self, id, patch).await
    }

    /// Removes one record and returns it.
    pub async fn delete(&self, id: DocId) -> Result<VoterRecord, WriteError> {
        RecordSink::delete(self, id).await
    }

    /// Deletes each id in turn. After a systemic failure the remaining ids
    /// are reported as failed with the same cause and not attempted.
    pub async fn bulk_delete(&self, ids: &[DocId]) -> BulkDeleteSummary {
        let mut summary = BulkDeleteSummary::default();
        let mut abort: Option<WriteError> = None;

        for &id in ids {
            if let Some(cause) = &abort {
                summary.failed.push((id, cause.clone()));
                continue;
            }
            match self.delete(id).await {
                Ok(_) => summary.deleted.push(id),
                Err(err) => {
                    warn!(id, error = %err, "bulk delete failed for record");
                    if err.is_systemic() {
                        abort = Some(err.clone());
                    }
                    summary.failed.push((id, err));
                }
            }
        }

        info!(
            operator = %self.session.operator,
            deleted = summary.deleted.len(),
            failed = summary.failed.len(),
            "bulk delete finished"
        );
        summary
    }

    /// Ingests a CSV or spreadsheet through this desk, so the session gates every row.
    pub async fn upload(&self, path: impl AsRef<Path>) -> Result<IngestSummary, IngestError> {
        ingest::ingest_file(self, path).await
    }
}

#[async_trait]
impl RecordSink for AdminDesk {
    async fn insert(&self, draft: VoterDraft) -> Result<DocId, WriteError> {
        self.session.check()?;
        RecordSink::insert(&self.handle, draft).await
    }

    async fn update(&self, id: DocId, patch: VoterPatch) -> Result<(), WriteError> {
        self.session.check()?;
        RecordSink::update(&self.handle, id, patch).await
    }

    async fn delete(&self, id: DocId) -> Result<VoterRecord, WriteError> {
        self.session.check()?;
        RecordSink::delete(&self.handle, id).await
    }
}
