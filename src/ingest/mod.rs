//! Bulk voter ingestion from tabular uploads.
//!
//! Rows are written one document at a time through a [`RecordSink`]. Bad rows
//! are counted and skipped; a systemic write failure stops the upload.

use std::path::Path;

use thiserror::Error;
use tracing::{info, warn};

use crate::{
    search::source::{RecordSink, WriteError},
    types::DocId,
    voter::VoterDraft,
};

/// File readers.
pub mod tabular;

pub use tabular::{Column, Row, read_csv, read_rows};

/// Why an upload was rejected or stopped.
#[derive(Debug, Error)]
pub enum IngestError {
    /// The file had a header and no data rows.
    #[error("upload contains no rows")]
    Empty,
    /// The first data row lacks a voter id or a name.
    #[error("first row must contain VoterId and Name columns")]
    MissingColumns,
    /// The extension is not CSV or a spreadsheet.
    #[error("unsupported upload format: {0}")]
    UnsupportedFormat(String),
    /// The file could not be read.
    #[error("reading upload: {0}")]
    Read(#[from] std::io::Error),
    /// The CSV is malformed.
    #[error("parsing csv: {0}")]
    Csv(#[from] csv::Error),
    /// The workbook could not be opened or read.
    #[error("reading workbook: {0}")]
    Excel(#[from] calamine::Error),
    /// A systemic write failure stopped the upload part way.
    #[error("ingestion aborted: {cause}")]
    Aborted {
        /// Rows handled up to and including the failing one.
        summary: IngestSummary,
        /// The failure that stopped it.
        cause: WriteError,
    },
}

/// Why a single row was not written.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RowError {
    /// The row could not become a draft.
    #[error("invalid row: {0}")]
    Invalid(String),
    /// The sink refused the draft.
    #[error(transparent)]
    Write(WriteError),
}

/// Outcome of one row: the new document id or why it was skipped.
pub type RowResult = Result<DocId, RowError>;

/// A row that was not written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowFailure {
    /// 1-based data row, header excluded.
    pub row: usize,
    /// Why it was skipped.
    pub error: RowError,
}

/// Counts for one upload.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestSummary {
    /// Rows written.
    pub success_count: usize,
    /// Rows not written.
    pub error_count: usize,
    /// One entry per unwritten row, in file order.
    pub failures: Vec<RowFailure>,
}

impl IngestSummary {
    /// Rows that reached the sink or failed validation.
    pub fn attempted(&self) -> usize {
        self.success_count + self.error_count
    }

    fn record(&mut self, row: usize, result: RowResult) {
        match result {
            Ok(_) => self.success_count += 1,
            Err(error) => {
                warn!(row, %error, "voter row rejected");
                self.error_count += 1;
                self.failures.push(RowFailure { row, error });
            }
        }
    }
}

/// Writes every row through `sink`.
///
/// The first row must carry a voter id and a name or nothing is written.
pub async fn ingest_rows<S: RecordSink + ?Sized>(
    sink: &S,
    rows: &[Row],
) -> Result<IngestSummary, IngestError> {
    let Some(first) = rows.first() else {
        return Err(IngestError::Empty);
    };
    if first.get(Column::VoterId).is_none() || first.get(Column::Name).is_none() {
        return Err(IngestError::MissingColumns);
    }

    let mut summary = IngestSummary::default();
    for (idx, row) in rows.iter().enumerate() {
        match ingest_row(sink, row).await {
            Err(RowError::Write(cause)) if cause.is_systemic() => {
                summary.record(idx + 1, Err(RowError::Write(cause.clone())));
                warn!(row = idx + 1, %cause, "ingestion aborted");
                return Err(IngestError::Aborted { summary, cause });
            }
            result => summary.record(idx + 1, result),
        }
    }

    info!(
        success = summary.success_count,
        errors = summary.error_count,
        "voter ingestion finished"
    );
    Ok(summary)
}

/// Reads `path` and ingests its rows.
pub async fn ingest_file<S: RecordSink + ?Sized>(
    sink: &S,
    path: impl AsRef<Path>,
) -> Result<IngestSummary, IngestError> {
    let path = path.as_ref();
    let rows = read_rows(path)?;
    info!(path = %path.display(), rows = rows.len(), "voter upload parsed");
    ingest_rows(sink, &rows).await
}

async fn ingest_row<S: RecordSink + ?Sized>(sink: &S, row: &Row) -> RowResult {
    let draft = draft_from_row(row)?;
    sink.insert(draft).await.map_err(RowError::Write)
}

/// Maps a row onto an insert payload.
pub fn draft_from_row(row: &Row) -> Result<VoterDraft, RowError> {
    let name = row
        .get(Column::Name)
        .ok_or_else(|| RowError::Invalid("missing name".to_string()))?;
    let voter_id = row
        .get(Column::VoterId)
        .ok_or_else(|| RowError::Invalid("missing voter id".to_string()))?;
    if !voter_id.bytes().all(|b| b.is_ascii_alphanumeric()) {
        return Err(RowError::Invalid(format!(
            "voter id {voter_id:?} must be alphanumeric"
        )));
    }

    Ok(VoterDraft {
        serial: row.get(Column::Serial).map(str::to_string),
        name: name.to_string(),
        sex: row.get(Column::Sex).map(str::to_string),
        voter_id: voter_id.to_string(),
        mobile: row.get(Column::Mobile).map(str::to_string),
    }
    .normalized())
}
