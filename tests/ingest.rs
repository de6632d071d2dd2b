use std::{
    path::PathBuf,
    sync::{
        Mutex,
        atomic::{AtomicUsize, Ordering},
    },
};

use async_trait::async_trait;
use rust_xlsxwriter::Workbook;
use tempfile::TempDir;

use voterlookup::{
    core::store::{StoreError, VoterStore},
    ingest::{IngestError, RowError, ingest_file, ingest_rows, read_rows},
    runtime::handle::{RuntimeConfig, spawn_voterdb},
    search::source::{RecordSink, WriteError},
    types::{DocId, Field},
    voter::{VoterDraft, VoterPatch, VoterRecord},
};

fn write_file(dir: &TempDir, name: &str, body: &str) -> PathBuf {
    let path = dir.path().join(name);
    std::fs::write(&path, body).expect("write fixture");
    path
}

/// Sink that records drafts and can start failing after a number of inserts.
#[derive(Default)]
struct CountingSink {
    drafts: Mutex<Vec<VoterDraft>>,
    calls: AtomicUsize,
    deny_after: Option<usize>,
}

#[async_trait]
impl RecordSink for CountingSink {
    async fn insert(&self, draft: VoterDraft) -> Result<DocId, WriteError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        if self.deny_after.is_some_and(|limit| n >= limit) {
            return Err(WriteError::PermissionDenied("missing write permission".to_string()));
        }
        let mut drafts = self.drafts.lock().expect("lock");
        drafts.push(draft);
        Ok(drafts.len() as DocId)
    }

    async fn update(&self, id: DocId, _patch: VoterPatch) -> Result<(), WriteError> {
        Err(WriteError::Rejected(StoreError::MissingVoter(id)))
    }

    async fn delete(&self, id: DocId) -> Result<VoterRecord, WriteError> {
        Err(WriteError::Rejected(StoreError::MissingVoter(id)))
    }
}

#[tokio::test]
async fn csv_upload_counts_successes_and_row_errors() {
    let tmp = TempDir::new().expect("tmp");
    let path = write_file(
        &tmp,
        "roll.csv",
        "Serial,Name,Sex,VoterId,Mobile\n\
         1,Rahul Sharma,M/34,amb5778105,98765-43210\n\
         2,प्रिया पाटील,F/29,ZXC1234567,\n\
         3,Duplicate,,AMB5778105,\n\
         4,,,QWE1000000,\n",
    );

    let handle = spawn_voterdb(VoterStore::new(), None, RuntimeConfig::default());
    let summary = ingest_file(&handle, &path).await.expect("ingest");

    assert_eq!(summary.success_count, 2);
    assert_eq!(summary.error_count, 2);
    assert_eq!(summary.failures.len(), 2);
    assert_eq!(summary.failures[0].row, 3);
    assert_eq!(
        summary.failures[0].error,
        RowError::Write(WriteError::Rejected(StoreError::DuplicateVoterId(
            "AMB5778105".to_string()
        )))
    );
    assert_eq!(summary.failures[1].row, 4);
    assert!(matches!(summary.failures[1].error, RowError::Invalid(_)));

    let rahul = handle
        .exact_match(Field::VoterId, "AMB5778105")
        .await
        .expect("lookup");
    assert_eq!(rahul.len(), 1);
    assert_eq!(rahul[0].serial.as_deref(), Some("1"));
    assert_eq!(rahul[0].mobile.as_deref(), Some("9876543210"));
    let priya = handle
        .exact_match(Field::Name, "प्रिया पाटील")
        .await
        .expect("lookup");
    assert_eq!(priya[0].mobile, None);

    handle.shutdown().await.expect("shutdown");
}

#[tokio::test]
async fn missing_required_column_rejects_whole_file_without_writes() {
    let tmp = TempDir::new().expect("tmp");
    let sink = CountingSink::default();

    let no_voter_id = write_file(&tmp, "a.csv", "Name,Mobile\nRahul,9876543210\n");
    let err = ingest_file(&sink, &no_voter_id).await.unwrap_err();
    assert!(matches!(err, IngestError::MissingColumns));

    let blank_first = write_file(
        &tmp,
        "b.csv",
        "Name,VoterId\nRahul,\nPriya,ZXC1234567\n",
    );
    let err = ingest_file(&sink, &blank_first).await.unwrap_err();
    assert!(matches!(err, IngestError::MissingColumns));

    let header_only = write_file(&tmp, "c.csv", "Name,VoterId\n");
    let err = ingest_file(&sink, &header_only).await.unwrap_err();
    assert!(matches!(err, IngestError::Empty));

    assert_eq!(sink.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn systemic_write_failure_aborts_remaining_rows() {
    let tmp = TempDir::new().expect("tmp");
    let path = write_file(
        &tmp,
        "roll.csv",
        "Name,VoterId\nA One,AAA0000001\nB Two,AAA0000002\nC Three,AAA0000003\nD Four,AAA0000004\n",
    );
    let rows = read_rows(&path).expect("read");

    let sink = CountingSink {
        deny_after: Some(2),
        ..CountingSink::default()
    };
    let err = ingest_rows(&sink, &rows).await.unwrap_err();
    match err {
        IngestError::Aborted { summary, cause } => {
            assert_eq!(summary.success_count, 2);
            assert_eq!(summary.error_count, 1);
            assert_eq!(summary.attempted(), 3);
            assert_eq!(summary.failures.len(), 1);
            assert_eq!(summary.failures[0].row, 3);
            assert_eq!(summary.failures[0].error, RowError::Write(cause.clone()));
            assert!(matches!(cause, WriteError::PermissionDenied(_)));
        }
        other => panic!("expected abort, got {other:?}"),
    }
    assert_eq!(sink.calls.load(Ordering::SeqCst), 3);
    assert_eq!(sink.drafts.lock().expect("lock").len(), 2);
}

#[tokio::test]
async fn header_spellings_are_normalized() {
    let tmp = TempDir::new().expect("tmp");
    let path = write_file(
        &tmp,
        "roll.csv",
        "sr no,NAME,Sex Age,voter_id,Mobile No\n7,Sneha Kulkarni,F/41,qwe1000000,+91 90000 00001\n",
    );
    let sink = CountingSink::default();
    let summary = ingest_file(&sink, &path).await.expect("ingest");
    assert_eq!(summary.success_count, 1);

    let drafts = sink.drafts.lock().expect("lock");
    assert_eq!(
        drafts[0],
        VoterDraft {
            serial: Some("7".to_string()),
            name: "Sneha Kulkarni".to_string(),
            sex: Some("F/41".to_string()),
            voter_id: "QWE1000000".to_string(),
            mobile: Some("919000000001".to_string()),
        }
    );
}

#[tokio::test]
async fn excel_upload_reads_first_sheet() {
    let tmp = TempDir::new().expect("tmp");
    let path = tmp.path().join("roll.xlsx");

    let mut workbook = Workbook::new();
    let sheet = workbook.add_worksheet();
    for (col, header) in ["Serial", "Name", "Sex", "VoterId", "Mobile"].iter().enumerate() {
        sheet.write_string(0, col as u16, *header).expect("header");
    }
    sheet.write_number(1, 0, 1.0).expect("serial");
    sheet.write_string(1, 1, "राहुल शर्मा").expect("name");
    sheet.write_string(1, 2, "M/34").expect("sex");
    sheet.write_string(1, 3, "AMB5778105").expect("voter id");
    sheet.write_number(1, 4, 9876543210.0).expect("mobile");
    sheet.write_number(2, 0, 2.0).expect("serial");
    sheet.write_string(2, 1, "Priya").expect("name");
    sheet.write_string(2, 3, "ZXC1234567").expect("voter id");
    workbook.save(&path).expect("save workbook");

    let sink = CountingSink::default();
    let summary = ingest_file(&sink, &path).await.expect("ingest");
    assert_eq!(summary.success_count, 2);

    let drafts = sink.drafts.lock().expect("lock");
    assert_eq!(drafts[0].serial.as_deref(), Some("1"));
    assert_eq!(drafts[0].mobile.as_deref(), Some("9876543210"));
    assert_eq!(drafts[1].sex, None);
}

#[test]
fn missing_file_is_a_read_error() {
    let tmp = TempDir::new().expect("tmp");
    let err = read_rows(tmp.path().join("absent.csv")).unwrap_err();
    assert!(matches!(err, IngestError::Read(_)));
}

#[tokio::test]
async fn unsupported_extension_is_rejected() {
    let tmp = TempDir::new().expect("tmp");
    let path = write_file(&tmp, "roll.txt", "Name,VoterId\nRahul,AMB5778105\n");
    let err = ingest_file(&CountingSink::default(), &path).await.unwrap_err();
    assert!(matches!(err, IngestError::UnsupportedFormat(_)));
}
