use rusqlite::{Connection, params};
use tempfile::TempDir;

use voterlookup::{
    core::store::VoterStore,
    op::StoredOpEnvelope,
    persist::{OpSink, PersistError, sqlite::SqliteOpSink},
    runtime::handle::{RuntimeConfig, spawn_voterdb},
    types::Field,
    voter::{VoterDraft, VoterPatch},
};

fn draft(name: &str, voter_id: &str) -> VoterDraft {
    VoterDraft {
        serial: Some("1".to_string()),
        name: name.to_string(),
        sex: Some("M/34".to_string()),
        voter_id: voter_id.to_string(),
        mobile: Some("9876543210".to_string()),
    }
}

#[test]
fn sqlite_replay_round_trips_state_and_order() {
    let tmp = TempDir::new().expect("tmp");
    let db_path = tmp.path().join("voters.db");

    let mut store = VoterStore::new();
    let mut sink = SqliteOpSink::open(&db_path).expect("open sqlite");

    let (id1, _) = store
        .insert(draft("Rahul Sharma", "AMB5778105"))
        .expect("insert1");
    let (id2, _) = store.insert(draft("Priya", "ZXC1234567")).expect("insert2");
    let (id3, _) = store.insert(draft("राहुल", "AMB5778106")).expect("insert3");
    store
        .patch(
            id1,
            VoterPatch {
                name: Some("Rahul K Sharma".to_string()),
                voter_id: Some("amb9999999".to_string()),
                ..VoterPatch::default()
            },
        )
        .expect("patch");
    store.delete(id2).expect("delete");

    let ops = store.drain_pending_ops();
    assert_eq!(ops.len(), 5);
    sink.append_ops(&ops).expect("append");
    assert_eq!(sink.latest_seq().expect("latest"), store.latest_op_seq());

    drop(sink);

    let sink2 = SqliteOpSink::open(&db_path).expect("reopen");
    let replayed = sink2.load_store().expect("replay");

    let orig = store.export_snapshot();
    let replay = replayed.export_snapshot();
    assert_eq!(orig.order, replay.order);
    assert_eq!(orig.records, replay.records);
    assert_eq!(orig.order, vec![id1, id3]);

    assert_eq!(
        replayed.by_voter_id("AMB9999999").map(|r| r.id),
        Some(id1)
    );
    assert!(replayed.by_voter_id("AMB5778105").is_none());
    assert_eq!(replayed.exact_match(Field::Name, "Rahul K Sharma").len(), 1);
}

#[test]
fn snapshot_and_compaction_preserve_replay() {
    let tmp = TempDir::new().expect("tmp");
    let db_path = tmp.path().join("snap.db");

    let mut store = VoterStore::new();
    let mut sink = SqliteOpSink::open(&db_path).expect("open sqlite");

    for i in 0..10u64 {
        store
            .insert(draft(&format!("Voter {i}"), &format!("SNP{i:07}")))
            .expect("insert");
    }
    sink.append_ops(&store.drain_pending_ops()).expect("append");

    let snapshot = store.export_snapshot();
    let last_seq = store.latest_op_seq();
    sink.write_snapshot(&snapshot, last_seq).expect("snapshot");
    let removed = sink.compact_through(last_seq).expect("compact");
    assert_eq!(removed, 10);

    store.insert(draft("After Snapshot", "SNP9999999")).expect("insert");
    sink.append_ops(&store.drain_pending_ops()).expect("append tail");

    drop(sink);

    let reopened = SqliteOpSink::open(&db_path).expect("reopen");
    assert_eq!(reopened.load_events_after(last_seq).expect("tail").len(), 1);
    let replayed = reopened.load_store().expect("replay");

    assert_eq!(replayed.export_snapshot().order, store.export_snapshot().order);
    assert_eq!(replayed.export_snapshot().records, store.export_snapshot().records);
    assert_eq!(replayed.latest_op_seq(), 11);
}

#[tokio::test]
async fn runtime_journal_survives_restart() {
    let tmp = TempDir::new().expect("tmp");
    let db_path = tmp.path().join("runtime.db");

    let sink = SqliteOpSink::open(&db_path).expect("open sqlite");
    let handle = spawn_voterdb(
        sink.load_store().expect("load"),
        Some(Box::new(sink)),
        RuntimeConfig::default(),
    );
    let id = handle
        .insert(draft("Sneha Kulkarni", "qwe1000000"))
        .await
        .expect("insert");
    handle.flush().await.expect("flush");
    handle.checkpoint().await.expect("checkpoint");
    handle.shutdown().await.expect("shutdown");

    let reopened = SqliteOpSink::open(&db_path).expect("reopen");
    let store = reopened.load_store().expect("replay");
    let rec = store.get(id).expect("record");
    assert_eq!(rec.voter_id, "QWE1000000");
    assert_eq!(store.len(), 1);
}

#[test]
fn newer_snapshot_replaces_older_one() {
    let tmp = TempDir::new().expect("tmp");
    let db_path = tmp.path().join("prune.db");

    let mut store = VoterStore::new();
    let mut sink = SqliteOpSink::open(&db_path).expect("open sqlite");

    store.insert(draft("First", "PRN0000001")).expect("insert");
    sink.append_ops(&store.drain_pending_ops()).expect("append");
    sink.write_snapshot(&store.export_snapshot(), store.latest_op_seq())
        .expect("snapshot 1");

    store.insert(draft("Second", "PRN0000002")).expect("insert");
    sink.append_ops(&store.drain_pending_ops()).expect("append");
    sink.write_snapshot(&store.export_snapshot(), store.latest_op_seq())
        .expect("snapshot 2");
    drop(sink);

    let raw = Connection::open(&db_path).expect("raw open");
    let (count, last_seq): (i64, i64) = raw
        .query_row("SELECT COUNT(*), MAX(last_seq) FROM snapshots", [], |row| {
            Ok((row.get(0)?, row.get(1)?))
        })
        .expect("count snapshots");
    assert_eq!((count, last_seq), (1, 2));
    drop(raw);

    let reopened = SqliteOpSink::open(&db_path).expect("reopen");
    let replayed = reopened.load_store().expect("replay");
    assert_eq!(replayed.len(), 2);
    assert_eq!(replayed.latest_op_seq(), 2);
}

#[test]
fn journal_rows_must_carry_a_known_envelope() {
    let tmp = TempDir::new().expect("tmp");
    let db_path = tmp.path().join("foreign.db");

    let mut store = VoterStore::new();
    let (_, stored) = store.insert(draft("Rahul", "AMB5778105")).expect("insert");
    let sink = SqliteOpSink::open(&db_path).expect("open sqlite");

    let raw = Connection::open(&db_path).expect("raw open");
    let bare = serde_json::to_vec(&stored).expect("encode bare op");
    raw.execute(
        "INSERT INTO events(seq, ts_ms, payload) VALUES (1, 0, ?1)",
        params![bare],
    )
    .expect("insert bare row");
    assert!(matches!(sink.load_events_after(0), Err(PersistError::Serde(_))));

    let future = serde_json::to_vec(&StoredOpEnvelope {
        format_version: 99,
        stored,
    })
    .expect("encode envelope");
    raw.execute(
        "UPDATE events SET payload = ?1 WHERE seq = 1",
        params![future],
    )
    .expect("rewrite row");
    match sink.load_store() {
        Err(PersistError::Message(msg)) => assert!(msg.contains("format version 99"), "{msg}"),
        Err(other) => panic!("expected version error, got {other}"),
        Ok(_) => panic!("expected version error, got a store"),
    }
}
