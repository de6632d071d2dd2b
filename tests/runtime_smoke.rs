use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use voterlookup::{
    core::store::{StoreError, VoterStore},
    op::StoredOp,
    persist::{OpSink, PersistResult},
    runtime::{
        events::VoterEvent,
        handle::{RuntimeConfig, RuntimeError, spawn_voterdb},
    },
    search::source::{RecordSink, RecordSource, SourceError, WriteError},
    types::{Field, OpSeq},
    voter::{VoterDraft, VoterPatch},
};

fn draft(name: &str, voter_id: &str) -> VoterDraft {
    VoterDraft {
        name: name.to_string(),
        voter_id: voter_id.to_string(),
        ..VoterDraft::default()
    }
}

struct SlowSink {
    seen: Arc<Mutex<Vec<OpSeq>>>,
    delay: Duration,
}

impl OpSink for SlowSink {
    fn append_ops(&mut self, ops: &[StoredOp]) -> PersistResult<OpSeq> {
        std::thread::sleep(self.delay);
        let mut seen = self.seen.lock().expect("lock");
        for op in ops {
            seen.push(op.seq);
        }
        Ok(ops.last().map(|o| o.seq).unwrap_or(0))
    }
}

#[tokio::test]
async fn runtime_insert_patch_delete_and_events_ordered() {
    let handle = spawn_voterdb(VoterStore::new(), None, RuntimeConfig::default());
    let mut sub = handle.subscribe();

    let id = handle
        .insert(draft("Rahul Sharma", "amb5778105"))
        .await
        .expect("insert");
    handle
        .patch(
            id,
            VoterPatch {
                mobile: Some("98765 43210".to_string()),
                ..VoterPatch::default()
            },
        )
        .await
        .expect("patch");

    let rec = handle.get(id).await.expect("get").expect("record");
    assert_eq!(rec.voter_id, "AMB5778105");
    assert_eq!(rec.mobile.as_deref(), Some("9876543210"));

    let removed = handle.delete(id).await.expect("delete");
    assert_eq!(removed.id, id);
    assert!(handle.get(id).await.expect("get").is_none());

    let mut seen = Vec::new();
    for _ in 0..8 {
        let evt = tokio::time::timeout(Duration::from_secs(1), sub.recv())
            .await
            .expect("event")
            .expect("recv");
        if !matches!(evt, VoterEvent::DurableUpTo { .. }) {
            seen.push(evt);
        }
        if seen.len() == 3 {
            break;
        }
    }

    assert_eq!(
        seen,
        [
            VoterEvent::Inserted { id },
            VoterEvent::Updated { id },
            VoterEvent::Deleted { id },
        ]
    );

    handle.shutdown().await.expect("shutdown");
}

#[tokio::test]
async fn handle_serves_record_source_queries() {
    let handle = spawn_voterdb(VoterStore::new(), None, RuntimeConfig::default());
    for (name, id) in [
        ("राहुल शर्मा", "AMB5778105"),
        ("राहुल पाटील", "AMB5778106"),
        ("rahul", "AMB5778107"),
        ("priya", "AMB5778108"),
    ] {
        handle.insert(draft(name, id)).await.expect("insert");
    }

    let source: &dyn RecordSource = &handle;
    let exact = source
        .exact_match(Field::VoterId, "AMB5778107")
        .await
        .expect("exact");
    assert_eq!(exact.len(), 1);
    assert_eq!(exact[0].name, "rahul");

    let prefixed = source
        .range_match(Field::Name, "राहुल", "राहुल\u{f8ff}")
        .await
        .expect("range");
    assert_eq!(prefixed.len(), 2);

    let everyone = source.fetch_all().await.expect("fetch all");
    let ids: Vec<_> = everyone.iter().map(|r| r.voter_id.as_str()).collect();
    assert_eq!(ids, ["AMB5778105", "AMB5778106", "AMB5778107", "AMB5778108"]);

    handle.shutdown().await.expect("shutdown");
}

#[tokio::test]
async fn sink_errors_map_to_rejected_and_closed_channel_to_unavailable() {
    let handle = spawn_voterdb(VoterStore::new(), None, RuntimeConfig::default());

    RecordSink::insert(&handle, draft("Priya", "ZXC1234567"))
        .await
        .expect("insert");
    let dup = RecordSink::insert(&handle, draft("Other", "zxc1234567")).await;
    assert_eq!(
        dup,
        Err(WriteError::Rejected(StoreError::DuplicateVoterId(
            "ZXC1234567".to_string()
        )))
    );

    let missing = RecordSink::delete(&handle, 99).await;
    assert_eq!(missing, Err(WriteError::Rejected(StoreError::MissingVoter(99))));

    handle.shutdown().await.expect("shutdown");

    let after = RecordSink::insert(&handle, draft("Late", "LATE123456")).await;
    assert!(matches!(after, Err(WriteError::Unavailable(_))));
    let read = RecordSource::fetch_all(&handle).await;
    assert!(matches!(read, Err(SourceError::Unavailable(_))));
}

#[tokio::test]
async fn queue_pressure_rejects_writes_without_touching_the_store() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = SlowSink {
        seen: Arc::clone(&seen),
        delay: Duration::from_millis(250),
    };

    let cfg = RuntimeConfig {
        flush_on_insert: true,
        batch_max_ops: 16,
        batch_max_latency_ms: 500,
        persist_queue_bound: 1,
        snapshot_every_ops: 0,
        compact_after_snapshot: false,
    };

    let handle = spawn_voterdb(VoterStore::new(), Some(Box::new(sink)), cfg);
    let mut sub = handle.subscribe();

    let id = handle
        .insert(draft("Sneha", "QWE1000000"))
        .await
        .expect("insert");
    assert_eq!(id, 1);

    let mut durable_seen = false;
    for _ in 0..5 {
        let evt = tokio::time::timeout(Duration::from_secs(1), sub.recv())
            .await
            .expect("recv timeout")
            .expect("recv");
        if matches!(evt, VoterEvent::DurableUpTo { .. }) {
            durable_seen = true;
            break;
        }
    }
    assert!(durable_seen, "expected DurableUpTo event");

    let mut rejected = None;
    for i in 0..12u64 {
        let voter_id = format!("QWE20000{i:02}");
        let r = handle.insert(draft(&format!("Voter {i}"), &voter_id)).await;
        if let Err(RuntimeError::Persist(_)) = r {
            rejected = Some((i, voter_id));
            break;
        }
    }
    let (i, voter_id) = rejected.expect("expected persistence queue pressure to surface as error");

    // A write refused for queue pressure must leave the store untouched.
    let leftover = RecordSource::exact_match(&handle, Field::VoterId, &voter_id)
        .await
        .expect("lookup");
    assert!(leftover.is_empty(), "rejected insert left {leftover:?}");

    handle.flush().await.expect("flush");
    let retried = handle
        .insert(draft(&format!("Voter {i}"), &voter_id))
        .await
        .expect("retry after queue drains");
    let found = RecordSource::exact_match(&handle, Field::VoterId, &voter_id)
        .await
        .expect("lookup");
    assert_eq!(found.iter().map(|r| r.id).collect::<Vec<_>>(), vec![retried]);

    handle.shutdown().await.expect("shutdown");
    let mut journaled = seen.lock().expect("lock").clone();
    journaled.sort_unstable();
    let expected: Vec<OpSeq> = (1..=journaled.len() as OpSeq).collect();
    assert_eq!(journaled, expected, "every applied op is journaled exactly once");
}
