//! SQLite journal of voter ops, plus the snapshot that bounds replay.

use std::path::Path;

use rusqlite::{Connection, OptionalExtension, params};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    core::store::{StoreSnapshotV1, VoterStore, now_ms},
    op::{OP_FORMAT_VERSION, StoredOp, StoredOpEnvelope},
    types::OpSeq,
};

use super::{OpSink, PersistError, PersistResult};

const SNAPSHOT_FORMAT_VERSION: u16 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct SnapshotEnvelope {
    format_version: u16,
    snapshot: StoreSnapshotV1,
}

/// Write-ahead journal for a [`VoterStore`], stored in one SQLite file.
pub struct SqliteOpSink {
    conn: Connection,
}

impl SqliteOpSink {
    /// Opens or creates the journal at `path` in WAL mode.
    pub fn open(path: impl AsRef<Path>) -> PersistResult<Self> {
        Self::init(Connection::open(path)?)
    }

    /// Opens a journal that lives only as long as the sink.
    pub fn open_in_memory() -> PersistResult<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> PersistResult<Self> {
        conn.execute_batch(include_str!("schema.sql"))?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        Ok(Self { conn })
    }

    /// Rebuilds the store from the snapshot, then replays the events after it.
    pub fn load_store(&self) -> PersistResult<VoterStore> {
        let mut store = match self.latest_snapshot()? {
            Some(snapshot) => VoterStore::from_snapshot(snapshot)?,
            None => VoterStore::new(),
        };

        let start_seq = store.latest_op_seq();
        let events = self.load_events_after(start_seq)?;
        debug!(start_seq, replayed = events.len(), "replaying voter journal");
        for event in events {
            store.apply_replayed_op(event)?;
        }
        Ok(store)
    }

    /// Journaled ops with a sequence strictly greater than `seq`, in order.
    pub fn load_events_after(&self, seq: OpSeq) -> PersistResult<Vec<StoredOp>> {
        let mut stmt = self
            .conn
            .prepare("SELECT seq, ts_ms, payload FROM events WHERE seq > ?1 ORDER BY seq")?;
        let rows = stmt.query_map(params![seq as i64], |row| {
            Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?, row.get::<_, Vec<u8>>(2)?))
        })?;

        let mut events = Vec::new();
        for row in rows {
            let (seq, ts_ms, payload) = row?;
            events.push(decode_event(seq as OpSeq, ts_ms as u64, &payload)?);
        }
        Ok(events)
    }

    /// Replaces the stored snapshot with one covering ops through `last_seq`.
    pub fn write_snapshot(&mut self, snapshot: &StoreSnapshotV1, last_seq: OpSeq) -> PersistResult<()> {
        let payload = serde_json::to_vec(&SnapshotEnvelope {
            format_version: SNAPSHOT_FORMAT_VERSION,
            snapshot: snapshot.clone(),
        })?;

        let tx = self.conn.transaction()?;
        tx.execute(
            "INSERT OR REPLACE INTO snapshots(last_seq, ts_ms, payload) VALUES (?1, ?2, ?3)",
            params![last_seq as i64, now_ms() as i64, payload],
        )?;
        let pruned = tx.execute(
            "DELETE FROM snapshots WHERE last_seq < ?1",
            params![last_seq as i64],
        )?;
        tx.commit()?;
        debug!(last_seq, pruned, records = snapshot.records.len(), "voter snapshot stored");
        Ok(())
    }

    /// Deletes journaled ops through `seq`, returning how many were removed.
    pub fn compact_through(&mut self, seq: OpSeq) -> PersistResult<usize> {
        Ok(self
            .conn
            .execute("DELETE FROM events WHERE seq <= ?1", params![seq as i64])?)
    }

    /// Highest journaled sequence, or 0 for an empty journal.
    pub fn latest_seq(&self) -> PersistResult<OpSeq> {
        let seq: Option<i64> = self
            .conn
            .query_row("SELECT MAX(seq) FROM events", [], |row| row.get(0))?;
        Ok(seq.unwrap_or(0) as OpSeq)
    }

    fn latest_snapshot(&self) -> PersistResult<Option<StoreSnapshotV1>> {
        let payload: Option<Vec<u8>> = self
            .conn
            .query_row(
                "SELECT payload FROM snapshots ORDER BY last_seq DESC LIMIT 1",
                [],
                |row| row.get(0),
            )
            .optional()?;

        let Some(payload) = payload else {
            return Ok(None);
        };
        let env: SnapshotEnvelope = serde_json::from_slice(&payload)?;
        if env.format_version != SNAPSHOT_FORMAT_VERSION {
            return Err(PersistError::Message(format!(
                "unsupported snapshot format version {}",
                env.format_version
            )));
        }
        Ok(Some(env.snapshot))
    }
}

impl OpSink for SqliteOpSink {
    fn append_ops(&mut self, ops: &[StoredOp]) -> PersistResult<OpSeq> {
        let Some(last) = ops.last() else {
            return self.latest_seq();
        };

        let tx = self.conn.transaction()?;
        {
            let mut stmt =
                tx.prepare("INSERT INTO events(seq, ts_ms, payload) VALUES (?1, ?2, ?3)")?;
            for stored in ops {
                let payload = serde_json::to_vec(&StoredOpEnvelope::new(stored.clone()))?;
                stmt.execute(params![stored.seq as i64, stored.ts_ms as i64, payload])?;
            }
        }
        tx.commit()?;
        Ok(last.seq)
    }

    fn flush(&mut self) -> PersistResult<()> {
        self.conn.execute_batch("PRAGMA wal_checkpoint(PASSIVE);")?;
        Ok(())
    }

    fn write_snapshot(&mut self, snapshot: &StoreSnapshotV1, last_seq: OpSeq) -> PersistResult<()> {
        SqliteOpSink::write_snapshot(self, snapshot, last_seq)
    }

    fn compact_through(&mut self, seq: OpSeq) -> PersistResult<usize> {
        SqliteOpSink::compact_through(self, seq)
    }
}

/// Decodes one journal row. The row's columns are authoritative for seq and time.
fn decode_event(seq: OpSeq, ts_ms: u64, payload: &[u8]) -> PersistResult<StoredOp> {
    let envelope: StoredOpEnvelope = serde_json::from_slice(payload)?;
    if envelope.format_version != OP_FORMAT_VERSION {
        return Err(PersistError::Message(format!(
            "event {seq}: unsupported op format version {}",
            envelope.format_version
        )));
    }
    Ok(StoredOp {
        seq,
        ts_ms,
        op: envelope.stored.op,
    })
}
