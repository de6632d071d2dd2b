//! Command loop that owns the voter store, and its persistence worker.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::{
    sync::{Mutex, broadcast, mpsc, oneshot},
    time::{Duration, Instant},
};
use tracing::{debug, info, warn};

use crate::{
    core::store::{StoreError, StoreSnapshotV1, VoterStore},
    op::{Op, StoredOp},
    persist::{OpSink, PersistError},
    search::source::{RecordSink, RecordSource, SourceError, WriteError},
    types::{DocId, Field, OpSeq, VOTERS},
    voter::{VoterDraft, VoterPatch, VoterRecord},
};

use super::events::VoterEvent;

/// Failure of a runtime command.
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// The store rejected the mutation.
    #[error(transparent)]
    Store(#[from] StoreError),
    /// The journal refused or failed the write.
    #[error("persistence: {0}")]
    Persist(#[from] PersistError),
    /// The runtime task has stopped.
    #[error("voter runtime channel closed")]
    ChannelClosed,
}

impl From<RuntimeError> for WriteError {
    fn from(value: RuntimeError) -> Self {
        match value {
            RuntimeError::Store(err) => WriteError::Rejected(err),
            other => WriteError::Unavailable(other.to_string()),
        }
    }
}

impl From<RuntimeError> for SourceError {
    fn from(value: RuntimeError) -> Self {
        SourceError::Unavailable(value.to_string())
    }
}

/// Journal batching and snapshot tuning.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Flush the journal after every insert.
    pub flush_on_insert: bool,
    /// Ops buffered before a journal append.
    pub batch_max_ops: usize,
    /// Longest an op waits in the buffer.
    pub batch_max_latency_ms: u64,
    /// Queued journal messages before writes are refused.
    pub persist_queue_bound: usize,
    /// Mutations between automatic snapshots; 0 disables them.
    pub snapshot_every_ops: usize,
    /// Drop journaled ops a snapshot covers.
    pub compact_after_snapshot: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            flush_on_insert: false,
            batch_max_ops: 64,
            batch_max_latency_ms: 75,
            persist_queue_bound: 1024,
            snapshot_every_ops: 5000,
            compact_after_snapshot: true,
        }
    }
}

/// Cloneable handle to the task that owns the [`VoterStore`].
#[derive(Clone)]
pub struct VoterDbHandle {
    cmd_tx: mpsc::Sender<Command>,
    events_tx: broadcast::Sender<VoterEvent>,
}

enum Command {
    Insert {
        draft: VoterDraft,
        resp: oneshot::Sender<Result<DocId, RuntimeError>>,
    },
    Patch {
        id: DocId,
        patch: VoterPatch,
        resp: oneshot::Sender<Result<(), RuntimeError>>,
    },
    Delete {
        id: DocId,
        resp: oneshot::Sender<Result<VoterRecord, RuntimeError>>,
    },
    Get {
        id: DocId,
        resp: oneshot::Sender<Option<VoterRecord>>,
    },
    ExactMatch {
        field: Field,
        value: String,
        resp: oneshot::Sender<Vec<VoterRecord>>,
    },
    RangeMatch {
        field: Field,
        lower: String,
        upper: String,
        resp: oneshot::Sender<Vec<VoterRecord>>,
    },
    FetchAll {
        resp: oneshot::Sender<Vec<VoterRecord>>,
    },
    Flush {
        resp: oneshot::Sender<Result<OpSeq, RuntimeError>>,
    },
    Checkpoint {
        resp: oneshot::Sender<Result<(), RuntimeError>>,
    },
    Shutdown {
        resp: oneshot::Sender<Result<(), RuntimeError>>,
    },
}

enum PersistMsg {
    Op(StoredOp),
    Flush {
        resp: oneshot::Sender<Result<OpSeq, PersistError>>,
    },
    Checkpoint {
        snapshot: StoreSnapshotV1,
        last_seq: OpSeq,
        compact: bool,
        resp: oneshot::Sender<Result<(), PersistError>>,
    },
    Shutdown {
        resp: oneshot::Sender<()>,
    },
}

/// Starts the task that owns `store`, journaling through `sink` when given.
pub fn spawn_voterdb(
    store: VoterStore,
    sink: Option<Box<dyn OpSink>>,
    config: RuntimeConfig,
) -> VoterDbHandle {
    let (cmd_tx, mut cmd_rx) = mpsc::channel::<Command>(256);
    let (events_tx, _) = broadcast::channel::<VoterEvent>(1024);

    let (persist_tx_opt, mut durable_rx) = if let Some(sink) = sink {
        let (persist_tx, persist_rx) = mpsc::channel::<PersistMsg>(config.persist_queue_bound);
        let (durable_tx, durable_rx) = mpsc::unbounded_channel::<Result<OpSeq, PersistError>>();
        spawn_persistence_worker(sink, persist_rx, durable_tx, config.clone());
        (Some(persist_tx), Some(durable_rx))
    } else {
        (None, None)
    };

    let events_tx_loop = events_tx.clone();
    info!(
        collection = VOTERS,
        records = store.len(),
        persisted = persist_tx_opt.is_some(),
        "voter runtime started"
    );

    tokio::spawn(async move {
        let mut store = store;
        let mut ops_since_snapshot = 0usize;

        loop {
            if let Some(rx) = durable_rx.as_mut() {
                tokio::select! {
                    cmd = cmd_rx.recv() => {
                        let Some(cmd) = cmd else { break; };
                        let done = handle_command(
                            cmd,
                            &mut store,
                            &events_tx_loop,
                            persist_tx_opt.as_ref(),
                            &config,
                            &mut ops_since_snapshot,
                        ).await;

                        if done {
                            break;
                        }
                    }
                    durable = rx.recv() => {
                        match durable {
                            Some(Ok(op_seq)) => {
                                let _ = events_tx_loop.send(VoterEvent::DurableUpTo { op_seq });
                            }
                            Some(Err(err)) => warn!(error = %err, "voter journal append failed"),
                            None => {}
                        }
                    }
                }
            } else {
                let Some(cmd) = cmd_rx.recv().await else { break; };
                let done = handle_command(
                    cmd,
                    &mut store,
                    &events_tx_loop,
                    persist_tx_opt.as_ref(),
                    &config,
                    &mut ops_since_snapshot,
                ).await;
                if done {
                    break;
                }
            }
        }

        info!("voter runtime stopped");
    });

    VoterDbHandle {
        cmd_tx,
        events_tx,
    }
}

impl VoterDbHandle {
    /// Receiver for mutation and durability events.
    pub fn subscribe(&self) -> broadcast::Receiver<VoterEvent> {
        self.events_tx.subscribe()
    }

    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> Result<T, RuntimeError> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(make(tx))
            .await
            .map_err(|_| RuntimeError::ChannelClosed)?;
        rx.await.map_err(|_| RuntimeError::ChannelClosed)
    }

    /// Inserts a voter and returns its document id.
    pub async fn insert(&self, draft: VoterDraft) -> Result<DocId, RuntimeError> {
        self.request(|resp| Command::Insert { draft, resp }).await?
    }

    /// Overwrites the fields present in `patch`.
    pub async fn patch(&self, id: DocId, patch: VoterPatch) -> Result<(), RuntimeError> {
        self.request(|resp| Command::Patch { id, patch, resp }).await?
    }

    /// Removes a voter, returning the removed record.
    pub async fn delete(&self, id: DocId) -> Result<VoterRecord, RuntimeError> {
        self.request(|resp| Command::Delete { id, resp }).await?
    }

    /// One record by document id.
    pub async fn get(&self, id: DocId) -> Result<Option<VoterRecord>, RuntimeError> {
        self.request(|resp| Command::Get { id, resp }).await
    }

    /// Records whose `field` equals `value`.
    pub async fn exact_match(&self, field: Field, value: impl Into<String>) -> Result<Vec<VoterRecord>, RuntimeError> {
        let value = value.into();
        self.request(|resp| Command::ExactMatch { field, value, resp })
            .await
    }

    /// Records whose `field` lies in `lower..=upper`.
    pub async fn range_match(
        &self,
        field: Field,
        lower: impl Into<String>,
        upper: impl Into<String>,
    ) -> Result<Vec<VoterRecord>, RuntimeError> {
        let (lower, upper) = (lower.into(), upper.into());
        self.request(|resp| Command::RangeMatch {
            field,
            lower,
            upper,
            resp,
        })
        .await
    }

    /// Every record, in insertion order.
    pub async fn fetch_all(&self) -> Result<Vec<VoterRecord>, RuntimeError> {
        self.request(|resp| Command::FetchAll { resp }).await
    }

    /// Waits until every queued op is journaled and returns the last durable seq.
    pub async fn flush(&self) -> Result<OpSeq, RuntimeError> {
        self.request(|resp| Command::Flush { resp }).await?
    }

    /// Writes a snapshot of the current store.
    pub async fn checkpoint(&self) -> Result<(), RuntimeError> {
        self.request(|resp| Command::Checkpoint { resp }).await?
    }

    /// Drains the journal and stops the task.
    pub async fn shutdown(&self) -> Result<(), RuntimeError> {
        self.request(|resp| Command::Shutdown { resp }).await?
    }
}

#[async_trait]
impl RecordSource for VoterDbHandle {
    async fn exact_match(&self, field: Field, value: &str) -> Result<Vec<VoterRecord>, SourceError> {
        Ok(VoterDbHandle::exact_match(self, field, value).await?)
    }

    async fn range_match(
        &self,
        field: Field,
        lower: &str,
        upper: &str,
    ) -> Result<Vec<VoterRecord>, SourceError> {
        Ok(VoterDbHandle::range_match(self, field, lower, upper).await?)
    }

    async fn fetch_all(&self) -> Result<Vec<VoterRecord>, SourceError> {
        Ok(VoterDbHandle::fetch_all(self).await?)
    }
}

#[async_trait]
impl RecordSink for VoterDbHandle {
    async fn insert(&self, draft: VoterDraft) -> Result<DocId, WriteError> {
        Ok(VoterDbHandle::insert(self, draft).await?)
    }

    async fn update(&self, id: DocId, patch: VoterPatch) -> Result<(), WriteError> {
        Ok(self.patch(id, patch).await?)
    }

    async fn delete(&self, id: DocId) -> Result<VoterRecord, WriteError> {
        Ok(VoterDbHandle::delete(self, id).await?)
    }
}

/// Reserves a journal slot before the store is touched, so a full queue
/// rejects the write instead of leaving an unjournaled mutation behind.
fn reserve_persist(
    persist_tx: Option<&mpsc::Sender<PersistMsg>>,
) -> Result<Option<mpsc::Permit<'_, PersistMsg>>, RuntimeError> {
    persist_tx
        .map(|tx| {
            tx.try_reserve().map_err(|err| {
                RuntimeError::Persist(PersistError::Message(format!("persist queue error: {err}")))
            })
        })
        .transpose()
}

/// Journals a successful mutation on its reserved slot and announces it.
fn publish(
    store: &VoterStore,
    stored: StoredOp,
    event: VoterEvent,
    events_tx: &broadcast::Sender<VoterEvent>,
    permit: Option<mpsc::Permit<'_, PersistMsg>>,
) {
    match permit {
        Some(permit) => permit.send(PersistMsg::Op(stored)),
        None => {
            let _ = events_tx.send(VoterEvent::DurableUpTo {
                op_seq: store.latest_op_seq(),
            });
        }
    }
    let _ = events_tx.send(event);
}

async fn handle_command(
    cmd: Command,
    store: &mut VoterStore,
    events_tx: &broadcast::Sender<VoterEvent>,
    persist_tx: Option<&mpsc::Sender<PersistMsg>>,
    config: &RuntimeConfig,
    ops_since_snapshot: &mut usize,
) -> bool {
    match cmd {
        Command::Insert { draft, resp } => {
            let res = reserve_persist(persist_tx).and_then(|permit| {
                let (id, stored) = store.insert(draft)?;
                publish(store, stored, VoterEvent::Inserted { id }, events_tx, permit);
                Ok(id)
            });
            let ok = res.is_ok();
            let _ = resp.send(res);
            if ok {
                *ops_since_snapshot += 1;
                maybe_auto_checkpoint(store, persist_tx, config, ops_since_snapshot).await;
            }
        }
        Command::Patch { id, patch, resp } => {
            let res = reserve_persist(persist_tx).and_then(|permit| {
                let stored = store.patch(id, patch)?;
                publish(store, stored, VoterEvent::Updated { id }, events_tx, permit);
                Ok(())
            });
            if res.is_ok() {
                *ops_since_snapshot += 1;
            }
            let _ = resp.send(res);
        }
        Command::Delete { id, resp } => {
            let res = reserve_persist(persist_tx).and_then(|permit| {
                let (removed, stored) = store.delete(id)?;
                publish(store, stored, VoterEvent::Deleted { id }, events_tx, permit);
                Ok(removed)
            });
            if res.is_ok() {
                *ops_since_snapshot += 1;
            }
            let _ = resp.send(res);
        }
        Command::Get { id, resp } => {
            let _ = resp.send(store.get_cloned(id));
        }
        Command::ExactMatch { field, value, resp } => {
            let out = store
                .exact_match(field, &value)
                .into_iter()
                .cloned()
                .collect();
            let _ = resp.send(out);
        }
        Command::RangeMatch {
            field,
            lower,
            upper,
            resp,
        } => {
            let out = store
                .range_match(field, &lower, &upper)
                .into_iter()
                .cloned()
                .collect();
            let _ = resp.send(out);
        }
        Command::FetchAll { resp } => {
            let _ = resp.send(store.all_cloned());
        }
        Command::Flush { resp } => {
            let out = if let Some(tx) = persist_tx {
                let (flush_tx, flush_rx) = oneshot::channel();
                if tx
                    .send(PersistMsg::Flush { resp: flush_tx })
                    .await
                    .is_err()
                {
                    Err(RuntimeError::ChannelClosed)
                } else {
                    flush_rx
                        .await
                        .map_err(|_| RuntimeError::ChannelClosed)
                        .and_then(|r| r.map_err(RuntimeError::from))
                }
            } else {
                Ok(store.latest_op_seq())
            };
            let _ = resp.send(out);
        }
        Command::Checkpoint { resp } => {
            let out = if let Some(tx) = persist_tx {
                let res = request_checkpoint(store, tx, config).await;
                if res.is_ok() {
                    *ops_since_snapshot = 0;
                }
                res
            } else {
                Ok(())
            };
            let _ = resp.send(out);
        }
        Command::Shutdown { resp } => {
            let out = if let Some(tx) = persist_tx {
                let (done_tx, done_rx) = oneshot::channel();
                if tx.send(PersistMsg::Shutdown { resp: done_tx }).await.is_err() {
                    Err(RuntimeError::ChannelClosed)
                } else {
                    done_rx.await.map_err(|_| RuntimeError::ChannelClosed)
                }
            } else {
                Ok(())
            };
            let _ = resp.send(out);
            return true;
        }
    }

    false
}

async fn request_checkpoint(
    store: &VoterStore,
    tx: &mpsc::Sender<PersistMsg>,
    config: &RuntimeConfig,
) -> Result<(), RuntimeError> {
    let snapshot = store.export_snapshot();
    let last_seq = store.latest_op_seq();
    let (cp_tx, cp_rx) = oneshot::channel();
    tx.send(PersistMsg::Checkpoint {
        snapshot,
        last_seq,
        compact: config.compact_after_snapshot,
        resp: cp_tx,
    })
    .await
    .map_err(|_| RuntimeError::ChannelClosed)?;

    cp_rx
        .await
        .map_err(|_| RuntimeError::ChannelClosed)?
        .map_err(RuntimeError::from)?;
    debug!(last_seq, "voter snapshot written");
    Ok(())
}

fn spawn_persistence_worker(
    sink: Box<dyn OpSink>,
    mut rx: mpsc::Receiver<PersistMsg>,
    durable_tx: mpsc::UnboundedSender<Result<OpSeq, PersistError>>,
    config: RuntimeConfig,
) {
    let sink = Arc::new(Mutex::new(sink));
    tokio::spawn(async move {
        let mut buf = Vec::<StoredOp>::new();
        let mut deadline = Instant::now() + Duration::from_millis(config.batch_max_latency_ms);
        let mut last_durable: OpSeq = 0;

        loop {
            tokio::select! {
                msg = rx.recv() => {
                    let Some(msg) = msg else {
                        let _ = flush_buf(&sink, &mut buf, &mut last_durable, &durable_tx, true).await;
                        break;
                    };

                    match msg {
                        PersistMsg::Op(stored) => {
                            let is_insert = matches!(stored.op, Op::Insert { .. });
                            buf.push(stored);

                            if buf.len() >= config.batch_max_ops || (config.flush_on_insert && is_insert) {
                                let _ = flush_buf(&sink, &mut buf, &mut last_durable, &durable_tx, true).await;
                                deadline = Instant::now() + Duration::from_millis(config.batch_max_latency_ms);
                            }
                        }
                        PersistMsg::Flush { resp } => {
                            let result = flush_buf(&sink, &mut buf, &mut last_durable, &durable_tx, true).await;
                            let _ = resp.send(result.map(|_| last_durable));
                            deadline = Instant::now() + Duration::from_millis(config.batch_max_latency_ms);
                        }
                        PersistMsg::Checkpoint { snapshot, last_seq, compact, resp } => {
                            let result = match flush_buf(&sink, &mut buf, &mut last_durable, &durable_tx, true).await {
                                Err(err) => Err(err),
                                Ok(()) => {
                                    let sink_ref = Arc::clone(&sink);
                                    match tokio::task::spawn_blocking(move || {
                                        let mut sink = sink_ref.blocking_lock();
                                        sink.write_snapshot(&snapshot, last_seq)?;
                                        if compact {
                                            let _ = sink.compact_through(last_seq)?;
                                        }
                                        Result::<(), PersistError>::Ok(())
                                    }).await {
                                        Ok(inner) => inner,
                                        Err(e) => Err(PersistError::Message(format!("join error: {e}"))),
                                    }
                                }
                            };
                            let _ = resp.send(result);
                            deadline = Instant::now() + Duration::from_millis(config.batch_max_latency_ms);
                        }
                        PersistMsg::Shutdown { resp } => {
                            let _ = flush_buf(&sink, &mut buf, &mut last_durable, &durable_tx, true).await;
                            let _ = resp.send(());
                            break;
                        }
                    }
                }
                _ = tokio::time::sleep_until(deadline), if !buf.is_empty() => {
                    let _ = flush_buf(&sink, &mut buf, &mut last_durable, &durable_tx, false).await;
                    deadline = Instant::now() + Duration::from_millis(config.batch_max_latency_ms);
                }
            }
        }
    });
}

async fn flush_buf(
    sink: &Arc<Mutex<Box<dyn OpSink>>>,
    buf: &mut Vec<StoredOp>,
    last_durable: &mut OpSeq,
    durable_tx: &mpsc::UnboundedSender<Result<OpSeq, PersistError>>,
    call_flush: bool,
) -> Result<(), PersistError> {
    if buf.is_empty() {
        if call_flush {
            let sink_ref = Arc::clone(sink);
            tokio::task::spawn_blocking(move || {
                let mut sink = sink_ref.blocking_lock();
                sink.flush()
            })
            .await
            .map_err(|e| PersistError::Message(format!("join error: {e}")))??;
        }
        return Ok(());
    }

    let ops = std::mem::take(buf);
    let sink_ref = Arc::clone(sink);
    let append_res: Result<OpSeq, PersistError> = tokio::task::spawn_blocking(move || {
        let mut sink = sink_ref.blocking_lock();
        let seq = sink.append_ops(&ops)?;
        if call_flush {
            sink.flush()?;
        }
        Ok(seq)
    })
    .await
    .map_err(|e| PersistError::Message(format!("join error: {e}")))?;

    match append_res {
        Ok(seq) => {
            *last_durable = (*last_durable).max(seq);
            let _ = durable_tx.send(Ok(*last_durable));
            Ok(())
        }
        Err(err) => {
            let _ = durable_tx.send(Err(PersistError::Message(format!("append failed: {err}"))));
            Err(err)
        }
    }
}

async fn maybe_auto_checkpoint(
    store: &VoterStore,
    persist_tx: Option<&mpsc::Sender<PersistMsg>>,
    config: &RuntimeConfig,
    ops_since_snapshot: &mut usize,
) {
    if config.snapshot_every_ops == 0 || *ops_since_snapshot < config.snapshot_every_ops {
        return;
    }

    let Some(tx) = persist_tx else {
        return;
    };

    match request_checkpoint(store, tx, config).await {
        Ok(()) => *ops_since_snapshot = 0,
        Err(err) => warn!(error = %err, "automatic voter snapshot failed"),
    }
}
