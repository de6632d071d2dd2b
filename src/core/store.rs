use std::{
    ops::Bound,
    time::{SystemTime, UNIX_EPOCH},
};

use hashbrown::HashMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    op::{Op, StoredOp},
    types::{DocId, Field, OpSeq},
    voter::{VoterDraft, VoterPatch, VoterRecord},
};

use super::indices::{VecIndex, index_insert, index_remove};

/// Mutation rejected by the store.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// No record has this document id.
    #[error("voter document {0} not found")]
    MissingVoter(DocId),
    /// A replayed insert reused a document id.
    #[error("voter document {0} already exists")]
    AlreadyExists(DocId),
    /// Another record already holds this voter id.
    #[error("voter id {0} is already registered")]
    DuplicateVoterId(String),
    /// A required field is blank; carries the field's JSON name.
    #[error("{0} must not be empty")]
    EmptyField(&'static str),
}

/// Serializable image of a [`VoterStore`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreSnapshotV1 {
    /// Next document id to assign.
    pub next_doc_id: DocId,
    /// Next op seq to assign.
    pub next_op_seq: OpSeq,
    /// Document ids in insertion order.
    pub order: Vec<DocId>,
    /// Records, matching `order`.
    pub records: Vec<VoterRecord>,
}

/// Authoritative voter records with name and voter-id indices.
///
/// Every successful mutation yields a [`StoredOp`] with the next sequence number
/// and queues it for [`VoterStore::drain_pending_ops`].
#[derive(Debug, Default)]
pub struct VoterStore {
    records: HashMap<DocId, VoterRecord>,
    order: Vec<DocId>,
    by_voter_id: VecIndex<String>,
    by_name: VecIndex<String>,
    pending_ops: Vec<StoredOp>,
    next_op_seq: OpSeq,
    next_doc_id: DocId,
}

impl VoterStore {
    /// Empty store; the first document id and op seq are both 1.
    pub fn new() -> Self {
        Self {
            next_op_seq: 1,
            next_doc_id: 1,
            ..Self::default()
        }
    }

    /// Restores a snapshot and rebuilds the indices.
    pub fn from_snapshot(snapshot: StoreSnapshotV1) -> Result<Self, StoreError> {
        let mut store = Self {
            next_doc_id: snapshot.next_doc_id,
            next_op_seq: snapshot.next_op_seq,
            order: snapshot.order,
            ..Self::default()
        };

        for rec in snapshot.records {
            if store.by_voter_id.contains_key(&rec.voter_id) {
                return Err(StoreError::DuplicateVoterId(rec.voter_id));
            }
            store.insert_indices(&rec);
            store.records.insert(rec.id, rec);
        }

        Ok(store)
    }

    /// Copies the store into a snapshot.
    pub fn export_snapshot(&self) -> StoreSnapshotV1 {
        StoreSnapshotV1 {
            next_doc_id: self.next_doc_id,
            next_op_seq: self.next_op_seq,
            order: self.order.clone(),
            records: self.all().into_iter().cloned().collect(),
        }
    }

    /// Normalizes and inserts a draft. Name and voter id are required and the
    /// voter id must be unused.
    pub fn insert(&mut self, draft: VoterDraft) -> Result<(DocId, StoredOp), StoreError> {
        let draft = draft.normalized();
        if draft.name.is_empty() {
            return Err(StoreError::EmptyField("name"));
        }
        if draft.voter_id.is_empty() {
            return Err(StoreError::EmptyField("voterId"));
        }

        let id = self.next_doc_id;
        let voter = VoterRecord {
            id,
            serial: draft.serial,
            name: draft.name,
            sex: draft.sex,
            voter_id: draft.voter_id,
            mobile: draft.mobile,
        };

        let stored = self.apply_insert_with_seq(voter, self.next_op_seq)?;
        self.pending_ops.push(stored.clone());
        Ok((id, stored))
    }

    /// Overwrites the fields present in `patch`, re-indexing changed keys.
    pub fn patch(&mut self, id: DocId, patch: VoterPatch) -> Result<StoredOp, StoreError> {
        let patch = patch.normalized();
        if patch.name.as_deref().is_some_and(str::is_empty) {
            return Err(StoreError::EmptyField("name"));
        }
        if patch.voter_id.as_deref().is_some_and(str::is_empty) {
            return Err(StoreError::EmptyField("voterId"));
        }

        let stored = self.apply_patch_with_seq(id, patch, self.next_op_seq)?;
        self.pending_ops.push(stored.clone());
        Ok(stored)
    }

    /// Removes a record and returns it.
    pub fn delete(&mut self, id: DocId) -> Result<(VoterRecord, StoredOp), StoreError> {
        let removed = self.get_cloned(id).ok_or(StoreError::MissingVoter(id))?;
        let stored = self.apply_delete_with_seq(id, self.next_op_seq)?;
        self.pending_ops.push(stored.clone());
        Ok((removed, stored))
    }

    /// Applies a journaled op at its recorded seq.
    pub fn apply_replayed_op(&mut self, stored: StoredOp) -> Result<(), StoreError> {
        let seq = stored.seq;
        match stored.op {
            Op::Insert { voter } => {
                self.apply_insert_with_seq(voter, seq)?;
            }
            Op::Patch { id, patch } => {
                self.apply_patch_with_seq(id, patch, seq)?;
            }
            Op::Delete { voter } => {
                self.apply_delete_with_seq(voter.id, seq)?;
            }
        }
        Ok(())
    }

    /// Record by document id.
    pub fn get(&self, id: DocId) -> Option<&VoterRecord> {
        self.records.get(&id)
    }

    /// Owned copy of [`VoterStore::get`].
    pub fn get_cloned(&self, id: DocId) -> Option<VoterRecord> {
        self.get(id).cloned()
    }

    /// Lookup by normalized voter id.
    pub fn by_voter_id(&self, voter_id: &str) -> Option<&VoterRecord> {
        self.exact_match(Field::VoterId, voter_id).into_iter().next()
    }

    /// Records whose `field` equals `value`, in index order.
    pub fn exact_match(&self, field: Field, value: &str) -> Vec<&VoterRecord> {
        self.index(field)
            .get(value)
            .into_iter()
            .flat_map(|ids| ids.iter())
            .filter_map(|id| self.records.get(id))
            .collect()
    }

    /// Records whose `field` lies in `[lower, upper]` by codepoint order.
    pub fn range_match(&self, field: Field, lower: &str, upper: &str) -> Vec<&VoterRecord> {
        if lower > upper {
            return Vec::new();
        }
        self.index(field)
            .range::<str, _>((Bound::Included(lower), Bound::Included(upper)))
            .flat_map(|(_, ids)| ids.iter())
            .filter_map(|id| self.records.get(id))
            .collect()
    }

    /// Every record in insertion order.
    pub fn all(&self) -> Vec<&VoterRecord> {
        self.order
            .iter()
            .filter_map(|id| self.records.get(id))
            .collect()
    }

    /// Owned copy of [`VoterStore::all`].
    pub fn all_cloned(&self) -> Vec<VoterRecord> {
        self.all().into_iter().cloned().collect()
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// True when the store holds no records.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Document ids in insertion order.
    pub fn ordered_ids(&self) -> &[DocId] {
        &self.order
    }

    /// Takes the ops produced since the last drain.
    pub fn drain_pending_ops(&mut self) -> Vec<StoredOp> {
        std::mem::take(&mut self.pending_ops)
    }

    /// Seq of the newest applied op, or 0.
    pub fn latest_op_seq(&self) -> OpSeq {
        self.next_op_seq.saturating_sub(1)
    }

    fn index(&self, field: Field) -> &VecIndex<String> {
        match field {
            Field::VoterId => &self.by_voter_id,
            Field::Name => &self.by_name,
        }
    }

    fn apply_insert_with_seq(&mut self, voter: VoterRecord, seq: OpSeq) -> Result<StoredOp, StoreError> {
        if self.records.contains_key(&voter.id) {
            return Err(StoreError::AlreadyExists(voter.id));
        }
        if self.by_voter_id.contains_key(&voter.voter_id) {
            return Err(StoreError::DuplicateVoterId(voter.voter_id));
        }

        let id = voter.id;
        self.next_doc_id = self.next_doc_id.max(id.saturating_add(1));
        self.insert_indices(&voter);
        self.order.push(id);
        self.records.insert(id, voter.clone());

        self.bump_next_seq_from(seq);
        Ok(StoredOp {
            seq,
            ts_ms: now_ms(),
            op: Op::Insert { voter },
        })
    }

    fn apply_patch_with_seq(&mut self, id: DocId, patch: VoterPatch, seq: OpSeq) -> Result<StoredOp, StoreError> {
        let current_voter_id = self
            .records
            .get(&id)
            .ok_or(StoreError::MissingVoter(id))?
            .voter_id
            .clone();

        if let Some(new_id) = &patch.voter_id {
            if *new_id != current_voter_id && self.by_voter_id.contains_key(new_id) {
                return Err(StoreError::DuplicateVoterId(new_id.clone()));
            }
        }

        let rec = self.records.get_mut(&id).ok_or(StoreError::MissingVoter(id))?;
        let old_name = rec.name.clone();
        patch.apply_to(rec);
        let new_name = rec.name.clone();
        let new_voter_id = rec.voter_id.clone();

        if new_name != old_name {
            index_remove(&mut self.by_name, &old_name, id);
            index_insert(&mut self.by_name, &new_name, id);
        }
        if new_voter_id != current_voter_id {
            index_remove(&mut self.by_voter_id, &current_voter_id, id);
            index_insert(&mut self.by_voter_id, &new_voter_id, id);
        }

        self.bump_next_seq_from(seq);
        Ok(StoredOp {
            seq,
            ts_ms: now_ms(),
            op: Op::Patch { id, patch },
        })
    }

    fn apply_delete_with_seq(&mut self, id: DocId, seq: OpSeq) -> Result<StoredOp, StoreError> {
        let voter = self.records.remove(&id).ok_or(StoreError::MissingVoter(id))?;
        index_remove(&mut self.by_name, &voter.name, id);
        index_remove(&mut self.by_voter_id, &voter.voter_id, id);
        if let Some(pos) = self.order.iter().position(|x| *x == id) {
            self.order.remove(pos);
        }

        self.bump_next_seq_from(seq);
        Ok(StoredOp {
            seq,
            ts_ms: now_ms(),
            op: Op::Delete { voter },
        })
    }

    fn insert_indices(&mut self, rec: &VoterRecord) {
        index_insert(&mut self.by_voter_id, &rec.voter_id, rec.id);
        index_insert(&mut self.by_name, &rec.name, rec.id);
    }

    fn bump_next_seq_from(&mut self, seq: OpSeq) {
        self.next_op_seq = self.next_op_seq.max(seq.saturating_add(1));
    }
}

pub(crate) fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
