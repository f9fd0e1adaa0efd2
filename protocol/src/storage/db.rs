//! # SledStore — Persistent Storage Engine
//!
//! The reference [`Persistence`] adapter, built on sled's embedded
//! key-value store.
//!
//! ## Tree Layout
//!
//! | Tree               | Key                          | Value                       |
//! |--------------------|------------------------------|-----------------------------|
//! | `batches`          | `batch id` (8B BE)           | `bincode(Batch)`            |
//! | `proposals`        | `proposal id` (8B BE)        | `bincode(FreezeProposal)`   |
//! | `members`          | `member id` (UTF-8)          | `bincode(ConsortiumMember)` |
//! | `treasury`         | `sled id` (8B BE)            | `bincode(TreasuryEntry)`    |
//! | `treasury_index`   | `entry uuid` (16B)           | `sled id` (8B BE)           |
//! | `accumulators`     | `kind label` (UTF-8)         | `bincode(AccumulatorState)` |
//! | `accumulator_log`  | `label ‖ 0x00 ‖ version BE`  | `bincode(AccumulatorOp)`    |
//!
//! Numeric keys are big-endian so sled's lexicographic order is numeric
//! order and every `load_*` comes back sorted without a second pass.
//! Treasury entries are keyed by a monotonic sled id, preserving recording
//! order; the uuid index makes re-persisting an entry a no-op.

use serde::de::DeserializeOwned;
use serde::Serialize;
use sled::{Db, Tree};
use std::path::Path;
use tracing::debug;

use crate::accumulator::{AccumulatorKind, AccumulatorOp, AccumulatorState};
use crate::batch::Batch;
use crate::collab::{Entity, Persistence, StoreError};
use crate::consensus::{ConsortiumMember, FreezeProposal, TreasuryEntry};

impl From<sled::Error> for StoreError {
    fn from(e: sled::Error) -> Self {
        StoreError::Backend(e.to_string())
    }
}

fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, StoreError> {
    bincode::serialize(value).map_err(|e| StoreError::Codec(e.to_string()))
}

fn decode<T: DeserializeOwned>(tree: &str, bytes: &[u8]) -> Result<T, StoreError> {
    bincode::deserialize(bytes).map_err(|e| StoreError::Corrupt(format!("{tree}: {e}")))
}

fn log_prefix(kind: AccumulatorKind) -> Vec<u8> {
    let mut prefix = kind.label().as_bytes().to_vec();
    prefix.push(0);
    prefix
}

fn load_all<T: DeserializeOwned>(name: &str, tree: &Tree) -> Result<Vec<T>, StoreError> {
    tree.iter()
        .values()
        .map(|v| decode(name, &v?))
        .collect()
}

/// sled-backed persistence. Cheap to clone; clones share the database.
#[derive(Debug, Clone)]
pub struct SledStore {
    db: Db,
    batches: Tree,
    proposals: Tree,
    members: Tree,
    treasury: Tree,
    treasury_index: Tree,
    accumulators: Tree,
    accumulator_log: Tree,
}

impl SledStore {
    /// Open or create a store at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        Self::from_db(sled::open(path)?)
    }

    /// A store that is deleted when dropped.
    pub fn open_temporary() -> Result<Self, StoreError> {
        Self::from_db(sled::Config::new().temporary(true).open()?)
    }

    fn from_db(db: Db) -> Result<Self, StoreError> {
        Ok(Self {
            batches: db.open_tree("batches")?,
            proposals: db.open_tree("proposals")?,
            members: db.open_tree("members")?,
            treasury: db.open_tree("treasury")?,
            treasury_index: db.open_tree("treasury_index")?,
            accumulators: db.open_tree("accumulators")?,
            accumulator_log: db.open_tree("accumulator_log")?,
            db,
        })
    }

    /// Block until everything written so far is on disk.
    pub fn flush(&self) -> Result<(), StoreError> {
        self.db.flush()?;
        Ok(())
    }

    fn append_treasury(&self, entry: &TreasuryEntry) -> Result<(), StoreError> {
        if self.treasury_index.contains_key(entry.id.as_bytes())? {
            return Ok(());
        }
        let seq = self.db.generate_id()?.to_be_bytes();
        self.treasury.insert(seq, encode(entry)?)?;
        self.treasury_index.insert(entry.id.as_bytes(), seq.to_vec())?;
        Ok(())
    }
}

impl Persistence for SledStore {
    fn persist(&self, entity: &Entity) -> Result<(), StoreError> {
        match entity {
            Entity::Batch(b) => {
                self.batches.insert(b.id.0.to_be_bytes(), encode(b)?)?;
            }
            Entity::FreezeProposal(p) => {
                self.proposals.insert(p.id.0.to_be_bytes(), encode(p)?)?;
            }
            Entity::Member(m) => {
                self.members.insert(m.id.as_str().as_bytes(), encode(m)?)?;
            }
            Entity::TreasuryEntry(e) => self.append_treasury(e)?,
            Entity::AccumulatorState(s) => {
                self.accumulators.insert(s.kind.label(), encode(s)?)?;
            }
            Entity::AccumulatorOp(op) => {
                let mut key = log_prefix(op.kind);
                key.extend_from_slice(&op.version.to_be_bytes());
                self.accumulator_log.insert(key, encode(op)?)?;
            }
        }
        debug!(key = %entity.key(), "entity persisted");
        Ok(())
    }

    fn load_members(&self) -> Result<Vec<ConsortiumMember>, StoreError> {
        load_all("members", &self.members)
    }

    fn load_accumulator_state(
        &self,
        kind: AccumulatorKind,
    ) -> Result<Option<AccumulatorState>, StoreError> {
        self.accumulators
            .get(kind.label())?
            .map(|v| decode("accumulators", &v))
            .transpose()
    }

    fn load_accumulator_log(
        &self,
        kind: AccumulatorKind,
    ) -> Result<Vec<AccumulatorOp>, StoreError> {
        self.accumulator_log
            .scan_prefix(log_prefix(kind))
            .values()
            .map(|v| decode("accumulator_log", &v?))
            .collect()
    }

    fn load_batches(&self) -> Result<Vec<Batch>, StoreError> {
        load_all("batches", &self.batches)
    }

    fn load_proposals(&self) -> Result<Vec<FreezeProposal>, StoreError> {
        load_all("proposals", &self.proposals)
    }

    fn load_treasury(&self) -> Result<Vec<TreasuryEntry>, StoreError> {
        load_all("treasury", &self.treasury)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consensus::{FreezeAction, TreasuryEntryKind};
    use crate::crypto::hash::sha256;
    use crate::types::{AccountId, MemberId, ProposalId};
    use chrono::Utc;
    use uuid::Uuid;

    fn op(version: u64) -> AccumulatorOp {
        AccumulatorOp {
            kind: AccumulatorKind::Nullifier,
            version,
            op: crate::accumulator::AccumulatorOpKind::Admit,
            element: sha256(&version.to_be_bytes()),
            binding: Some(sha256(b"tx")),
        }
    }

    #[test]
    fn members_and_proposals_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = SledStore::open(dir.path()).unwrap();
            let mut member = ConsortiumMember::new(MemberId::new("bank-a"), 500);
            store.persist(&Entity::Member(member.clone())).unwrap();
            member.stake = 450;
            store.persist(&Entity::Member(member)).unwrap();
            store
                .persist(&Entity::FreezeProposal(FreezeProposal::new(
                    ProposalId(3),
                    AccountId::new("acct"),
                    FreezeAction::Freeze,
                    "order".into(),
                    Utc::now(),
                )))
                .unwrap();
            store.flush().unwrap();
        }

        let store = SledStore::open(dir.path()).unwrap();
        let members = store.load_members().unwrap();
        assert_eq!(members.len(), 1);
        assert_eq!(members[0].stake, 450);
        assert_eq!(store.load_proposals().unwrap()[0].id, ProposalId(3));
    }

    #[test]
    fn accumulator_log_comes_back_in_version_order() {
        let store = SledStore::open_temporary().unwrap();
        for v in [3u64, 1, 256, 2] {
            store.persist(&Entity::AccumulatorOp(op(v))).unwrap();
        }
        let versions: Vec<u64> = store
            .load_accumulator_log(AccumulatorKind::Nullifier)
            .unwrap()
            .iter()
            .map(|o| o.version)
            .collect();
        assert_eq!(versions, vec![1, 2, 3, 256]);
        assert!(store
            .load_accumulator_log(AccumulatorKind::Freeze)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn missing_accumulator_state_is_none() {
        let store = SledStore::open_temporary().unwrap();
        assert!(store
            .load_accumulator_state(AccumulatorKind::Freeze)
            .unwrap()
            .is_none());
        let state = AccumulatorState::genesis(AccumulatorKind::Freeze);
        store.persist(&Entity::AccumulatorState(state)).unwrap();
        assert_eq!(
            store.load_accumulator_state(AccumulatorKind::Freeze).unwrap(),
            Some(state)
        );
    }

    #[test]
    fn treasury_entries_append_once_in_order() {
        let store = SledStore::open_temporary().unwrap();
        let entries: Vec<TreasuryEntry> = (0..3)
            .map(|i| TreasuryEntry {
                id: Uuid::new_v4(),
                kind: TreasuryEntryKind::Slash,
                member: MemberId::new("m"),
                amount: 10 * (i + 1),
                reference: i + 1,
                recorded_at: Utc::now(),
            })
            .collect();
        for e in &entries {
            store.persist(&Entity::TreasuryEntry(e.clone())).unwrap();
        }
        store
            .persist(&Entity::TreasuryEntry(entries[0].clone()))
            .unwrap();
        assert_eq!(store.load_treasury().unwrap(), entries);
    }
}
