//! Persistence collaborator.
//!
//! A transactional append/replace API keyed by entity id and version.
//! Batches, proposals, members and accumulator states are replaced by key;
//! treasury entries and accumulator ops are append-only (their keys never
//! repeat).

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;

use crate::accumulator::{AccumulatorKind, AccumulatorOp, AccumulatorState};
use crate::batch::Batch;
use crate::consensus::freeze::FreezeProposal;
use crate::consensus::member::ConsortiumMember;
use crate::consensus::slashing::TreasuryEntry;
use crate::types::{BatchId, MemberId, ProposalId};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage backend error: {0}")]
    Backend(String),

    #[error("encoding error: {0}")]
    Codec(String),

    #[error("corrupt record: {0}")]
    Corrupt(String),
}

/// Anything the core hands to the persistence collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Entity {
    Batch(Batch),
    FreezeProposal(FreezeProposal),
    TreasuryEntry(TreasuryEntry),
    AccumulatorState(AccumulatorState),
    AccumulatorOp(AccumulatorOp),
    Member(ConsortiumMember),
}

impl Entity {
    /// Storage key: `<kind>/<id>[/<version>]`. Numeric parts are zero-padded
    /// so lexicographic order is numeric order.
    pub fn key(&self) -> String {
        match self {
            Self::Batch(b) => format!("batch/{:020}", b.id.0),
            Self::FreezeProposal(p) => format!("proposal/{:020}", p.id.0),
            Self::TreasuryEntry(e) => format!("treasury/{}", e.id),
            Self::AccumulatorState(s) => format!("accumulator/{}", s.kind.label()),
            Self::AccumulatorOp(op) => {
                format!("accumulator-log/{}/{:020}", op.kind.label(), op.version)
            }
            Self::Member(m) => format!("member/{}", m.id),
        }
    }
}

pub trait Persistence: Send + Sync {
    fn persist(&self, entity: &Entity) -> Result<(), StoreError>;

    fn load_members(&self) -> Result<Vec<ConsortiumMember>, StoreError>;

    fn load_active_members(&self) -> Result<Vec<ConsortiumMember>, StoreError> {
        Ok(self
            .load_members()?
            .into_iter()
            .filter(|m| m.active)
            .collect())
    }

    /// Latest persisted state, or `None` if the set was never mutated.
    fn load_accumulator_state(
        &self,
        kind: AccumulatorKind,
    ) -> Result<Option<AccumulatorState>, StoreError>;

    /// Mutation log in version order.
    fn load_accumulator_log(&self, kind: AccumulatorKind)
        -> Result<Vec<AccumulatorOp>, StoreError>;

    /// All batches in id order.
    fn load_batches(&self) -> Result<Vec<Batch>, StoreError>;

    /// All freeze proposals in id order.
    fn load_proposals(&self) -> Result<Vec<FreezeProposal>, StoreError>;

    /// Treasury ledger in recording order.
    fn load_treasury(&self) -> Result<Vec<TreasuryEntry>, StoreError>;
}

// ---------------------------------------------------------------------------
// In-memory store
// ---------------------------------------------------------------------------

#[derive(Default)]
struct Tables {
    batches: BTreeMap<BatchId, Batch>,
    proposals: BTreeMap<ProposalId, FreezeProposal>,
    members: BTreeMap<MemberId, ConsortiumMember>,
    treasury: Vec<TreasuryEntry>,
    states: HashMap<AccumulatorKind, AccumulatorState>,
    logs: HashMap<AccumulatorKind, BTreeMap<u64, AccumulatorOp>>,
}

/// Process-local store for tests and the devnet.
///
/// `set_failing(true)` makes every write fail, for exercising the
/// fire-and-forget paths.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
    failing: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

impl Persistence for MemoryStore {
    fn persist(&self, entity: &Entity) -> Result<(), StoreError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(StoreError::Backend(format!(
                "write of {} refused",
                entity.key()
            )));
        }

        let mut t = self.tables.lock();
        match entity.clone() {
            Entity::Batch(b) => {
                t.batches.insert(b.id, b);
            }
            Entity::FreezeProposal(p) => {
                t.proposals.insert(p.id, p);
            }
            Entity::TreasuryEntry(e) => {
                if !t.treasury.iter().any(|x| x.id == e.id) {
                    t.treasury.push(e);
                }
            }
            Entity::AccumulatorState(s) => {
                t.states.insert(s.kind, s);
            }
            Entity::AccumulatorOp(op) => {
                t.logs.entry(op.kind).or_default().insert(op.version, op);
            }
            Entity::Member(m) => {
                t.members.insert(m.id.clone(), m);
            }
        }
        Ok(())
    }

    fn load_members(&self) -> Result<Vec<ConsortiumMember>, StoreError> {
        Ok(self.tables.lock().members.values().cloned().collect())
    }

    fn load_accumulator_state(
        &self,
        kind: AccumulatorKind,
    ) -> Result<Option<AccumulatorState>, StoreError> {
        Ok(self.tables.lock().states.get(&kind).copied())
    }

    fn load_accumulator_log(
        &self,
        kind: AccumulatorKind,
    ) -> Result<Vec<AccumulatorOp>, StoreError> {
        Ok(self
            .tables
            .lock()
            .logs
            .get(&kind)
            .map(|log| log.values().cloned().collect())
            .unwrap_or_default())
    }

    fn load_batches(&self) -> Result<Vec<Batch>, StoreError> {
        Ok(self.tables.lock().batches.values().cloned().collect())
    }

    fn load_proposals(&self) -> Result<Vec<FreezeProposal>, StoreError> {
        Ok(self.tables.lock().proposals.values().cloned().collect())
    }

    fn load_treasury(&self) -> Result<Vec<TreasuryEntry>, StoreError> {
        Ok(self.tables.lock().treasury.clone())
    }
}
