// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # Shroud — Core Library
//!
//! Private batch consensus for a consortium ledger, with lawful access that
//! a court can exercise and nobody else can.
//!
//! Transactions are committed and nullified, proved in range without
//! revealing amounts, sealed into Merkle batches and voted on anonymously by
//! the consortium. Approved batches settle against an append-only nullifier
//! set. Sampled re-verification opens the anonymous votes and slashes
//! members who voted against the evidence. A court order, time-boxed and
//! gated on a consortium freeze, reconstructs one transaction's payload key
//! from threshold shares.
//!
//! ## Architecture
//!
//! - **commitment** — Commitments, nullifiers and the transaction model.
//! - **zkp** — Range proofs behind the `RangeProver` / `RangeVerifier` seam.
//! - **batch** — Transaction pool, sealing and Merkle inclusion proofs.
//! - **group** — Per-round anonymous voting credentials with an opener.
//! - **threshold** — Constrained key escrow (mandatory + alternate holders).
//! - **accumulator** — Nullifier and freeze sets.
//! - **consensus** — Voting, settlement, freezes, slashing and treasury.
//! - **court** — Grants and payload decryption under threshold control.
//! - **collab** — Persistence, audit, identity and clock seams.
//! - **storage** — sled adapter for persistence.
//! - **crypto** — Hashing, AES-256-GCM and Ed25519 wrappers.
//! - **config** — Protocol constants and runtime parameters.
//!
//! ## Design Philosophy
//!
//! 1. The core decides; collaborators record. A failed write never undoes
//!    a decision.
//! 2. Every state change that touches money or access leaves an audit event.
//! 3. Secrets never reach a log line or an audit payload.

pub mod accumulator;
pub mod batch;
pub mod collab;
pub mod commitment;
pub mod config;
pub mod consensus;
pub mod court;
pub mod crypto;
pub mod error;
pub mod group;
pub mod storage;
pub mod threshold;
pub mod types;
pub mod zkp;

pub use error::{CoreError, CoreResult};
pub use types::{AccountId, BatchId, Decision, Digest, MemberId, PartyId, ProposalId};
