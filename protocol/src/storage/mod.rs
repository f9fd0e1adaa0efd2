//! # Storage Module
//!
//! Durable adapters for the [`Persistence`](crate::collab::Persistence)
//! collaborator.
//!
//! ```text
//! db.rs — SledStore: sled trees, bincode values
//! ```
//!
//! The core never reads from storage except during
//! [`ConsensusEngine::recover`](crate::consensus::ConsensusEngine::recover);
//! in steady state the in-memory state is authoritative and the store is a
//! write-behind log.

pub mod db;

pub use db::SledStore;
