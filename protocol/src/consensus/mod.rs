//! # Consensus
//!
//! Consortium voting on sealed batches and on freeze proposals, settlement
//! against the nullifier set, and the stake economy that keeps voters
//! honest.
//!
//! ## Quorum
//!
//! With `n` active members a ballot passes with `⌈2n/3⌉` approvals.
//! Non-voters abstain and count against the quorum. Votes are group
//! signatures: the engine sees a valid roster member, never which one,
//! until a sampled re-verification opens them.
//!
//! ## Modules
//!
//! ```text
//! member.rs    — ConsortiumMember
//! vote.rs      — Ballot, Vote, Tally
//! freeze.rs    — FreezeProposal, FreezeApproval
//! slashing.rs  — SlashingSchedule, Treasury
//! reverify.rs  — IndependentVerifier
//! engine.rs    — ConsensusEngine
//! collect.rs   — async vote collection
//! ```

pub mod collect;
pub mod engine;
pub mod freeze;
pub mod member;
pub mod reverify;
pub mod slashing;
pub mod vote;

pub use collect::{collect_votes, run_batch_vote, run_proposal_vote, VoteSource};
pub use engine::{Collaborators, ConsensusEngine, Investigation, Settlement};
pub use freeze::{FreezeAction, FreezeApproval, FreezeProposal, ProposalState};
pub use member::ConsortiumMember;
pub use reverify::{BatchReview, IndependentVerifier, ReverificationReport};
pub use slashing::{SlashOutcome, SlashingSchedule, Treasury, TreasuryEntry, TreasuryEntryKind};
pub use vote::{ballot_message, Ballot, BallotSubject, OpenBallot, Tally, Vote};
