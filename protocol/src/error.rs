//! # Error Taxonomy
//!
//! Every fallible public operation in the core returns [`CoreResult`]. The
//! first seven variants are the protocol-level outcomes callers are expected
//! to branch on; the rest wrap component failures.
//!
//! Only `QuorumNotReached` has automatic local recovery (the batch is
//! requeued). Everything else is terminal for the affected entity and is
//! surfaced to the caller.

use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::collab::StoreError;
use crate::crypto::encryption::EncryptionError;
use crate::crypto::keys::KeyError;
use crate::threshold::shamir::ShamirError;
use crate::types::Digest;

/// Crate-wide error type.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Bad field shape. The caller's fault; the input never enters a batch.
    #[error("malformed input: {0}")]
    MalformedInput(String),

    /// A range proof or Merkle proof did not verify.
    #[error("proof verification failed: {0}")]
    ProofVerificationFailure(String),

    /// A nullifier was already admitted for a different transaction.
    #[error("double spend detected: nullifier {nullifier} already admitted")]
    DoubleSpendDetected {
        /// The colliding nullifier.
        nullifier: Digest,
    },

    /// Threshold reconstruction attempted with a share set the policy forbids.
    #[error("access structure violation: {0}")]
    AccessStructureViolation(String),

    /// Court access attempted at or after the grant's expiry.
    #[error("court access grant {grant} expired at {expires_at}")]
    GrantExpired {
        /// Grant identifier.
        grant: Uuid,
        /// When the grant became inert.
        expires_at: DateTime<Utc>,
    },

    /// Not enough approvals inside the voting window.
    #[error("quorum not reached: {approvals} approvals, {required} required")]
    QuorumNotReached {
        /// Approvals counted.
        approvals: usize,
        /// Approvals required by the active member count.
        required: usize,
    },

    /// The operation is not defined for this variant (e.g. nullifier revoke).
    #[error("unsupported operation: {0}")]
    UnsupportedOperation(&'static str),

    /// An entity was asked to move along an edge its state machine lacks.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// Lookup by id failed.
    #[error("not found: {0}")]
    NotFound(String),

    /// The group signature backend refused to sign or open.
    #[error("group signature error: {0}")]
    GroupSignature(String),

    #[error(transparent)]
    Encryption(#[from] EncryptionError),

    #[error(transparent)]
    Shamir(#[from] ShamirError),

    #[error(transparent)]
    Key(#[from] KeyError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Shorthand used across the crate.
pub type CoreResult<T> = Result<T, CoreError>;

impl CoreError {
    /// Stable event-type label, used when reporting failures to the audit sink.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::MalformedInput(_) => "malformed_input",
            Self::ProofVerificationFailure(_) => "proof_verification_failure",
            Self::DoubleSpendDetected { .. } => "double_spend_detected",
            Self::AccessStructureViolation(_) => "access_structure_violation",
            Self::GrantExpired { .. } => "grant_expired",
            Self::QuorumNotReached { .. } => "quorum_not_reached",
            Self::UnsupportedOperation(_) => "unsupported_operation",
            Self::InvalidState(_) => "invalid_state",
            Self::NotFound(_) => "not_found",
            Self::GroupSignature(_) => "group_signature",
            Self::Encryption(_) => "encryption",
            Self::Shamir(_) => "shamir",
            Self::Key(_) => "key",
            Self::Store(_) => "store",
        }
    }
}
