//! # Collaborators
//!
//! The seams between the core and the world around it. The core never
//! embeds storage, audit or credential logic; it calls these traits.
//!
//! ```text
//! persistence.rs — Persistence (+ MemoryStore)
//! audit.rs       — AuditSink (+ MemoryAuditLog, TracingAuditSink)
//! identity.rs    — CredentialVerifier (+ Ed25519CredentialVerifier)
//! clock.rs       — Clock (+ SystemClock, ManualClock)
//! ```
//!
//! The sled-backed [`Persistence`] adapter lives in [`crate::storage`].

pub mod audit;
pub mod clock;
pub mod identity;
pub mod persistence;

pub use audit::{AuditEvent, AuditSink, MemoryAuditLog, TracingAuditSink};
pub use clock::{Clock, ManualClock, SystemClock};
pub use identity::{CredentialVerifier, Ed25519CredentialVerifier, JudgeCredential};
pub use persistence::{Entity, MemoryStore, Persistence, StoreError};
