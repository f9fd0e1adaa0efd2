//! # Protocol Configuration & Constants
//!
//! Every magic number in Shroud lives here. Runtime-tunable values are
//! grouped in [`ProtocolConfig`], whose `Default` reproduces the reference
//! deployment (12 members, batches of 100, 8-of-12 quorum).

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::consensus::slashing::SlashingSchedule;

// ---------------------------------------------------------------------------
// Protocol Version
// ---------------------------------------------------------------------------

/// Crate-level protocol version, reported by the node binary.
pub const PROTOCOL_VERSION: &str = "0.1.0";

// ---------------------------------------------------------------------------
// Cryptographic Parameters
// ---------------------------------------------------------------------------

/// Digest width for commitments, nullifiers and Merkle nodes.
pub const HASH_OUTPUT_LENGTH: usize = 32;

/// AES-256-GCM key length in bytes.
pub const AES_KEY_LENGTH: usize = 32;

/// AES-256-GCM nonce length in bytes.
pub const AES_NONCE_LENGTH: usize = 12;

/// AES-256-GCM authentication tag length in bytes.
pub const AES_TAG_LENGTH: usize = 16;

/// Ed25519 signature length.
pub const SIGNATURE_LENGTH: usize = 64;

/// Bits used by each range decomposition in the Groth16 backend.
pub const RANGE_BITS: usize = 64;

/// Longest accepted commitment input field (sender, receiver, salt, secret).
pub const MAX_FIELD_LENGTH: usize = 256;

// Domain-separation contexts for BLAKE3 `derive_key`. Changing any of these
// changes every digest produced under it.
pub const DOMAIN_MERKLE_LEAF: &str = "shroud 2026 merkle leaf";
pub const DOMAIN_MERKLE_NODE: &str = "shroud 2026 merkle node";
pub const DOMAIN_MERKLE_ROOT: &str = "shroud 2026 merkle root";
pub const DOMAIN_ACCUMULATOR: &str = "shroud 2026 accumulator chain";
pub const DOMAIN_PSEUDONYM: &str = "shroud 2026 group pseudonym";
pub const DOMAIN_GROUP_SIGNATURE: &str = "shroud 2026 group signature";
pub const DOMAIN_BALLOT: &str = "shroud 2026 ballot";
pub const DOMAIN_SHARE_SUBMISSION: &str = "shroud 2026 share submission";
pub const DOMAIN_COURT_ORDER: &str = "shroud 2026 court order";
pub const DOMAIN_SETTLEMENT_BINDING: &str = "shroud 2026 settlement binding";

// ---------------------------------------------------------------------------
// Batching & Voting
// ---------------------------------------------------------------------------

/// Reference batch capacity.
pub const DEFAULT_BATCH_CAPACITY: usize = 100;

/// An open, non-empty batch is sealed once this much time has passed.
pub const DEFAULT_BATCH_WINDOW: Duration = Duration::from_secs(30);

/// Members that have not voted inside this window abstain.
pub const DEFAULT_VOTE_WINDOW: Duration = Duration::from_secs(10);

/// Quorum fraction numerator (approvals ≥ ⌈NUM/DEN × active⌉).
pub const QUORUM_NUMERATOR: usize = 2;

/// Quorum fraction denominator.
pub const QUORUM_DENOMINATOR: usize = 3;

/// Fraction of settled batches independently re-verified.
pub const DEFAULT_REVERIFICATION_RATE: f64 = 0.10;

// ---------------------------------------------------------------------------
// Economics
// ---------------------------------------------------------------------------

/// Basis-point denominator used by every percentage in the slashing schedule.
pub const BPS_DENOMINATOR: u64 = 10_000;

/// First offense: 5 % of current stake.
pub const SLASH_FIRST_OFFENSE_BPS: u64 = 500;

/// Second offense: 10 % of current stake.
pub const SLASH_SECOND_OFFENSE_BPS: u64 = 1_000;

/// Third and later offenses: 20 % of current stake.
pub const SLASH_REPEAT_OFFENSE_BPS: u64 = 2_000;

/// A member whose stake drops below 30 % of its initial stake is deactivated.
pub const DEACTIVATION_FLOOR_BPS: u64 = 3_000;

// ---------------------------------------------------------------------------
// Court Access
// ---------------------------------------------------------------------------

/// Lifetime of a court-access grant.
pub const COURT_GRANT_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Mandatory share holders in the reference access structure.
pub const MANDATORY_HOLDERS: usize = 2;

/// Alternate share holders in the reference access structure.
pub const ALTERNATE_HOLDERS: usize = 3;

// ---------------------------------------------------------------------------
// Runtime configuration
// ---------------------------------------------------------------------------

/// Runtime parameters for one deployment.
///
/// Durations are stored in milliseconds/seconds so the struct maps cleanly
/// onto a JSON config file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProtocolConfig {
    /// Transactions per batch before it seals.
    pub batch_capacity: usize,
    /// Time window after which a non-empty open batch seals.
    pub batch_window_ms: u64,
    /// Voting window per ballot.
    pub vote_window_ms: u64,
    /// Fraction of settled batches sampled for re-verification.
    pub reverification_rate: f64,
    /// Court grant lifetime.
    pub court_grant_ttl_secs: u64,
    /// Refuse court grants for payloads whose subject account is not frozen.
    pub court_requires_frozen_subject: bool,
    /// Penalty schedule and deactivation floor.
    pub slashing: SlashingSchedule,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            batch_capacity: DEFAULT_BATCH_CAPACITY,
            batch_window_ms: DEFAULT_BATCH_WINDOW.as_millis() as u64,
            vote_window_ms: DEFAULT_VOTE_WINDOW.as_millis() as u64,
            reverification_rate: DEFAULT_REVERIFICATION_RATE,
            court_grant_ttl_secs: COURT_GRANT_TTL.as_secs(),
            court_requires_frozen_subject: true,
            slashing: SlashingSchedule::default(),
        }
    }
}

impl ProtocolConfig {
    pub fn batch_window(&self) -> Duration {
        Duration::from_millis(self.batch_window_ms)
    }

    pub fn vote_window(&self) -> Duration {
        Duration::from_millis(self.vote_window_ms)
    }

    pub fn court_grant_ttl(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.court_grant_ttl_secs as i64)
    }
}

// ---------------------------------------------------------------------------
// Utility
// ---------------------------------------------------------------------------

/// Approvals needed for quorum: `⌈2/3 × active⌉`, never less than one.
///
/// With zero active members nothing can be approved.
pub fn quorum_threshold(active_members: usize) -> usize {
    let required =
        (active_members * QUORUM_NUMERATOR + QUORUM_DENOMINATOR - 1) / QUORUM_DENOMINATOR;
    required.max(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reference_quorum_is_eight_of_twelve() {
        assert_eq!(quorum_threshold(12), 8);
    }

    #[test]
    fn quorum_rounds_up() {
        assert_eq!(quorum_threshold(1), 1);
        assert_eq!(quorum_threshold(3), 2);
        assert_eq!(quorum_threshold(4), 3);
        assert_eq!(quorum_threshold(10), 7);
        assert_eq!(quorum_threshold(11), 8);
    }

    #[test]
    fn empty_consortium_cannot_approve() {
        assert_eq!(quorum_threshold(0), 1);
    }

    #[test]
    fn slashing_constants_escalate() {
        assert!(SLASH_FIRST_OFFENSE_BPS < SLASH_SECOND_OFFENSE_BPS);
        assert!(SLASH_SECOND_OFFENSE_BPS < SLASH_REPEAT_OFFENSE_BPS);
        assert!(DEACTIVATION_FLOOR_BPS < BPS_DENOMINATOR);
    }

    #[test]
    fn config_round_trips_through_json() {
        let config = ProtocolConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let back: ProtocolConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, config);
        assert_eq!(back.court_grant_ttl(), chrono::Duration::hours(24));
    }

    #[test]
    fn partial_json_falls_back_to_defaults() {
        let back: ProtocolConfig = serde_json::from_str(r#"{"batch_capacity": 8}"#).unwrap();
        assert_eq!(back.batch_capacity, 8);
        assert_eq!(back.vote_window(), DEFAULT_VOTE_WINDOW);
    }
}
