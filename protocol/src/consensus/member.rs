//! Consortium member records.

use serde::{Deserialize, Serialize};

use crate::types::MemberId;

/// One validating authority and its economic standing.
///
/// `malicious_count` doubles as the offense counter that selects the next
/// penalty in the slashing schedule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsortiumMember {
    pub id: MemberId,
    pub initial_stake: u64,
    pub stake: u64,
    pub total_assets: u64,
    pub honest_count: u64,
    pub malicious_count: u64,
    pub active: bool,
}

impl ConsortiumMember {
    pub fn new(id: MemberId, stake: u64) -> Self {
        Self {
            id,
            initial_stake: stake,
            stake,
            total_assets: 0,
            honest_count: 0,
            malicious_count: 0,
            active: true,
        }
    }

    /// Offenses recorded so far.
    pub fn offenses(&self) -> u64 {
        self.malicious_count
    }
}
