//! # Slashing & Treasury
//!
//! Escalating penalties are an explicit lookup on the member's offense
//! counter: the n-th offense costs `penalty_bps(n)` of the member's
//! *current* stake. A member whose stake falls below the deactivation floor
//! (a fraction of its initial stake) is deactivated on the spot.
//!
//! Slashed funds accumulate in the [`Treasury`] as `SLASH` entries. The
//! fiscal-year distribution pays the balance out to members in proportion to
//! their honest-verification counts, recorded as `REWARD` entries. Integer
//! division leftovers stay in the treasury for the next year.
//!
//! All amounts are integer base units; percentages are basis points.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use super::member::ConsortiumMember;
use crate::config::{
    BPS_DENOMINATOR, DEACTIVATION_FLOOR_BPS, SLASH_FIRST_OFFENSE_BPS, SLASH_REPEAT_OFFENSE_BPS,
    SLASH_SECOND_OFFENSE_BPS,
};
use crate::types::MemberId;

// ---------------------------------------------------------------------------
// Schedule
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SlashingSchedule {
    pub first_offense_bps: u64,
    pub second_offense_bps: u64,
    pub repeat_offense_bps: u64,
    pub deactivation_floor_bps: u64,
}

impl Default for SlashingSchedule {
    fn default() -> Self {
        Self {
            first_offense_bps: SLASH_FIRST_OFFENSE_BPS,
            second_offense_bps: SLASH_SECOND_OFFENSE_BPS,
            repeat_offense_bps: SLASH_REPEAT_OFFENSE_BPS,
            deactivation_floor_bps: DEACTIVATION_FLOOR_BPS,
        }
    }
}

impl SlashingSchedule {
    /// Penalty for the `offense`-th offense (1-based).
    pub fn penalty_bps(&self, offense: u64) -> u64 {
        match offense {
            0 | 1 => self.first_offense_bps,
            2 => self.second_offense_bps,
            _ => self.repeat_offense_bps,
        }
    }

    /// `stake < floor × initial`, computed without floating point.
    pub fn below_floor(&self, stake: u64, initial_stake: u64) -> bool {
        (stake as u128) * (BPS_DENOMINATOR as u128)
            < (initial_stake as u128) * (self.deactivation_floor_bps as u128)
    }
}

// ---------------------------------------------------------------------------
// Treasury
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TreasuryEntryKind {
    Slash,
    Reward,
}

/// Append-only ledger line. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreasuryEntry {
    pub id: Uuid,
    pub kind: TreasuryEntryKind,
    pub member: MemberId,
    pub amount: u64,
    /// Offense number for `Slash`, fiscal year for `Reward`.
    pub reference: u64,
    pub recorded_at: DateTime<Utc>,
}

/// Result of one slash.
#[derive(Debug, Clone)]
pub struct SlashOutcome {
    pub entry: TreasuryEntry,
    pub penalty_bps: u64,
    pub stake_after: u64,
    pub deactivated: bool,
}

#[derive(Debug, Default)]
pub struct Treasury {
    entries: Vec<TreasuryEntry>,
    balance: u64,
}

impl Treasury {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild from a persisted ledger.
    pub fn from_entries(entries: Vec<TreasuryEntry>) -> Self {
        let mut treasury = Self::new();
        for entry in entries {
            treasury.apply(entry);
        }
        treasury
    }

    pub fn balance(&self) -> u64 {
        self.balance
    }

    pub fn entries(&self) -> &[TreasuryEntry] {
        &self.entries
    }

    fn apply(&mut self, entry: TreasuryEntry) {
        match entry.kind {
            TreasuryEntryKind::Slash => self.balance = self.balance.saturating_add(entry.amount),
            TreasuryEntryKind::Reward => self.balance = self.balance.saturating_sub(entry.amount),
        }
        self.entries.push(entry);
    }

    /// Apply the next penalty to `member`, deposit it, and deactivate the
    /// member if it fell below the floor.
    pub fn slash(
        &mut self,
        member: &mut ConsortiumMember,
        schedule: &SlashingSchedule,
        at: DateTime<Utc>,
    ) -> SlashOutcome {
        member.malicious_count += 1;
        let offense = member.malicious_count;
        let penalty_bps = schedule.penalty_bps(offense);
        let amount =
            ((member.stake as u128 * penalty_bps as u128) / BPS_DENOMINATOR as u128) as u64;
        member.stake = member.stake.saturating_sub(amount);

        let deactivated = member.active && schedule.below_floor(member.stake, member.initial_stake);
        if deactivated {
            member.active = false;
            warn!(
                member = %member.id,
                stake = member.stake,
                initial_stake = member.initial_stake,
                "member deactivated below stake floor"
            );
        }

        let entry = TreasuryEntry {
            id: Uuid::new_v4(),
            kind: TreasuryEntryKind::Slash,
            member: member.id.clone(),
            amount,
            reference: offense,
            recorded_at: at,
        };
        self.apply(entry.clone());

        info!(
            member = %member.id,
            offense,
            penalty_bps,
            amount,
            stake_after = member.stake,
            "member slashed"
        );

        SlashOutcome {
            entry,
            penalty_bps,
            stake_after: member.stake,
            deactivated,
        }
    }

    /// Pay the balance out to active members in proportion to
    /// `honest_count`. Returns the `Reward` entries; the remainder stays.
    pub fn distribute(
        &mut self,
        members: &mut [ConsortiumMember],
        fiscal_year: u64,
        at: DateTime<Utc>,
    ) -> Vec<TreasuryEntry> {
        let pot = self.balance;
        let total_honest: u128 = members
            .iter()
            .filter(|m| m.active)
            .map(|m| m.honest_count as u128)
            .sum();
        if pot == 0 || total_honest == 0 {
            return Vec::new();
        }

        let mut rewards = Vec::new();
        for member in members.iter_mut().filter(|m| m.active && m.honest_count > 0) {
            let amount = ((pot as u128 * member.honest_count as u128) / total_honest) as u64;
            if amount == 0 {
                continue;
            }
            member.total_assets = member.total_assets.saturating_add(amount);
            let entry = TreasuryEntry {
                id: Uuid::new_v4(),
                kind: TreasuryEntryKind::Reward,
                member: member.id.clone(),
                amount,
                reference: fiscal_year,
                recorded_at: at,
            };
            self.apply(entry.clone());
            rewards.push(entry);
        }

        info!(
            fiscal_year,
            pot,
            paid = pot - self.balance,
            retained = self.balance,
            recipients = rewards.len(),
            "treasury distributed"
        );
        rewards
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn member(stake: u64) -> ConsortiumMember {
        ConsortiumMember::new(MemberId::new("m"), stake)
    }

    #[test]
    fn schedule_escalates_and_saturates() {
        let s = SlashingSchedule::default();
        assert_eq!(s.penalty_bps(1), 500);
        assert_eq!(s.penalty_bps(2), 1_000);
        assert_eq!(s.penalty_bps(3), 2_000);
        assert_eq!(s.penalty_bps(9), 2_000);
    }

    #[test]
    fn second_offense_uses_current_stake() {
        let schedule = SlashingSchedule::default();
        let mut treasury = Treasury::new();
        let mut m = member(1_000_000);

        treasury.slash(&mut m, &schedule, Utc::now());
        assert_eq!(m.stake, 950_000);

        let outcome = treasury.slash(&mut m, &schedule, Utc::now());
        assert_eq!(outcome.entry.amount, 95_000);
        assert_eq!(m.stake, 855_000);
        assert_eq!(treasury.balance(), 145_000);
        assert_eq!(outcome.entry.reference, 2);
    }

    #[test]
    fn deactivates_below_thirty_percent_of_initial() {
        let schedule = SlashingSchedule::default();
        let mut treasury = Treasury::new();
        let mut m = member(1_000);
        // put the member just above the floor, then slash
        m.stake = 310;
        m.malicious_count = 2;

        let outcome = treasury.slash(&mut m, &schedule, Utc::now());
        assert_eq!(outcome.stake_after, 248);
        assert!(outcome.deactivated);
        assert!(!m.active);
    }

    #[test]
    fn floor_is_strict() {
        let s = SlashingSchedule::default();
        assert!(!s.below_floor(300, 1_000));
        assert!(s.below_floor(299, 1_000));
    }

    #[test]
    fn entries_are_append_only_ledger() {
        let schedule = SlashingSchedule::default();
        let mut treasury = Treasury::new();
        let mut m = member(10_000);
        treasury.slash(&mut m, &schedule, Utc::now());
        treasury.slash(&mut m, &schedule, Utc::now());

        let rebuilt = Treasury::from_entries(treasury.entries().to_vec());
        assert_eq!(rebuilt.balance(), treasury.balance());
        assert_eq!(rebuilt.entries(), treasury.entries());
    }

    #[test]
    fn distribution_is_proportional_and_keeps_remainder() {
        let mut treasury = Treasury::new();
        let mut offender = member(1_000);
        offender.stake = 1_000;
        treasury.slash(&mut offender, &SlashingSchedule::default(), Utc::now()); // 50 in
        assert_eq!(treasury.balance(), 50);

        let mut members = vec![
            ConsortiumMember::new(MemberId::new("a"), 1_000),
            ConsortiumMember::new(MemberId::new("b"), 1_000),
            ConsortiumMember::new(MemberId::new("c"), 1_000),
        ];
        members[0].honest_count = 1;
        members[1].honest_count = 1;
        members[2].honest_count = 1;

        let rewards = treasury.distribute(&mut members, 2026, Utc::now());
        assert_eq!(rewards.len(), 3);
        assert!(rewards.iter().all(|r| r.amount == 16));
        assert_eq!(treasury.balance(), 2);
        assert_eq!(members[0].total_assets, 16);
    }

    #[test]
    fn inactive_and_zero_count_members_get_nothing() {
        let mut treasury = Treasury::new();
        let mut offender = member(10_000);
        treasury.slash(&mut offender, &SlashingSchedule::default(), Utc::now());

        let mut members = vec![
            ConsortiumMember::new(MemberId::new("a"), 1_000),
            ConsortiumMember::new(MemberId::new("b"), 1_000),
        ];
        members[0].honest_count = 4;
        members[1].honest_count = 4;
        members[1].active = false;

        let rewards = treasury.distribute(&mut members, 2026, Utc::now());
        assert_eq!(rewards.len(), 1);
        assert_eq!(rewards[0].member, MemberId::new("a"));
        assert_eq!(treasury.balance(), 0);
    }

    #[test]
    fn empty_treasury_distributes_nothing() {
        let mut treasury = Treasury::new();
        let mut members = vec![ConsortiumMember::new(MemberId::new("a"), 1)];
        members[0].honest_count = 1;
        assert!(treasury.distribute(&mut members, 2026, Utc::now()).is_empty());
    }
}
